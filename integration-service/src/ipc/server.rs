//! Unix socket server for administrative calls.

use crate::ipc::protocol::{
    IpcRequest, IpcResponse, MAINTENANCE_BROWSE, MAINTENANCE_CREATE, MAINTENANCE_RETRIEVE,
    MAINTENANCE_UPDATE,
};
use crate::models::{FindById, MaintenanceSpec, UpdateRequest};
use crate::services::{Caller, MaintenanceScheduler};
use serde::Serialize;
use serde_json::Value;
use service_core::error::AppError;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    scheduler: Arc<MaintenanceScheduler>,
}

impl IpcServer {
    /// Bind the socket, replacing a stale socket file left by a previous run.
    ///
    /// The socket is world-connectable; authorization happens per request
    /// from the peer credentials.
    pub fn bind(path: impl AsRef<Path>, scheduler: Arc<MaintenanceScheduler>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            error!(error = %e, path = %path.display(), "Failed to bind IPC socket");
            AppError::from(e)
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))?;

        info!(path = %path.display(), "IPC socket listening");

        Ok(Self {
            listener,
            path,
            scheduler,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let scheduler = Arc::clone(&self.scheduler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, scheduler).await {
                                warn!(error = %e, "IPC connection closed with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept IPC connection"),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(error = %e, "IPC socket file already gone");
        }
        info!("IPC server stopped");
    }
}

async fn handle_connection(
    stream: UnixStream,
    scheduler: Arc<MaintenanceScheduler>,
) -> Result<(), AppError> {
    let credentials = stream.peer_cred()?;
    let caller = Caller {
        uid: credentials.uid(),
        pid: credentials.pid(),
    };
    debug!(uid = caller.uid, pid = ?caller.pid, "IPC client connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => dispatch(&scheduler, &caller, request).await,
            Err(e) => Err(AppError::from(e)),
        };

        let mut payload = serde_json::to_vec(&IpcResponse::from_result(result))
            .map_err(|e| AppError::InternalError(e.into()))?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
    }

    Ok(())
}

fn to_value(value: impl Serialize) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalError(e.into()))
}

/// Route one request to the scheduler.
///
/// The caller is authorized before `params` is parsed, so a caller without
/// access gets 403 whatever it sends.
pub async fn dispatch(
    scheduler: &MaintenanceScheduler,
    caller: &Caller,
    request: IpcRequest,
) -> Result<Value, AppError> {
    debug!(method = %request.method, uid = caller.uid, "IPC request");

    match request.method.as_str() {
        MAINTENANCE_CREATE => {
            scheduler.authorize(caller, MAINTENANCE_CREATE)?;
            let spec: MaintenanceSpec = serde_json::from_value(request.params)?;
            to_value(scheduler.create(caller, spec).await?)
        }
        MAINTENANCE_UPDATE => {
            scheduler.authorize(caller, MAINTENANCE_UPDATE)?;
            let request: UpdateRequest = serde_json::from_value(request.params)?;
            scheduler.update(caller, &request.id, request.update).await?;
            Ok(Value::Null)
        }
        MAINTENANCE_BROWSE => to_value(scheduler.browse(caller).await?),
        MAINTENANCE_RETRIEVE => {
            scheduler.authorize(caller, MAINTENANCE_RETRIEVE)?;
            let request: FindById = serde_json::from_value(request.params)?;
            to_value(scheduler.retrieve(caller, &request.id).await?)
        }
        other => Err(AppError::NotFound(anyhow::anyhow!(
            "unknown IPC method '{}'",
            other
        ))),
    }
}

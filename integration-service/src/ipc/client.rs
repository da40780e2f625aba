//! Client side of the administrative channel.

use crate::ipc::protocol::{
    IpcRequest, IpcResponse, MAINTENANCE_BROWSE, MAINTENANCE_CREATE, MAINTENANCE_RETRIEVE,
    MAINTENANCE_UPDATE,
};
use crate::models::{
    FindById, MaintenancePeriod, MaintenanceSpec, MaintenanceUpdate, Page, UpdateRequest,
};
use serde::{de::DeserializeOwned, Serialize};
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Debug, Clone)]
pub struct IpcClient {
    path: PathBuf,
}

impl IpcClient {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Send one request on a fresh connection and wait for its response.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, AppError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Failed to connect to {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let (read_half, mut write_half) = stream.into_split();

        let request = IpcRequest {
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(|e| AppError::InternalError(e.into()))?,
        };
        let mut payload =
            serde_json::to_vec(&request).map_err(|e| AppError::InternalError(e.into()))?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;

        let line = BufReader::new(read_half)
            .lines()
            .next_line()
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("IPC server closed the connection"))
            })?;

        let response: IpcResponse = serde_json::from_str(&line)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Malformed IPC response: {}", e)))?;
        let value = response.into_result()?;

        serde_json::from_value(value)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Unexpected IPC payload: {}", e)))
    }

    pub async fn create(&self, spec: &MaintenanceSpec) -> Result<FindById, AppError> {
        self.call(MAINTENANCE_CREATE, spec).await
    }

    pub async fn update(&self, id: &str, update: MaintenanceUpdate) -> Result<(), AppError> {
        let request = UpdateRequest {
            id: id.to_string(),
            update,
        };
        let _: serde_json::Value = self.call(MAINTENANCE_UPDATE, request).await?;
        Ok(())
    }

    pub async fn browse(&self) -> Result<Page<MaintenancePeriod>, AppError> {
        self.call(MAINTENANCE_BROWSE, ()).await
    }

    pub async fn retrieve(&self, id: &str) -> Result<MaintenancePeriod, AppError> {
        self.call(
            MAINTENANCE_RETRIEVE,
            FindById {
                id: id.to_string(),
            },
        )
        .await
    }
}

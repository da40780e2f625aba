//! Administrative channel over a real Unix socket.

mod common;

use clap::Parser;
use common::{catalog, AllowAll, InMemoryMaintenanceStore};
use integration_service::cli::{execute, Cli, Command};
use integration_service::ipc::{dispatch, IpcClient, IpcRequest, IpcServer};
use integration_service::models::{Availability, MaintenanceSpec, MaintenanceUpdate, Patch};
use integration_service::services::{
    Authorizer, Caller, MaintenanceScheduler, ManualClock, RootOnly,
};
use serde_json::json;
use service_core::error::AppError;
use std::os::unix::fs::MetadataExt;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const T: i64 = 1_700_000_000_000;

fn scheduler(authorizer: Arc<dyn Authorizer>) -> Arc<MaintenanceScheduler> {
    Arc::new(MaintenanceScheduler::new(
        Arc::new(InMemoryMaintenanceStore::default()),
        authorizer,
        Arc::new(catalog()),
        Arc::new(ManualClock::new(T)),
    ))
}

fn spec() -> MaintenanceSpec {
    MaintenanceSpec {
        description: "Storage upgrade".to_string(),
        availability: Availability::MajorDisruption,
        product_matcher: "storage".to_string(),
        starts_at: T,
        ends_at: None,
    }
}

/// Bind a server in a fresh directory and run it until the token is cancelled.
fn serve(
    scheduler: Arc<MaintenanceScheduler>,
) -> (TempDir, IpcClient, CancellationToken, tokio::task::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ipc.sock");
    let server = IpcServer::bind(&path, scheduler).unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    (dir, IpcClient::new(&path), shutdown, handle)
}

#[tokio::test]
async fn round_trip_over_the_socket() {
    let (_dir, client, shutdown, handle) = serve(scheduler(Arc::new(AllowAll)));

    let created = client.create(&spec()).await.unwrap();
    let period = client.retrieve(&created.id).await.unwrap();
    assert_eq!(period.specification, spec());

    client
        .update(
            &created.id,
            MaintenanceUpdate {
                availability: Patch::Set(Availability::MinorDisruption),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let page = client.browse().await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(
        page.items[0].specification.availability,
        Availability::MinorDisruption
    );
    assert_eq!(page.items[0].specification.description, "Storage upgrade");

    let err = client.retrieve("404").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn caller_identity_comes_from_the_socket() {
    let (dir, client, shutdown, handle) = serve(scheduler(Arc::new(RootOnly)));
    let uid = std::fs::metadata(dir.path()).unwrap().uid();

    let result = client.browse().await;
    if uid == 0 {
        assert!(result.is_ok());
    } else {
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn stopping_the_server_removes_the_socket() {
    let (dir, client, shutdown, handle) = serve(scheduler(Arc::new(AllowAll)));
    let path = dir.path().join("ipc.sock");
    assert!(path.exists());

    shutdown.cancel();
    handle.await.unwrap();

    assert!(!path.exists());
    assert!(client.browse().await.is_err());
}

#[tokio::test]
async fn dispatch_rejects_unknown_methods_and_bad_params() {
    let scheduler = scheduler(Arc::new(RootOnly));
    let root = Caller::root();

    let err = dispatch(
        &scheduler,
        &root,
        IpcRequest {
            method: "maintenance.delete".to_string(),
            params: json!({}),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = dispatch(
        &scheduler,
        &root,
        IpcRequest {
            method: "maintenance.create".to_string(),
            params: json!({ "description": "missing fields" }),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let created = dispatch(
        &scheduler,
        &root,
        IpcRequest {
            method: "maintenance.create".to_string(),
            params: serde_json::to_value(spec()).unwrap(),
        },
    )
    .await
    .unwrap();
    assert_eq!(created, json!({ "id": "1" }));
}

#[tokio::test]
async fn dispatch_refuses_non_root_callers_before_reading_params() {
    let scheduler = scheduler(Arc::new(RootOnly));
    let user = Caller::from_uid(1000);

    for (method, params) in [
        ("maintenance.create", json!({ "description": "missing fields" })),
        ("maintenance.update", json!("not an object")),
        ("maintenance.retrieve", json!([])),
        ("maintenance.browse", json!(null)),
    ] {
        let err = dispatch(
            &scheduler,
            &user,
            IpcRequest {
                method: method.to_string(),
                params,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)), "{}: {:?}", method, err);
    }
}

#[tokio::test]
async fn command_line_drives_the_server() {
    let (_dir, client, shutdown, handle) = serve(scheduler(Arc::new(AllowAll)));
    let catalog = catalog();

    let parse = |args: &[&str]| -> Command {
        let mut argv = vec!["integration-ctl", "maintenance"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    };

    let output = execute(
        parse(&[
            "add",
            "unavailable",
            "storage",
            "--description",
            "Disk swap",
            "--starts-at",
            "2023-11-14T22:13:20Z",
        ]),
        &client,
        Some(&catalog),
        T,
    )
    .await
    .unwrap();
    assert_eq!(output, "OK! Period ID is 1\n");

    let output = execute(parse(&["get", "1"]), &client, Some(&catalog), T)
        .await
        .unwrap();
    assert!(output.contains("Service unavailable"));
    assert!(output.contains("home / storage"));
    assert!(output.contains("scratch / storage"));

    execute(parse(&["stop", "1"]), &client, None, T + 5)
        .await
        .unwrap();
    let period = client.retrieve("1").await.unwrap();
    assert_eq!(period.specification.ends_at, Some(T + 5));

    let output = execute(parse(&["ls"]), &client, None, T).await.unwrap();
    assert!(output.starts_with("ID"));
    assert!(output.contains("Disk swap"));

    shutdown.cancel();
    handle.await.unwrap();
}

//! Administrative command line for integration-service.

use clap::Parser;
use integration_service::cli::{execute, Cli};
use integration_service::ipc::IpcClient;
use integration_service::models::ProductCatalog;
use integration_service::services::{Clock, SystemClock};
use service_core::observability::init_cli_tracing;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_cli_tracing(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()));

    // The catalog only enriches `get`; a missing file is not fatal here.
    let catalog = cli
        .catalog
        .as_ref()
        .and_then(|path| match ProductCatalog::load(path) {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                tracing::warn!(error = %e, "Product catalog unavailable");
                None
            }
        });

    let client = IpcClient::new(&cli.socket);
    match execute(cli.command, &client, catalog.as_ref(), SystemClock.now_millis()).await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error! {}", e);
            ExitCode::FAILURE
        }
    }
}

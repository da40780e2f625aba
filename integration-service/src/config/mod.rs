//! Configuration module for integration-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Role this process plays. Only the server process owns the database,
/// the accounting RPC context and the background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Server,
    User,
    FrontendProxy,
}

impl ServerMode {
    pub fn should_run_server_code(&self) -> bool {
        matches!(self, ServerMode::Server)
    }
}

impl FromStr for ServerMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(ServerMode::Server),
            "user" => Ok(ServerMode::User),
            "proxy" | "frontend-proxy" => Ok(ServerMode::FrontendProxy),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "unknown SERVER_MODE '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub server_mode: ServerMode,
    pub database: DatabaseConfig,
    pub accounting_service: AccountingServiceConfig,
    pub activity: ActivityConfig,
    pub ipc: IpcConfig,
    pub product_catalog_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AccountingServiceConfig {
    pub url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ActivityConfig {
    pub flush_interval: Duration,
    pub batch_size: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            batch_size: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_IPC_SOCKET),
        }
    }
}

pub const DEFAULT_IPC_SOCKET: &str = "/var/run/integration-service/ipc.sock";

fn parsed_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl IntegrationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let server_mode = match env::var("SERVER_MODE") {
            Ok(mode) => mode.parse()?,
            Err(_) => ServerMode::Server,
        };

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if server_mode.should_run_server_code() => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in server mode"
                )));
            }
            Err(_) => String::new(),
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "integration-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            server_mode,
            database: DatabaseConfig {
                url: database_url,
                max_connections: parsed_env("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                min_connections: parsed_env("DATABASE_MIN_CONNECTIONS").unwrap_or(2),
            },
            accounting_service: AccountingServiceConfig {
                url: env::var("ACCOUNTING_SERVICE_URL")
                    .unwrap_or_else(|_| "http://accounting-service:8080".to_string()),
                request_timeout: Duration::from_secs(
                    parsed_env("ACCOUNTING_REQUEST_TIMEOUT_SECS").unwrap_or(30),
                ),
            },
            activity: ActivityConfig {
                flush_interval: Duration::from_secs(
                    parsed_env("ACTIVITY_FLUSH_INTERVAL_SECS").unwrap_or(30),
                ),
                batch_size: parsed_env::<usize>("ACTIVITY_FLUSH_BATCH_SIZE")
                    .unwrap_or(500)
                    .max(1),
            },
            ipc: IpcConfig {
                socket_path: env::var("IPC_SOCKET_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_IPC_SOCKET)),
            },
            product_catalog_path: env::var("PRODUCT_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/integration-service/products.toml")),
        })
    }
}

//! Application startup and lifecycle management.

use crate::config::IntegrationConfig;
use crate::ipc::IpcServer;
use crate::models::ProductCatalog;
use crate::services::{
    get_metrics, init_metrics, AccountingBackend, AccountingSystem, ActivityLedger, Clock,
    Database, HttpAccountingClient, MaintenanceScheduler, RootOnly, SystemClock,
};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: IntegrationConfig,
    pub db: Arc<Database>,
    pub accounting: Arc<AccountingSystem>,
    pub activity: Arc<ActivityLedger>,
    pub maintenance: Arc<MaintenanceScheduler>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "integration-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "integration-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Readiness check passed");
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    ipc_server: IpcServer,
    state: AppState,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: IntegrationConfig) -> Result<Self, AppError> {
        let catalog = ProductCatalog::load(&config.product_catalog_path).map_err(|e| {
            tracing::error!(error = %e, "Failed to load product catalog");
            e
        })?;
        let backend = HttpAccountingClient::new(&config.accounting_service)?;

        Self::build_with(config, catalog, Arc::new(backend), true).await
    }

    /// Build with an explicit catalog and accounting backend.
    /// Tests use this with migrations already applied by the harness.
    pub async fn build_with(
        config: IntegrationConfig,
        catalog: ProductCatalog,
        backend: Arc<dyn AccountingBackend>,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        if !config.server_mode.should_run_server_code() {
            return Err(AppError::FailedPrecondition(anyhow::anyhow!(
                "integration-service must run in server mode, got {:?}",
                config.server_mode
            )));
        }

        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let catalog = Arc::new(catalog);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let activity = Arc::new(ActivityLedger::new(
            db.clone(),
            clock.clone(),
            config.activity.clone(),
            config.server_mode,
        ));
        activity.start().await?;

        let accounting = Arc::new(
            AccountingSystem::new(config.server_mode, catalog.clone(), backend)
                .with_activity_ledger(activity.clone()),
        );

        let maintenance = Arc::new(MaintenanceScheduler::new(
            db.clone(),
            Arc::new(RootOnly),
            catalog,
            clock,
        ));

        let ipc_server = IpcServer::bind(&config.ipc.socket_path, maintenance.clone())?;

        // Bind HTTP listener
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        let state = AppState {
            config,
            db,
            accounting,
            activity,
            maintenance,
        };

        Ok(Self {
            http_port,
            http_listener,
            ipc_server,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Cancelling this token stops the servers and flushes the activity ledger.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the HTTP and IPC servers until the shutdown token is cancelled.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let http_trace_layer = TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG));

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(health_state)
            .route("/metrics", get(metrics_handler))
            .layer(http_trace_layer)
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware));

        let ipc_task = tokio::spawn(self.ipc_server.run(self.shutdown.clone()));

        tracing::info!(
            service = "integration-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            ipc_socket = %self.state.config.ipc.socket_path.display(),
            "Service ready to accept connections"
        );

        let served = axum::serve(self.http_listener, http_router)
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
            .await;

        // The HTTP server can also stop on its own error; take IPC down with it.
        self.shutdown.cancel();
        if let Err(e) = ipc_task.await {
            tracing::error!(error = %e, "IPC server task failed");
        }

        if let Err(e) = self.state.activity.stop().await {
            tracing::error!(error = %e, "Final activity flush failed");
        }

        served.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            AppError::from(e)
        })
    }
}

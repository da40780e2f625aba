//! Database service for integration-service.

use crate::models::{
    ActivityRecord, MaintenancePeriod, MaintenancePeriodRow, MaintenanceSpec, MaintenanceUpdate,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{ActivityStore, MaintenanceStore};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "integration-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// =========================================================================
// Activity Operations
// =========================================================================

#[async_trait]
impl ActivityStore for Database {
    #[instrument(skip(self))]
    async fn load_activity(&self) -> Result<Vec<ActivityRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_activity"])
            .start_timer();

        let records = sqlx::query_as::<_, ActivityRecord>(
            r#"
            SELECT reference_is_user, workspace_reference, last_activity
            FROM activity_system
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load activity: {}", e)))?;

        timer.observe_duration();
        Ok(records)
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    async fn upsert_activity(&self, records: &[ActivityRecord]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_activity"])
            .start_timer();

        let mut is_user = Vec::with_capacity(records.len());
        let mut references = Vec::with_capacity(records.len());
        let mut timestamps = Vec::with_capacity(records.len());
        for record in records {
            is_user.push(record.reference_is_user);
            references.push(record.workspace_reference.clone());
            timestamps.push(record.last_activity);
        }

        sqlx::query(
            r#"
            INSERT INTO activity_system (reference_is_user, workspace_reference, last_activity)
            SELECT * FROM unnest($1::bool[], $2::text[], $3::int8[])
            ON CONFLICT (reference_is_user, workspace_reference)
            DO UPDATE SET last_activity = excluded.last_activity
            "#,
        )
        .bind(&is_user)
        .bind(&references)
        .bind(&timestamps)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to upsert activity: {}", e))
        })?;

        timer.observe_duration();
        debug!(rows = records.len(), "Activity batch written");
        Ok(())
    }
}

// =========================================================================
// Maintenance Operations
// =========================================================================

#[async_trait]
impl MaintenanceStore for Database {
    #[instrument(skip(self, spec), fields(availability = %spec.availability))]
    async fn insert_period(&self, spec: &MaintenanceSpec) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_period"])
            .start_timer();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO maintenance_periods (availability, product_matcher, starts_at, ends_at, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(spec.availability.as_str())
        .bind(&spec.product_matcher)
        .bind(spec.starts_at)
        .bind(spec.ends_at)
        .bind(&spec.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create maintenance period: {}", e))
        })?;

        timer.observe_duration();
        info!(period_id = id, "Maintenance period created");

        Ok(id)
    }

    /// Omitted fields bind as NULL and fall back to the stored value through
    /// `coalesce`. `ends_at` is nullable, so it carries an explicit flag.
    #[instrument(skip(self, update), fields(period_id = id))]
    async fn update_period(&self, id: i64, update: &MaintenanceUpdate) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_period"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE maintenance_periods
            SET
                description = coalesce($2, description),
                availability = coalesce($3, availability),
                product_matcher = coalesce($4, product_matcher),
                starts_at = coalesce($5, starts_at),
                ends_at = CASE WHEN $6 THEN $7 ELSE ends_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.description.as_set())
        .bind(update.availability.as_set().map(|a| a.as_str()))
        .bind(update.product_matcher.as_set())
        .bind(update.starts_at.as_set().copied())
        .bind(!update.ends_at.is_keep())
        .bind(update.ends_at.as_set().copied().flatten())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update maintenance period: {}", e))
        })?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn browse_periods(&self, now: i64) -> Result<Vec<MaintenancePeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["browse_periods"])
            .start_timer();

        let rows = sqlx::query_as::<_, MaintenancePeriodRow>(
            r#"
            SELECT id, availability, product_matcher, starts_at, ends_at, description
            FROM maintenance_periods
            WHERE ends_at IS NULL OR $1 <= ends_at
            ORDER BY starts_at ASC, id ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to browse maintenance periods: {}", e))
        })?;

        timer.observe_duration();
        rows.into_iter().map(MaintenancePeriod::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn find_period(&self, id: i64) -> Result<Option<MaintenancePeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_period"])
            .start_timer();

        let row = sqlx::query_as::<_, MaintenancePeriodRow>(
            r#"
            SELECT id, availability, product_matcher, starts_at, ends_at, description
            FROM maintenance_periods
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get maintenance period: {}", e))
        })?;

        timer.observe_duration();
        row.map(MaintenancePeriod::try_from).transpose()
    }
}

//! Persistence seams used by the ledger and the scheduler.
//!
//! [`Database`](super::Database) implements both against PostgreSQL; tests
//! substitute in-memory versions.

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{ActivityRecord, MaintenancePeriod, MaintenanceSpec, MaintenanceUpdate};

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Every row of `activity_system`.
    async fn load_activity(&self) -> Result<Vec<ActivityRecord>, AppError>;

    /// Insert or overwrite one batch of rows, keyed by subject.
    async fn upsert_activity(&self, records: &[ActivityRecord]) -> Result<(), AppError>;
}

#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Insert a period and return its generated id.
    async fn insert_period(&self, spec: &MaintenanceSpec) -> Result<i64, AppError>;

    /// Apply a merge-patch. Returns `false` when no such period exists.
    async fn update_period(&self, id: i64, update: &MaintenanceUpdate) -> Result<bool, AppError>;

    /// Periods that have not ended at `now`, ordered by start.
    async fn browse_periods(&self, now: i64) -> Result<Vec<MaintenancePeriod>, AppError>;

    async fn find_period(&self, id: i64) -> Result<Option<MaintenancePeriod>, AppError>;
}

//! Services module for integration-service.

pub mod accounting;
pub mod accounting_client;
pub mod activity;
pub mod authorization;
pub mod clock;
pub mod database;
pub mod maintenance;
pub mod metrics;
pub mod store;

pub use accounting::AccountingSystem;
pub use accounting_client::{AccountingBackend, HttpAccountingClient};
pub use activity::ActivityLedger;
pub use authorization::{Authorizer, Caller, RootOnly};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use maintenance::MaintenanceScheduler;
pub use metrics::{get_metrics, init_metrics};
pub use store::{ActivityStore, MaintenanceStore};

//! Test helper module for integration-service integration tests.
//!
//! Provides in-memory stores, a call-counting accounting backend, a product
//! catalog fixture and PostgreSQL setup for the persistence tests.

#![allow(dead_code)]

use async_trait::async_trait;
use integration_service::config::{ActivityConfig, ServerMode};
use integration_service::models::{
    AccountingInterval, ActivityRecord, Category, IndividualProduct, MaintenancePeriod,
    MaintenanceSpec, MaintenanceUpdate, ProductCatalog, ProductCost, ProductSpec, ProductType,
};
use integration_service::services::accounting_client::{
    AccountingBackend, BulkRequest, BulkResponse, CheckProviderUsableItem, ProviderUsable,
    UsageReportItem,
};
use integration_service::services::{
    ActivityLedger, ActivityStore, Authorizer, Caller, Database, MaintenanceScheduler,
    MaintenanceStore, ManualClock, RootOnly,
};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROVIDER: &str = "hippo";

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

// =========================================================================
// Activity store
// =========================================================================

/// `activity_system` kept in a map, with a switch to make writes fail.
#[derive(Default)]
pub struct InMemoryActivityStore {
    rows: Mutex<HashMap<(bool, String), i64>>,
    fail_writes: AtomicBool,
    upsert_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl InMemoryActivityStore {
    pub fn with_rows(rows: Vec<ActivityRecord>) -> Self {
        let store = Self::default();
        {
            let mut map = store.rows.lock().unwrap();
            for row in rows {
                map.insert(
                    (row.reference_is_user, row.workspace_reference),
                    row.last_activity,
                );
            }
        }
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn stored(&self, is_user: bool, reference: &str) -> Option<i64> {
        self.rows
            .lock()
            .unwrap()
            .get(&(is_user, reference.to_string()))
            .copied()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn load_activity(&self) -> Result<Vec<ActivityRecord>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|((is_user, reference), last_activity)| ActivityRecord {
                reference_is_user: *is_user,
                workspace_reference: reference.clone(),
                last_activity: *last_activity,
            })
            .collect())
    }

    async fn upsert_activity(&self, records: &[ActivityRecord]) -> Result<(), AppError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("database is down")));
        }

        self.batch_sizes.lock().unwrap().push(records.len());
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.insert(
                (record.reference_is_user, record.workspace_reference.clone()),
                record.last_activity,
            );
        }
        Ok(())
    }
}

/// Accepts every write after a fixed delay and records when each one began.
pub struct SlowActivityStore {
    delay: Duration,
    started: Mutex<Vec<tokio::time::Instant>>,
}

impl SlowActivityStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn write_starts(&self) -> Vec<tokio::time::Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityStore for SlowActivityStore {
    async fn load_activity(&self) -> Result<Vec<ActivityRecord>, AppError> {
        Ok(vec![])
    }

    async fn upsert_activity(&self, _records: &[ActivityRecord]) -> Result<(), AppError> {
        self.started.lock().unwrap().push(tokio::time::Instant::now());
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub fn activity_config(flush_interval: Duration, batch_size: usize) -> ActivityConfig {
    ActivityConfig {
        flush_interval,
        batch_size,
    }
}

pub fn ledger_with(
    store: Arc<InMemoryActivityStore>,
    clock: Arc<ManualClock>,
    config: ActivityConfig,
) -> Arc<ActivityLedger> {
    Arc::new(ActivityLedger::new(store, clock, config, ServerMode::Server))
}

// =========================================================================
// Maintenance store
// =========================================================================

/// `maintenance_periods` kept in a map, mirroring the SQL filters.
#[derive(Default)]
pub struct InMemoryMaintenanceStore {
    rows: Mutex<BTreeMap<i64, MaintenanceSpec>>,
    next_id: AtomicI64,
    calls: AtomicUsize,
}

impl InMemoryMaintenanceStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl MaintenanceStore for InMemoryMaintenanceStore {
    async fn insert_period(&self, spec: &MaintenanceSpec) -> Result<i64, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.lock().unwrap().insert(id, spec.clone());
        Ok(id)
    }

    async fn update_period(&self, id: i64, update: &MaintenanceUpdate) -> Result<bool, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        match rows.remove(&id) {
            Some(spec) => {
                rows.insert(id, update.clone().apply_to(spec));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn browse_periods(&self, now: i64) -> Result<Vec<MaintenancePeriod>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut periods: Vec<MaintenancePeriod> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, spec)| spec.ends_at.is_none_or(|ends_at| now <= ends_at))
            .map(|(id, spec)| MaintenancePeriod {
                id: id.to_string(),
                specification: spec.clone(),
            })
            .collect();
        periods.sort_by_key(|p| p.specification.starts_at);
        Ok(periods)
    }

    async fn find_period(&self, id: i64) -> Result<Option<MaintenancePeriod>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|spec| MaintenancePeriod {
                id: id.to_string(),
                specification: spec.clone(),
            }))
    }
}

/// Admits everyone. Used where the transport, not the policy, is under test.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _caller: &Caller, _operation: &str) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn scheduler_with(
    store: Arc<InMemoryMaintenanceStore>,
    clock: Arc<ManualClock>,
) -> MaintenanceScheduler {
    MaintenanceScheduler::new(store, Arc::new(RootOnly), Arc::new(catalog()), clock)
}

// =========================================================================
// Accounting backend
// =========================================================================

/// Records every call and answers from canned values.
#[derive(Default)]
pub struct CountingBackend {
    pub reports: Mutex<Vec<UsageReportItem>>,
    pub checks: Mutex<Vec<CheckProviderUsableItem>>,
    pub max_usable: AtomicI64,
    pub fail: AtomicBool,
}

impl CountingBackend {
    pub fn with_max_usable(max_usable: i64) -> Self {
        let backend = Self::default();
        backend.max_usable.store(max_usable, Ordering::SeqCst);
        backend
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().unwrap().len()
    }

    pub fn last_report(&self) -> Option<UsageReportItem> {
        self.reports.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AccountingBackend for CountingBackend {
    async fn check_provider_usable(
        &self,
        request: BulkRequest<CheckProviderUsableItem>,
    ) -> Result<BulkResponse<ProviderUsable>, AppError> {
        let count = request.items.len();
        self.checks.lock().unwrap().extend(request.items);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("accounting is down".to_string()));
        }
        let max_usable = self.max_usable.load(Ordering::SeqCst);
        Ok(BulkResponse {
            responses: vec![ProviderUsable { max_usable }; count],
        })
    }

    async fn report_usage(
        &self,
        request: BulkRequest<UsageReportItem>,
    ) -> Result<BulkResponse<bool>, AppError> {
        let count = request.items.len();
        self.reports.lock().unwrap().extend(request.items);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::BadGateway("accounting is down".to_string()));
        }
        Ok(BulkResponse {
            responses: vec![true; count],
        })
    }
}

// =========================================================================
// Catalog fixture
// =========================================================================

fn product(name: &str, price: i64, spec: ProductSpec) -> IndividualProduct {
    IndividualProduct {
        name: name.to_string(),
        description: String::new(),
        price,
        spec,
    }
}

/// Categories:
/// - `storage` (GB, resource, no interval): `home`, `scratch`
/// - `u1-standard` (Cpu, resource, hourly): `u1-standard-4`, `u1-standard-8`
/// - `u1-gpu` (Gpu, money, daily, price 10): `u1-gpu-2`
/// - `public-ip` (free): `ip`
/// - `license` (resource, no interval): `matlab`
pub fn catalog() -> ProductCatalog {
    ProductCatalog {
        provider: PROVIDER.to_string(),
        categories: vec![
            Category {
                name: "storage".to_string(),
                product_type: ProductType::Storage,
                cost: ProductCost::Resource {
                    unit: Some("GB".to_string()),
                    accounting_interval: None,
                },
                products: vec![
                    product("home", 1, ProductSpec::Storage { unit: None }),
                    product("scratch", 1, ProductSpec::Storage { unit: None }),
                ],
            },
            Category {
                name: "u1-standard".to_string(),
                product_type: ProductType::Compute,
                cost: ProductCost::Resource {
                    unit: Some("Cpu".to_string()),
                    accounting_interval: Some(AccountingInterval::Hourly),
                },
                products: vec![
                    product(
                        "u1-standard-4",
                        1,
                        ProductSpec::Compute {
                            cpu: 4,
                            memory: 16,
                            gpu: 0,
                        },
                    ),
                    product(
                        "u1-standard-8",
                        1,
                        ProductSpec::Compute {
                            cpu: 8,
                            memory: 32,
                            gpu: 0,
                        },
                    ),
                ],
            },
            Category {
                name: "u1-gpu".to_string(),
                product_type: ProductType::Compute,
                cost: ProductCost::Money {
                    currency: "DKK".to_string(),
                    unit: Some("Gpu".to_string()),
                    interval: Some(AccountingInterval::Daily),
                },
                products: vec![product(
                    "u1-gpu-2",
                    10,
                    ProductSpec::Compute {
                        cpu: 16,
                        memory: 64,
                        gpu: 2,
                    },
                )],
            },
            Category {
                name: "public-ip".to_string(),
                product_type: ProductType::NetworkIp,
                cost: ProductCost::Free,
                products: vec![product("ip", 0, ProductSpec::PublicIp)],
            },
            Category {
                name: "license".to_string(),
                product_type: ProductType::License,
                cost: ProductCost::Resource {
                    unit: None,
                    accounting_interval: None,
                },
                products: vec![product(
                    "matlab",
                    1,
                    ProductSpec::License { tags: vec![] },
                )],
            },
        ],
    }
}

// =========================================================================
// PostgreSQL
// =========================================================================

/// The database URL for testing, if one is configured.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_integration_{}_{}", std::process::id(), counter)
}

/// Create a fresh schema and return a URL whose connections default to it, or
/// `None` when no test database is configured.
pub async fn test_schema_url() -> Option<String> {
    let base_url = test_database_url()?;
    let schema_name = unique_schema_name();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&base_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
        .execute(&pool)
        .await
        .ok();
    sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
        .execute(&pool)
        .await
        .expect("Failed to create test schema");
    pool.close().await;

    // Use ? or & depending on whether URL already has query parameters
    let separator = if base_url.contains('?') { "&" } else { "?" };
    Some(format!(
        "{}{}options=-c search_path%3D{}",
        base_url, separator, schema_name
    ))
}

/// Connect to a fresh schema with migrations applied.
pub async fn test_database() -> Option<Database> {
    let url = test_schema_url().await?;
    let db = Database::new(&url, 5, 1)
        .await
        .expect("Failed to create test database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");
    Some(db)
}

//! Maintenance period administration and availability lookup.
//!
//! Administrative operations check the caller before touching the store.
//! Lookups used by the rest of the provider (`fetch_active_*`,
//! `availability_of`) are not caller-bound.

use crate::models::{
    parse_period_id, Availability, FindById, MaintenancePeriod, MaintenanceSpec,
    MaintenanceUpdate, Page, ProductCatalog, ProductMatcher, ProductReference,
};
use crate::services::authorization::{Authorizer, Caller};
use crate::services::clock::Clock;
use crate::services::metrics::record_maintenance_operation;
use crate::services::store::MaintenanceStore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct MaintenanceScheduler {
    store: Arc<dyn MaintenanceStore>,
    authorizer: Arc<dyn Authorizer>,
    catalog: Arc<ProductCatalog>,
    clock: Arc<dyn Clock>,
}

fn observed<T>(operation: &str, result: Result<T, AppError>) -> Result<T, AppError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(AppError::Forbidden(_)) => "forbidden",
        Err(AppError::NotFound(_)) => "not_found",
        Err(AppError::BadRequest(_)) => "invalid",
        Err(_) => "error",
    };
    record_maintenance_operation(operation, outcome);
    result
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Maintenance period '{}' not found", id))
}

impl MaintenanceScheduler {
    pub fn new(
        store: Arc<dyn MaintenanceStore>,
        authorizer: Arc<dyn Authorizer>,
        catalog: Arc<ProductCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            authorizer,
            catalog,
            clock,
        }
    }

    /// Check `caller` against `operation` without touching the store.
    pub fn authorize(&self, caller: &Caller, operation: &str) -> Result<(), AppError> {
        self.authorizer.authorize(caller, operation)
    }

    #[instrument(skip(self, caller, spec), fields(uid = caller.uid))]
    pub async fn create(&self, caller: &Caller, spec: MaintenanceSpec) -> Result<FindById, AppError> {
        observed("create", self.create_inner(caller, spec).await)
    }

    async fn create_inner(&self, caller: &Caller, spec: MaintenanceSpec) -> Result<FindById, AppError> {
        self.authorizer.authorize(caller, "maintenance.create")?;
        spec.validate()?;

        let id = self.store.insert_period(&spec).await?;
        info!(
            period_id = id,
            availability = %spec.availability,
            product_matcher = %spec.product_matcher,
            "Maintenance period scheduled"
        );

        Ok(FindById { id: id.to_string() })
    }

    /// Merge `update` into the stored period. Omitted fields are kept.
    #[instrument(skip(self, caller, update), fields(uid = caller.uid))]
    pub async fn update(
        &self,
        caller: &Caller,
        id: &str,
        update: MaintenanceUpdate,
    ) -> Result<(), AppError> {
        observed("update", self.update_inner(caller, id, update).await)
    }

    async fn update_inner(
        &self,
        caller: &Caller,
        id: &str,
        update: MaintenanceUpdate,
    ) -> Result<(), AppError> {
        self.authorizer.authorize(caller, "maintenance.update")?;

        if let Some(pattern) = update.product_matcher.as_set() {
            ProductMatcher::parse(pattern)?;
        }

        let key = parse_period_id(id)?;
        if !self.store.update_period(key, &update).await? {
            return Err(not_found(id));
        }

        info!(period_id = key, "Maintenance period updated");
        Ok(())
    }

    /// Current and upcoming periods, earliest start first.
    #[instrument(skip(self, caller), fields(uid = caller.uid))]
    pub async fn browse(&self, caller: &Caller) -> Result<Page<MaintenancePeriod>, AppError> {
        observed("browse", self.browse_inner(caller).await)
    }

    async fn browse_inner(&self, caller: &Caller) -> Result<Page<MaintenancePeriod>, AppError> {
        self.authorizer.authorize(caller, "maintenance.browse")?;
        let periods = self.store.browse_periods(self.clock.now_millis()).await?;
        Ok(Page::single(periods))
    }

    #[instrument(skip(self, caller), fields(uid = caller.uid))]
    pub async fn retrieve(&self, caller: &Caller, id: &str) -> Result<MaintenancePeriod, AppError> {
        observed("retrieve", self.retrieve_inner(caller, id).await)
    }

    async fn retrieve_inner(&self, caller: &Caller, id: &str) -> Result<MaintenancePeriod, AppError> {
        self.authorizer.authorize(caller, "maintenance.retrieve")?;
        let key = parse_period_id(id)?;
        self.store
            .find_period(key)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Periods that have started and not yet ended.
    pub async fn fetch_active_maintenance_periods(&self) -> Result<Vec<MaintenancePeriod>, AppError> {
        self.fetch_active_maintenance_periods_at(self.clock.now_millis())
            .await
    }

    pub async fn fetch_active_maintenance_periods_at(
        &self,
        now: i64,
    ) -> Result<Vec<MaintenancePeriod>, AppError> {
        let periods = self.store.browse_periods(now).await?;
        Ok(periods
            .into_iter()
            .filter(|period| period.has_started(now))
            .collect())
    }

    /// Catalog products the period's matcher selects.
    pub fn affected_products(
        &self,
        period: &MaintenancePeriod,
    ) -> Result<Vec<ProductReference>, AppError> {
        let matcher = period.matcher()?;
        Ok(self.catalog.products_matching(&matcher))
    }

    /// Most severe availability among active periods that match `product`.
    pub async fn availability_of(
        &self,
        product: &ProductReference,
    ) -> Result<Option<Availability>, AppError> {
        let active = self.fetch_active_maintenance_periods().await?;

        let mut worst: Option<Availability> = None;
        for period in &active {
            let matcher = match period.matcher() {
                Ok(matcher) => matcher,
                Err(e) => {
                    warn!(period_id = %period.id, error = %e, "Stored product matcher is invalid");
                    continue;
                }
            };

            if matcher.matches(&product.category, &product.id) {
                let availability = period.specification.availability;
                worst = Some(worst.map_or(availability, |w| w.max(availability)));
            }
        }

        Ok(worst)
    }
}

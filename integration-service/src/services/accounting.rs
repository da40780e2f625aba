//! Usage conversion and reporting.
//!
//! Raw measurements arrive in base units (bytes for storage, replicas for
//! compute, plain counts otherwise). They are converted to the category's
//! product unit, scaled by price and accounting interval, and reported to the
//! accounting service as an absolute balance.

use crate::config::ServerMode;
use crate::models::{
    Category, ComputeResourceType, IndividualProduct, Job, ProductCatalog, ProductCost,
    ProductReference, ProductType, StorageUnit, WalletOwner,
};
use crate::services::accounting_client::{
    AccountingBackend, BulkRequest, ChargeDescription, CheckProviderUsableItem, UsageReportItem,
};
use crate::services::activity::ActivityLedger;
use crate::services::metrics::record_usage_report;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const DEFAULT_STORAGE_UNIT: &str = "GB";
const DEFAULT_COMPUTE_RESOURCE: &str = "Cpu";

pub struct AccountingSystem {
    server_mode: ServerMode,
    catalog: Arc<ProductCatalog>,
    backend: Arc<dyn AccountingBackend>,
    activity: Option<Arc<ActivityLedger>>,
}

impl AccountingSystem {
    pub fn new(
        server_mode: ServerMode,
        catalog: Arc<ProductCatalog>,
        backend: Arc<dyn AccountingBackend>,
    ) -> Self {
        Self {
            server_mode,
            catalog,
            backend,
            activity: None,
        }
    }

    /// Mark the workspace active whenever a report goes through.
    pub fn with_activity_ledger(mut self, ledger: Arc<ActivityLedger>) -> Self {
        self.activity = Some(ledger);
        self
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Convert a base-unit measurement into product units.
    ///
    /// An unknown unit name in the catalog is a [`AppError::ConfigError`].
    pub fn convert_from_base_units_to_product_units(
        &self,
        category: &Category,
        product: &IndividualProduct,
        base_units: i64,
    ) -> Result<i64, AppError> {
        convert_from_base_units_to_product_units(category, product, base_units)
    }

    /// Report the current usage of `product` by `workspace`.
    ///
    /// Returns `Ok(false)` without contacting the accounting service when the
    /// product is not in the catalog. Backend failures propagate.
    #[instrument(skip(self), fields(workspace = %workspace, product = %product))]
    pub async fn report_usage(
        &self,
        workspace: &WalletOwner,
        product: &ProductReference,
        usage_in_base_units: i64,
        minutes_used: Option<i64>,
        scope: Option<&str>,
    ) -> Result<bool, AppError> {
        self.ensure_server_mode()?;

        let Some((category, individual)) = self.catalog.find_category_and_product(product) else {
            warn!(product = %product, "Product is not configured, usage will not be charged");
            record_usage_report(&product.category, "unconfigured");
            return Ok(false);
        };

        let product_units =
            convert_from_base_units_to_product_units(category, individual, usage_in_base_units)?;

        let time_factor = match category.cost.interval() {
            Some(interval) => {
                let minutes = minutes_used.ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "category '{}' is accounted per {:?} but no duration was reported",
                        category.name,
                        interval
                    ))
                })?;
                interval.whole_units(minutes)
            }
            None => 1,
        };

        let price = match category.cost {
            ProductCost::Money { .. } => individual.price,
            _ => 1,
        };

        let balance_used = product_units
            .saturating_mul(price)
            .saturating_mul(time_factor);

        debug!(
            product_units,
            time_factor, balance_used, "Usage converted to balance"
        );

        self.send_report(workspace, &category.name, balance_used, scope)
            .await
    }

    /// Report usage that is already expressed in accounting units.
    #[instrument(skip(self), fields(workspace = %workspace))]
    pub async fn report_raw_usage(
        &self,
        workspace: &WalletOwner,
        category: &str,
        usage_in_ucloud_units: i64,
        scope: Option<&str>,
    ) -> Result<bool, AppError> {
        self.ensure_server_mode()?;
        self.send_report(workspace, category, usage_in_ucloud_units, scope)
            .await
    }

    /// Ask the accounting service whether the job's owner has any quota left
    /// in the job's category.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn user_has_resources_available(&self, job: &Job) -> Result<bool, AppError> {
        let response = self
            .backend
            .check_provider_usable(BulkRequest::single(CheckProviderUsableItem {
                owner: job.owner.to_wallet_owner(),
                category: job.product.category_id(),
            }))
            .await?;

        Ok(response
            .responses
            .first()
            .is_some_and(|usable| usable.max_usable > 0))
    }

    async fn send_report(
        &self,
        workspace: &WalletOwner,
        category: &str,
        usage: i64,
        scope: Option<&str>,
    ) -> Result<bool, AppError> {
        let item = UsageReportItem {
            is_delta_charge: false,
            owner: workspace.clone(),
            category_id: self.catalog.category_id(category),
            usage,
            description: ChargeDescription {
                scope: scope.map(str::to_string),
                description: None,
            },
        };

        match self.backend.report_usage(BulkRequest::single(item)).await {
            Ok(_) => {
                record_usage_report(category, "reported");
                if let Some(ledger) = &self.activity {
                    ledger.track_usage_wallet_owner(workspace);
                }
                Ok(true)
            }
            Err(e) => {
                record_usage_report(category, "failed");
                Err(e)
            }
        }
    }

    fn ensure_server_mode(&self) -> Result<(), AppError> {
        if self.server_mode.should_run_server_code() {
            Ok(())
        } else {
            Err(AppError::FailedPrecondition(anyhow::anyhow!(
                "usage can only be reported in server mode (running as {:?})",
                self.server_mode
            )))
        }
    }
}

pub fn convert_from_base_units_to_product_units(
    category: &Category,
    product: &IndividualProduct,
    base_units: i64,
) -> Result<i64, AppError> {
    if matches!(category.cost, ProductCost::Free) {
        return Ok(0);
    }

    match category.product_type {
        ProductType::Storage => {
            let unit: StorageUnit = category
                .cost
                .unit()
                .unwrap_or(DEFAULT_STORAGE_UNIT)
                .parse()?;
            Ok(unit.from_bytes(base_units))
        }
        ProductType::Compute => {
            let resource: ComputeResourceType = category
                .cost
                .unit()
                .unwrap_or(DEFAULT_COMPUTE_RESOURCE)
                .parse()?;
            let factor = product.spec.compute_resource(resource).ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "product '{}' in compute category '{}' has no compute specification",
                    product.name,
                    category.name
                ))
            })?;
            Ok(base_units.saturating_mul(factor))
        }
        ProductType::Ingress | ProductType::License | ProductType::NetworkIp => Ok(base_units),
    }
}

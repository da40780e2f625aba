//! Domain models for integration-service.

mod activity;
mod maintenance;
mod matcher;
mod owner;
mod product;

pub use activity::{ActivityRecord, ActivitySubject, SubjectKind};
pub use maintenance::{
    parse_period_id, Availability, FindById, MaintenancePeriod, MaintenancePeriodRow,
    MaintenanceSpec, MaintenanceUpdate, Page, Patch, UpdateRequest,
};
pub use matcher::ProductMatcher;
pub use owner::{Job, ResourceOwner, WalletOwner};
pub use product::{
    AccountingInterval, Category, ComputeResourceType, IndividualProduct, ProductCatalog,
    ProductCategoryId, ProductCost, ProductReference, ProductSpec, ProductType, StorageUnit,
};

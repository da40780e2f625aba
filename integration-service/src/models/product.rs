//! Product catalog model.
//!
//! The catalog is loaded once at startup and shared read-only. Unit names stay
//! raw strings here; they are resolved into [`StorageUnit`] or
//! [`ComputeResourceType`] when usage is converted, so a typo in the catalog
//! fails the affected report rather than the whole process.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::matcher::ProductMatcher;
use std::path::Path;
use std::str::FromStr;

/// Kind of resource a category sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Storage,
    Compute,
    Ingress,
    License,
    NetworkIp,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Storage => "STORAGE",
            ProductType::Compute => "COMPUTE",
            ProductType::Ingress => "INGRESS",
            ProductType::License => "LICENSE",
            ProductType::NetworkIp => "NETWORK_IP",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurring period a charge is accounted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingInterval {
    Minutely,
    Hourly,
    Daily,
}

impl AccountingInterval {
    pub fn minutes(&self) -> i64 {
        match self {
            AccountingInterval::Minutely => 1,
            AccountingInterval::Hourly => 60,
            AccountingInterval::Daily => 60 * 24,
        }
    }

    /// Whole intervals contained in `minutes`. Partial intervals are dropped.
    pub fn whole_units(&self, minutes: i64) -> i64 {
        minutes / self.minutes()
    }
}

/// Cost model of a category. Exactly one variant applies per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductCost {
    Free,
    Money {
        currency: String,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        interval: Option<AccountingInterval>,
    },
    Resource {
        #[serde(default)]
        unit: Option<String>,
        #[serde(default, alias = "accountingInterval")]
        accounting_interval: Option<AccountingInterval>,
    },
}

impl ProductCost {
    pub fn unit(&self) -> Option<&str> {
        match self {
            ProductCost::Free => None,
            ProductCost::Money { unit, .. } | ProductCost::Resource { unit, .. } => unit.as_deref(),
        }
    }

    pub fn interval(&self) -> Option<AccountingInterval> {
        match self {
            ProductCost::Free => None,
            ProductCost::Money { interval, .. } => *interval,
            ProductCost::Resource {
                accounting_interval,
                ..
            } => *accounting_interval,
        }
    }
}

/// Storage units, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageUnit {
    MB,
    MiB,
    GB,
    GiB,
    TB,
    TiB,
}

impl StorageUnit {
    pub fn bytes(&self) -> i64 {
        match self {
            StorageUnit::MB => 1000 * 1000,
            StorageUnit::MiB => 1024 * 1024,
            StorageUnit::GB => 1000 * 1000 * 1000,
            StorageUnit::GiB => 1024 * 1024 * 1024,
            StorageUnit::TB => 1000 * 1000 * 1000 * 1000,
            StorageUnit::TiB => 1024 * 1024 * 1024 * 1024,
        }
    }

    /// Whole units needed to hold `bytes`, rounding partial units up.
    pub fn from_bytes(&self, bytes: i64) -> i64 {
        let unit = self.bytes();
        let whole = bytes / unit;
        if bytes % unit > 0 { whole + 1 } else { whole }
    }
}

impl FromStr for StorageUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MB" => Ok(StorageUnit::MB),
            "MiB" => Ok(StorageUnit::MiB),
            "GB" => Ok(StorageUnit::GB),
            "GiB" => Ok(StorageUnit::GiB),
            "TB" => Ok(StorageUnit::TB),
            "TiB" => Ok(StorageUnit::TiB),
            other => Err(invalid_enum_value("StorageUnit", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeResourceType {
    Cpu,
    Memory,
    Gpu,
}

impl FromStr for ComputeResourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cpu" => Ok(ComputeResourceType::Cpu),
            "Memory" => Ok(ComputeResourceType::Memory),
            "Gpu" => Ok(ComputeResourceType::Gpu),
            other => Err(invalid_enum_value("ComputeResourceType", other)),
        }
    }
}

fn invalid_enum_value(kind: &str, value: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(
        "invalid enum value '{}' for {}",
        value,
        kind
    ))
}

/// Type-specific part of a product definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductSpec {
    Compute {
        #[serde(default)]
        cpu: i64,
        #[serde(default)]
        memory: i64,
        #[serde(default)]
        gpu: i64,
    },
    Storage {
        #[serde(default)]
        unit: Option<String>,
    },
    PublicLink,
    PublicIp,
    License {
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl ProductSpec {
    /// Amount of `resource` one unit of a compute product provides.
    pub fn compute_resource(&self, resource: ComputeResourceType) -> Option<i64> {
        match self {
            ProductSpec::Compute { cpu, memory, gpu } => Some(match resource {
                ComputeResourceType::Cpu => *cpu,
                ComputeResourceType::Memory => *memory,
                ComputeResourceType::Gpu => *gpu,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: i64,
    pub spec: ProductSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub cost: ProductCost,
    #[serde(default)]
    pub products: Vec<IndividualProduct>,
}

/// Category identity as seen by the accounting backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductCategoryId {
    pub name: String,
    pub provider: String,
}

/// Reference to a single product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductReference {
    pub id: String,
    pub category: String,
    pub provider: String,
}

impl ProductReference {
    pub fn new(id: &str, category: &str, provider: &str) -> Self {
        Self {
            id: id.to_string(),
            category: category.to_string(),
            provider: provider.to_string(),
        }
    }

    pub fn category_id(&self) -> ProductCategoryId {
        ProductCategoryId {
            name: self.category.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl std::fmt::Display for ProductReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.category, self.id, self.provider)
    }
}

/// All categories this provider sells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub provider: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl ProductCatalog {
    /// Load a catalog file. The format follows the file extension
    /// (TOML, YAML or JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let catalog: ProductCatalog = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        tracing::info!(
            path = %path.display(),
            provider = %catalog.provider,
            categories = catalog.categories.len(),
            "Product catalog loaded"
        );

        Ok(catalog)
    }

    pub fn find_category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn find_category_and_product(
        &self,
        reference: &ProductReference,
    ) -> Option<(&Category, &IndividualProduct)> {
        let category = self.find_category(&reference.category)?;
        let product = category.products.iter().find(|p| p.name == reference.id)?;
        Some((category, product))
    }

    /// Every product, paired with its category.
    pub fn all_products(&self) -> impl Iterator<Item = (&Category, &IndividualProduct)> {
        self.categories
            .iter()
            .flat_map(|c| c.products.iter().map(move |p| (c, p)))
    }

    /// References to every product `matcher` selects.
    pub fn products_matching(&self, matcher: &ProductMatcher) -> Vec<ProductReference> {
        self.all_products()
            .filter(|(category, product)| matcher.matches(&category.name, &product.name))
            .map(|(category, product)| {
                ProductReference::new(&product.name, &category.name, &self.provider)
            })
            .collect()
    }

    pub fn category_id(&self, category: &str) -> ProductCategoryId {
        ProductCategoryId {
            name: category.to_string(),
            provider: self.provider.clone(),
        }
    }
}

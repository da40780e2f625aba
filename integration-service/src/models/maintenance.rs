//! Maintenance period model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use service_core::error::AppError;
use std::str::FromStr;

use super::matcher::ProductMatcher;

/// Availability of the matched products while a period is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    MinorDisruption,
    MajorDisruption,
    NoService,
}

impl Availability {
    /// Column value in `maintenance_periods.availability`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::MinorDisruption => "MINOR_DISRUPTION",
            Availability::MajorDisruption => "MAJOR_DISRUPTION",
            Availability::NoService => "NO_SERVICE",
        }
    }

    /// Short form used on the command line.
    pub fn from_cli(value: &str) -> Option<Self> {
        match value {
            "minor" => Some(Availability::MinorDisruption),
            "major" => Some(Availability::MajorDisruption),
            "unavailable" => Some(Availability::NoService),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Availability::MinorDisruption => "Minor disruption",
            Availability::MajorDisruption => "Major disruption",
            Availability::NoService => "Service unavailable",
        }
    }
}

impl FromStr for Availability {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINOR_DISRUPTION" => Ok(Availability::MinorDisruption),
            "MAJOR_DISRUPTION" => Ok(Availability::MajorDisruption),
            "NO_SERVICE" => Ok(Availability::NoService),
            other => Err(AppError::DatabaseError(anyhow::anyhow!(
                "unknown availability '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an administrator declares when creating a period. Timestamps are
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSpec {
    pub description: String,
    pub availability: Availability,
    pub product_matcher: String,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
}

impl MaintenanceSpec {
    pub fn validate(&self) -> Result<ProductMatcher, AppError> {
        if let Some(ends_at) = self.ends_at {
            if ends_at < self.starts_at {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "endsAt ({}) must not be before startsAt ({})",
                    ends_at,
                    self.starts_at
                )));
            }
        }

        ProductMatcher::parse(&self.product_matcher)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePeriod {
    pub id: String,
    pub specification: MaintenanceSpec,
}

impl MaintenancePeriod {
    /// Ended periods are those whose end lies strictly before `now`.
    pub fn has_ended(&self, now: i64) -> bool {
        matches!(self.specification.ends_at, Some(ends_at) if ends_at < now)
    }

    pub fn has_started(&self, now: i64) -> bool {
        now >= self.specification.starts_at
    }

    pub fn is_active(&self, now: i64) -> bool {
        self.has_started(now) && !self.has_ended(now)
    }

    pub fn matcher(&self) -> Result<ProductMatcher, AppError> {
        ProductMatcher::parse(&self.specification.product_matcher)
    }
}

/// Raw `maintenance_periods` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MaintenancePeriodRow {
    pub id: i64,
    pub availability: String,
    pub product_matcher: String,
    pub starts_at: i64,
    pub ends_at: Option<i64>,
    pub description: String,
}

impl TryFrom<MaintenancePeriodRow> for MaintenancePeriod {
    type Error = AppError;

    fn try_from(row: MaintenancePeriodRow) -> Result<Self, Self::Error> {
        Ok(MaintenancePeriod {
            id: row.id.to_string(),
            specification: MaintenanceSpec {
                description: row.description,
                availability: row.availability.parse()?,
                product_matcher: row.product_matcher,
                starts_at: row.starts_at,
                ends_at: row.ends_at,
            },
        })
    }
}

/// A field of a partial update: either left alone or replaced.
///
/// Unlike `Option`, a `Patch<Option<T>>` can express "set this nullable
/// column to null" (`Set(None)`) separately from "leave it" (`Keep`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Keep => None,
            Patch::Set(value) => Some(value),
        }
    }

    pub fn apply(self, current: T) -> T {
        match self {
            Patch::Keep => current,
            Patch::Set(value) => value,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Keep,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Keep => serializer.serialize_unit(),
            Patch::Set(value) => value.serialize(serializer),
        }
    }
}

// A present field always means `Set`; absence is handled by `#[serde(default)]`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

/// Merge-patch of a maintenance period. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub availability: Patch<Availability>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub product_matcher: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub starts_at: Patch<i64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub ends_at: Patch<Option<i64>>,
}

impl MaintenanceUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_keep()
            && self.availability.is_keep()
            && self.product_matcher.is_keep()
            && self.starts_at.is_keep()
            && self.ends_at.is_keep()
    }

    /// Update that closes a period at `now`.
    pub fn stop_at(now: i64) -> Self {
        Self {
            ends_at: Patch::Set(Some(now)),
            ..Default::default()
        }
    }

    pub fn apply_to(self, spec: MaintenanceSpec) -> MaintenanceSpec {
        MaintenanceSpec {
            description: self.description.apply(spec.description),
            availability: self.availability.apply(spec.availability),
            product_matcher: self.product_matcher.apply(spec.product_matcher),
            starts_at: self.starts_at.apply(spec.starts_at),
            ends_at: self.ends_at.apply(spec.ends_at),
        }
    }
}

/// IPC request carrying a period id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindById {
    pub id: String,
}

/// IPC request for an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub id: String,
    #[serde(flatten)]
    pub update: MaintenanceUpdate,
}

/// One page of results. Browsing returns everything in a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items_per_page: usize,
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn single(items: Vec<T>) -> Self {
        Self {
            items_per_page: items.len(),
            items,
            next: None,
        }
    }
}

/// Parse a period id into the database key.
pub fn parse_period_id(id: &str) -> Result<i64, AppError> {
    id.trim()
        .parse::<i64>()
        .map_err(|_| AppError::NotFound(anyhow::anyhow!("Maintenance period '{}' not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> MaintenanceSpec {
        MaintenanceSpec {
            description: "Storage upgrade".to_string(),
            availability: Availability::NoService,
            product_matcher: "storage".to_string(),
            starts_at: 1_000,
            ends_at: Some(2_000),
        }
    }

    #[test]
    fn update_leaves_omitted_fields_alone() {
        let update = MaintenanceUpdate {
            description: Patch::Set("x".to_string()),
            ..Default::default()
        };

        let merged = update.apply_to(spec());
        assert_eq!(merged.description, "x");
        assert_eq!(merged.availability, Availability::NoService);
        assert_eq!(merged.product_matcher, "storage");
        assert_eq!(merged.starts_at, 1_000);
        assert_eq!(merged.ends_at, Some(2_000));
    }

    #[test]
    fn explicit_null_clears_the_end() {
        let update: MaintenanceUpdate = serde_json::from_str(r#"{"endsAt": null}"#).unwrap();
        assert_eq!(update.ends_at, Patch::Set(None));
        assert!(update.description.is_keep());

        let merged = update.apply_to(spec());
        assert_eq!(merged.ends_at, None);
    }

    #[test]
    fn absent_fields_deserialize_as_keep() {
        let update: MaintenanceUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.is_empty());
        assert_eq!(serde_json::to_string(&update).unwrap(), "{}");
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut invalid = spec();
        invalid.ends_at = Some(999);
        assert!(matches!(invalid.validate(), Err(AppError::BadRequest(_))));
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn activity_window() {
        let period = MaintenancePeriod {
            id: "1".to_string(),
            specification: spec(),
        };
        assert!(!period.is_active(999));
        assert!(period.is_active(1_000));
        assert!(period.is_active(2_000));
        assert!(!period.is_active(2_001));
    }

    #[test]
    fn non_numeric_ids_are_not_found() {
        assert!(matches!(parse_period_id("abc"), Err(AppError::NotFound(_))));
        assert_eq!(parse_period_id(" 42 ").unwrap(), 42);
    }
}

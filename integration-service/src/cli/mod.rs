//! `integration-ctl`: administrative command line over the IPC socket.
//!
//! Arguments are validated by clap before any request is sent, so a bad
//! availability or date prints usage help without contacting the server.

use crate::config::DEFAULT_IPC_SOCKET;
use crate::ipc::IpcClient;
use crate::models::{
    Availability, MaintenancePeriod, MaintenanceSpec, MaintenanceUpdate, Patch, ProductCatalog,
    ProductMatcher,
};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use service_core::error::AppError;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "integration-ctl", version, about = "Administer the provider integration service")]
pub struct Cli {
    /// Path of the service's IPC socket.
    #[arg(long, env = "IPC_SOCKET_PATH", default_value = DEFAULT_IPC_SOCKET)]
    pub socket: PathBuf,

    /// Product catalog used to show which products a period affects.
    #[arg(long, env = "PRODUCT_CATALOG_PATH")]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the maintenance status of products
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),
}

#[derive(Debug, Subcommand)]
pub enum MaintenanceCommand {
    /// List current and upcoming maintenance periods
    Ls,
    /// Create a new maintenance period
    Add(AddArgs),
    /// Show a maintenance period and the products it affects
    Get {
        /// The ID of the maintenance period (see ls)
        id: String,
    },
    /// Update a maintenance period. Omitted options keep their value
    Update(UpdateArgs),
    /// Stop a maintenance period (update with --ends-at set to now)
    Stop {
        /// The ID of the maintenance period (see ls)
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Availability during the maintenance: minor, major or unavailable
    #[arg(value_parser = parse_availability)]
    pub availability: Availability,

    /// Product matcher selecting the affected products
    #[arg(value_parser = parse_product_matcher)]
    pub product_matcher: String,

    /// A description of the maintenance period
    #[arg(long)]
    pub description: String,

    /// Start, as RFC 3339 (for example 2023-10-20T14:00:32+02:00)
    #[arg(long, value_parser = parse_date_and_time)]
    pub starts_at: i64,

    /// End, as RFC 3339. Open-ended when omitted
    #[arg(long, value_parser = parse_date_and_time)]
    pub ends_at: Option<i64>,
}

impl AddArgs {
    pub fn into_spec(self) -> MaintenanceSpec {
        MaintenanceSpec {
            description: self.description,
            availability: self.availability,
            product_matcher: self.product_matcher,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        }
    }
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// The ID of the maintenance period (see ls)
    pub id: String,

    #[arg(long, value_parser = parse_availability)]
    pub availability: Option<Availability>,

    #[arg(long, value_parser = parse_product_matcher)]
    pub products: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_parser = parse_date_and_time)]
    pub starts_at: Option<i64>,

    #[arg(long, value_parser = parse_date_and_time)]
    pub ends_at: Option<i64>,
}

impl UpdateArgs {
    pub fn into_update(self) -> (String, MaintenanceUpdate) {
        let update = MaintenanceUpdate {
            description: self.description.into(),
            availability: self.availability.into(),
            product_matcher: self.products.into(),
            starts_at: self.starts_at.into(),
            ends_at: match self.ends_at {
                Some(ends_at) => Patch::Set(Some(ends_at)),
                None => Patch::Keep,
            },
        };
        (self.id, update)
    }
}

fn parse_availability(value: &str) -> Result<Availability, String> {
    Availability::from_cli(value)
        .ok_or_else(|| "availability must be either 'minor', 'major' or 'unavailable'".to_string())
}

fn parse_product_matcher(value: &str) -> Result<String, String> {
    ProductMatcher::parse(value)
        .map(|_| value.to_string())
        .map_err(|e| e.to_string())
}

fn parse_date_and_time(value: &str) -> Result<i64, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| format!("invalid date and time '{}': {}", value, e))
}

fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.with_timezone(&Local).to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn format_optional_timestamp(millis: Option<i64>) -> String {
    millis.map(format_timestamp).unwrap_or_else(|| "N/A".to_string())
}

pub fn render_table(periods: &[MaintenancePeriod]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<25} {:<25} {:<25} {:<40}",
        "ID", "Availability", "Starts at", "Ends at", "Description"
    );

    for period in periods {
        let spec = &period.specification;
        let summary: String = spec
            .description
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(40)
            .collect();

        let _ = writeln!(
            out,
            "{:<5} {:<25} {:<25} {:<25} {:<40}",
            period.id,
            spec.availability.label(),
            format_timestamp(spec.starts_at),
            format_optional_timestamp(spec.ends_at),
            summary
        );
    }

    out
}

pub fn render_period(period: &MaintenancePeriod, catalog: Option<&ProductCatalog>) -> String {
    let spec = &period.specification;

    let matching = match (catalog, period.matcher()) {
        (Some(catalog), Ok(matcher)) => catalog
            .products_matching(&matcher)
            .iter()
            .map(|product| format!("{} / {}", product.id, product.category))
            .collect::<Vec<_>>()
            .join("\n"),
        (None, _) => "N/A (no product catalog)".to_string(),
        (_, Err(e)) => format!("N/A ({})", e),
    };

    let mut out = String::new();
    let _ = writeln!(out, "Maintenance period");
    let _ = writeln!(out, "{:<20}{}", "ID", period.id);
    let _ = writeln!(out, "{:<20}{}", "Availability", spec.availability.label());
    let _ = writeln!(out, "{:<20}{}", "Starts at", format_timestamp(spec.starts_at));
    let _ = writeln!(out, "{:<20}{}", "Ends at", format_optional_timestamp(spec.ends_at));
    let _ = writeln!(out, "{:<20}{}", "Matching products", matching);
    let _ = writeln!(out, "{:<20}{}", "Description", spec.description);
    out
}

/// Execute a parsed command and return what should be printed.
pub async fn execute(
    command: Command,
    client: &IpcClient,
    catalog: Option<&ProductCatalog>,
    now: i64,
) -> Result<String, AppError> {
    let Command::Maintenance(command) = command;

    match command {
        MaintenanceCommand::Ls => {
            let page = client.browse().await?;
            Ok(render_table(&page.items))
        }
        MaintenanceCommand::Add(args) => {
            let created = client.create(&args.into_spec()).await?;
            Ok(format!("OK! Period ID is {}\n", created.id))
        }
        MaintenanceCommand::Get { id } => {
            let period = client.retrieve(&id).await?;
            Ok(render_period(&period, catalog))
        }
        MaintenanceCommand::Update(args) => {
            let (id, update) = args.into_update();
            client.update(&id, update).await?;
            Ok(format!("OK! Period {} updated\n", id))
        }
        MaintenanceCommand::Stop { id } => {
            client.update(&id, MaintenanceUpdate::stop_at(now)).await?;
            Ok(format!("OK! Period {} stopped\n", id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_validated_before_sending() {
        let cli = Cli::try_parse_from([
            "integration-ctl",
            "maintenance",
            "add",
            "unavailable",
            "storage",
            "--description",
            "Upgrade",
            "--starts-at",
            "2023-10-20T14:00:32+02:00",
        ])
        .unwrap();

        let Command::Maintenance(MaintenanceCommand::Add(args)) = cli.command else {
            panic!("expected add");
        };
        let spec = args.into_spec();
        assert_eq!(spec.availability, Availability::NoService);
        assert_eq!(spec.starts_at, 1_697_803_232_000);
        assert_eq!(spec.ends_at, None);

        assert!(Cli::try_parse_from([
            "integration-ctl", "maintenance", "add", "degraded", "storage",
            "--description", "x", "--starts-at", "2023-10-20T14:00:32+02:00",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "integration-ctl", "maintenance", "add", "minor", "storage",
            "--description", "x", "--starts-at", "yesterday",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "integration-ctl", "maintenance", "add", "minor", "a/b/c",
            "--description", "x", "--starts-at", "2023-10-20T14:00:32+02:00",
        ])
        .is_err());
    }

    #[test]
    fn update_only_sends_given_options() {
        let cli = Cli::try_parse_from([
            "integration-ctl",
            "maintenance",
            "update",
            "7",
            "--availability",
            "major",
        ])
        .unwrap();

        let Command::Maintenance(MaintenanceCommand::Update(args)) = cli.command else {
            panic!("expected update");
        };
        let (id, update) = args.into_update();
        assert_eq!(id, "7");
        assert_eq!(update.availability, Patch::Set(Availability::MajorDisruption));
        assert!(update.description.is_keep());
        assert!(update.ends_at.is_keep());
    }

    #[test]
    fn table_shows_first_description_line() {
        let period = MaintenancePeriod {
            id: "3".to_string(),
            specification: MaintenanceSpec {
                description: "Disk swap\nsecond line".to_string(),
                availability: Availability::MinorDisruption,
                product_matcher: "*".to_string(),
                starts_at: 0,
                ends_at: None,
            },
        };

        let table = render_table(&[period]);
        assert!(table.contains("Minor disruption"));
        assert!(table.contains("Disk swap"));
        assert!(!table.contains("second line"));
        assert!(table.contains("N/A"));
    }
}

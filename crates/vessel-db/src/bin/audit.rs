//! # Ledger Audit Runner
//!
//! Runs the reconciliation auditor and the duplicate detector once and prints
//! the findings as JSON. Meant for cron jobs and manual investigation; it
//! never changes stock.
//!
//! ## Usage
//! ```bash
//! # Sampled reconciliation + 1-day duplicate scan (defaults)
//! cargo run -p vessel-db --bin vessel-audit
//!
//! # Every item, 7-day duplicate window
//! cargo run -p vessel-db --bin vessel-audit -- --all --days 7
//!
//! # Specific items against a specific database
//! cargo run -p vessel-db --bin vessel-audit -- --db ./data/vessel.db --items id-1,id-2
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the filter), the report to stdout.

use std::env;
use std::path::PathBuf;

use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vessel_core::audit::ReconciliationScope;
use vessel_db::{Database, LedgerConfig};

const DEFAULT_SCAN_DAYS: i64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut scope: Option<ReconciliationScope> = None;
    let mut days = DEFAULT_SCAN_DAYS;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--all" | "-a" => scope = Some(ReconciliationScope::All),
            "--items" | "-i" => {
                if i + 1 < args.len() {
                    let ids = args[i + 1]
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect();
                    scope = Some(ReconciliationScope::Items(ids));
                    i += 1;
                }
            }
            "--sample" | "-s" => {
                if i + 1 < args.len() {
                    if let Ok(size) = args[i + 1].parse() {
                        scope = Some(ReconciliationScope::Sample(size));
                    }
                    i += 1;
                }
            }
            "--days" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(DEFAULT_SCAN_DAYS);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Vessel Ledger Audit");
                println!();
                println!("Usage: vessel-audit [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -d, --db <PATH>       Database file, overrides the config");
                println!("  -a, --all             Reconcile every item");
                println!("  -i, --items <IDS>     Reconcile these comma-separated item ids");
                println!("  -s, --sample <N>      Reconcile a random sample of N items");
                println!("      --days <N>        Duplicate scan window in days (default: 1)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    let scope = scope.unwrap_or(ReconciliationScope::Sample(config.audit.sample_size));

    info!(path = %config.database.path.display(), ?scope, days, "Starting audit");

    let db = Database::new(config.db_config()).await?;
    let discrepancies = db.auditor(config.audit.clone()).run(&scope).await?;
    let duplicates = db.detector(config.audit.clone()).scan_last_days(days).await?;
    db.close().await;

    let report = json!({
        "scope": scope,
        "discrepancies": discrepancies,
        "duplicates": duplicates,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Initializes the tracing subscriber, writing to stderr.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: `info,vessel=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vessel=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

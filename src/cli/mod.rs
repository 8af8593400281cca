pub mod export;
pub mod grid;
pub mod init;
pub mod reference;
pub mod reset;
pub mod status;
pub mod summary;

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::db::{SqliteStore, DB_FILE};
use crate::error::{FreightError, Result};
use crate::models::{canonical_month, current_month};
use crate::settings::Settings;

/// Resolve `--month`, defaulting to the current calendar month.
pub(crate) fn resolve_month(month: Option<&str>) -> Result<&'static str> {
    match month {
        Some(m) => canonical_month(m),
        None => Ok(current_month()),
    }
}

/// Open the configured database. Fails if `freightlog init` has not been run.
pub(crate) fn open_store(settings: &Settings) -> Result<SqliteStore> {
    let db_path = PathBuf::from(&settings.data_dir).join(DB_FILE);
    if !db_path.exists() {
        return Err(FreightError::Other(format!(
            "Database not found at {}. Run `freightlog init` to set up.",
            db_path.display()
        )));
    }
    SqliteStore::open(&db_path)
}

pub(crate) fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[derive(Parser)]
#[command(name = "freightlog", about = "Monthly freight shipment log with an inline-editing grid.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up freightlog: choose a data directory and initialize the database.
    Init {
        /// Path for freightlog data (default: ~/Documents/freightlog)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Open the interactive shipment grid.
    Grid {
        /// Month to open (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Print per-company totals for a month.
    Summary {
        /// Month to summarize (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Show settings, database location and per-month totals.
    Status,
    /// Replace a month's records with a single default record.
    Reset {
        /// Month to reset
        #[arg(long)]
        month: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Manage the shared company list.
    Companies {
        #[command(subcommand)]
        command: ReferenceCommands,
    },
    /// Manage the shared location list.
    Locations {
        #[command(subcommand)]
        command: ReferenceCommands,
    },
    /// Export shipments.
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
}

#[derive(Subcommand)]
pub enum ReferenceCommands {
    /// Add an entry (duplicates are rejected case-insensitively).
    Add { name: String },
    /// List entries.
    List,
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// All twelve months as one JSON file.
    Json {
        /// Output file (default: <data_dir>/exports/freight-shipments-<date>.json)
        #[arg(long)]
        output: Option<String>,
    },
    /// Month records and company summary as CSV.
    Csv {
        /// Month to export (default: current month)
        #[arg(long)]
        month: Option<String>,
        /// Export every month
        #[arg(long, conflicts_with = "month")]
        all: bool,
        /// Output directory (default: <data_dir>/exports)
        #[arg(long = "output-dir")]
        output_dir: Option<String>,
    },
}

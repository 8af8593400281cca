mod cli;
mod db;
mod error;
mod export;
mod fmt;
mod grid;
mod models;
mod months;
mod reference;
mod settings;
mod store;
mod summary;
mod tui;

use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::reference::ListKind;
use cli::{Cli, Commands, ExportCommands, ReferenceCommands};

const LOG_FILE: &str = "freightlog.log";

/// Log to `<data_dir>/freightlog.log`; the terminal belongs to the grid.
/// Filter comes from `FREIGHTLOG_LOG` (default `info`). Logging is skipped if
/// the file cannot be opened.
fn init_logging(data_dir: &Path) {
    if std::fs::create_dir_all(data_dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))
    else {
        return;
    };
    let filter = EnvFilter::try_from_env("FREIGHTLOG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    if !matches!(cli.command, Some(Commands::Init { .. })) {
        init_logging(&settings::get_data_dir());
    }

    let result = match cli.command {
        None => cli::grid::run(None),
        Some(Commands::Init { data_dir }) => cli::init::run(data_dir),
        Some(Commands::Grid { month }) => cli::grid::run(month),
        Some(Commands::Summary { month }) => cli::summary::run(month),
        Some(Commands::Status) => cli::status::run(),
        Some(Commands::Reset { month, yes }) => cli::reset::run(&month, yes),
        Some(Commands::Companies { command }) => match command {
            ReferenceCommands::Add { name } => cli::reference::add(ListKind::Companies, &name),
            ReferenceCommands::List => cli::reference::list(ListKind::Companies),
        },
        Some(Commands::Locations { command }) => match command {
            ReferenceCommands::Add { name } => cli::reference::add(ListKind::Locations, &name),
            ReferenceCommands::List => cli::reference::list(ListKind::Locations),
        },
        Some(Commands::Export { command }) => match command {
            ExportCommands::Json { output } => cli::export::json(output),
            ExportCommands::Csv {
                month,
                all,
                output_dir,
            } => cli::export::csv(month, all, output_dir),
        },
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

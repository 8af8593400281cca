use std::path::PathBuf;

use crate::error::Result;
use crate::export::{export_json, export_month_csv, EXPORTS_DIR};
use crate::models::MONTHS;
use crate::settings::{load_settings, shellexpand_path};

pub fn json(output: Option<String>) -> Result<()> {
    let settings = load_settings();
    let store = super::open_store(&settings)?;
    let output = output.map(|p| PathBuf::from(shellexpand_path(&p)));
    let path = export_json(&store, &PathBuf::from(&settings.data_dir), output)?;
    println!("Exported all months to {}", path.display());
    Ok(())
}

pub fn csv(month: Option<String>, all: bool, output_dir: Option<String>) -> Result<()> {
    let settings = load_settings();
    let store = super::open_store(&settings)?;
    let dir = match output_dir {
        Some(d) => PathBuf::from(shellexpand_path(&d)),
        None => PathBuf::from(&settings.data_dir).join(EXPORTS_DIR),
    };

    let months: Vec<&'static str> = if all {
        MONTHS.to_vec()
    } else {
        vec![super::resolve_month(month.as_deref())?]
    };

    for month in months {
        let (records, summary) = export_month_csv(&store, month, &dir)?;
        println!("{month}: {} and {}", records.display(), summary.display());
    }
    Ok(())
}

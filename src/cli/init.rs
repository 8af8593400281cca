use std::path::PathBuf;

use crate::db::{SqliteStore, DB_FILE};
use crate::error::Result;
use crate::export::EXPORTS_DIR;
use crate::months::ensure_all_months;
use crate::reference::ReferenceRegistry;
use crate::settings::{load_settings, save_settings, settings_file_exists, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if !settings_file_exists() {
        // First run: prompt for data dir
        let chosen = super::prompt(&format!("Data directory [{}]: ", settings.data_dir))?;
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(&chosen);
        }
    }

    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join(EXPORTS_DIR))?;

    let store = SqliteStore::open(&resolved.join(DB_FILE))?;
    let refs = ReferenceRegistry::open(&store, settings.shared_reference_data)?;
    let created = ensure_all_months(&store, refs.lists())?;

    println!("Initialized freightlog at {}", resolved.display());
    if created > 0 {
        println!("Created {created} month document(s).");
    }
    Ok(())
}

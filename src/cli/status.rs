use comfy_table::{Cell, Table};

use crate::db::{SqliteStore, DB_FILE};
use crate::error::Result;
use crate::fmt::money;
use crate::models::MONTHS;
use crate::months::load_month;
use crate::reference::ReferenceLists;
use crate::settings::load_settings;
use crate::store::{DocumentStore, CONFIG, GLOBAL_CONFIG_KEY, SHIPMENTS};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!(
        "Timing:     blur commit {}ms, navigation {}ms",
        settings.blur_commit_ms, settings.navigation_delay_ms
    );
    println!(
        "Reference:  {}",
        if settings.shared_reference_data { "shared" } else { "fixed" }
    );

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `freightlog init` to set up.");
        return Ok(());
    }

    let store = SqliteStore::open(&db_path)?;
    let lists = ReferenceLists::from_document(store.read(CONFIG, GLOBAL_CONFIG_KEY)?.as_ref());
    println!("Companies:  {}", lists.companies.len());
    println!("Locations:  {}", lists.locations.len());
    println!("Months:     {}/12", store.count(SHIPMENTS)?);
    println!();
    println!("{}", month_table(&store)?);
    Ok(())
}

fn month_table(store: &dyn DocumentStore) -> Result<Table> {
    let mut table = Table::new();
    table.set_header(vec!["Month", "Shipments", "Total", "Last Modified"]);
    for month in MONTHS {
        let row = match load_month(store, month)? {
            Some(doc) => {
                let total: f64 = doc.shipments.iter().map(|s| s.shipping_charge).sum();
                vec![
                    Cell::new(month),
                    Cell::new(doc.shipments.len()),
                    Cell::new(money(total)),
                    Cell::new(doc.last_modified),
                ]
            }
            None => vec![Cell::new(month), Cell::new("-"), Cell::new("-"), Cell::new("")],
        };
        table.add_row(row);
    }
    Ok(table)
}

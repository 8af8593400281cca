use crate::error::Result;
use crate::models::canonical_month;
use crate::months::{load_month, reset_month};
use crate::reference::ReferenceRegistry;
use crate::settings::load_settings;

pub fn run(month: &str, yes: bool) -> Result<()> {
    let month = canonical_month(month)?;
    let settings = load_settings();
    let store = super::open_store(&settings)?;

    if !yes {
        let rows = load_month(&store, month)?.map_or(0, |doc| doc.shipments.len());
        let answer = super::prompt(&format!(
            "Replace all {rows} shipment(s) in {month} with one blank record? [y/N] "
        ))?;
        if !matches!(answer.as_str(), "y" | "Y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let refs = ReferenceRegistry::open(&store, settings.shared_reference_data)?;
    reset_month(&store, refs.lists(), month)?;
    println!("Reset {month}.");
    Ok(())
}

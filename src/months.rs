use tracing::{debug, info};

use crate::error::Result;
use crate::models::{canonical_month, MonthDocument, Shipment, MONTHS};
use crate::reference::{ReferenceLists, AGENTS, SHIP_METHODS};
use crate::store::{DocumentStore, WriteMode, SHIPMENTS};

/// A blank record with the selector columns prefilled from the first entry of
/// each current reference list.
pub fn default_shipment(lists: &ReferenceLists) -> Shipment {
    let first = |items: &[String]| items.first().cloned().unwrap_or_default();
    let mut shipment = Shipment::empty();
    shipment.company = first(&lists.companies);
    shipment.location = first(&lists.locations);
    shipment.agent = AGENTS.first().map(|s| s.to_string()).unwrap_or_default();
    shipment.ship_method = SHIP_METHODS.first().map(|s| s.to_string()).unwrap_or_default();
    shipment
}

pub fn load_month(store: &dyn DocumentStore, month: &str) -> Result<Option<MonthDocument>> {
    match store.read(SHIPMENTS, month)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Full-document write of the month's record list.
pub fn save_month(store: &dyn DocumentStore, month: &str, shipments: Vec<Shipment>) -> Result<()> {
    let doc = MonthDocument::new(month, shipments);
    let value = serde_json::to_value(&doc)?;
    store.write(SHIPMENTS, month, &value, WriteMode::Replace)?;
    debug!(month, rows = doc.shipments.len(), "month saved");
    Ok(())
}

/// Make sure `month` has a document with at least one record. Returns true if
/// a default document was written. The read and the write are separate
/// operations; concurrent callers may both write.
pub fn ensure_month(store: &dyn DocumentStore, lists: &ReferenceLists, month: &str) -> Result<bool> {
    let month = canonical_month(month)?;
    let needs_default = match store.read(SHIPMENTS, month)? {
        None => true,
        Some(value) => value
            .get("shipments")
            .and_then(|s| s.as_array())
            .map_or(true, |rows| rows.is_empty()),
    };
    if needs_default {
        info!(month, "bootstrapping month with default record");
        save_month(store, month, vec![default_shipment(lists)])?;
    }
    Ok(needs_default)
}

/// Run `ensure_month` for all twelve months. Returns how many were bootstrapped.
pub fn ensure_all_months(store: &dyn DocumentStore, lists: &ReferenceLists) -> Result<usize> {
    let mut created = 0;
    for month in MONTHS {
        if ensure_month(store, lists, month)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Overwrite the month with a single default record.
pub fn reset_month(store: &dyn DocumentStore, lists: &ReferenceLists, month: &str) -> Result<()> {
    let month = canonical_month(month)?;
    info!(month, "resetting month to default record");
    save_month(store, month, vec![default_shipment(lists)])
}

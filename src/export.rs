use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::fmt::{money, percent};
use crate::models::{Field, Shipment, MONTHS};
use crate::months::load_month;
use crate::store::DocumentStore;
use crate::summary::summarize;

pub const EXPORTS_DIR: &str = "exports";

/// `{ "<Month>": [shipments...] }` for all twelve months.
/// Missing months export as empty arrays.
pub fn all_months_json(store: &dyn DocumentStore) -> Result<Value> {
    let mut out = Map::new();
    for month in MONTHS {
        let shipments = load_month(store, month)?
            .map(|doc| doc.shipments)
            .unwrap_or_default();
        out.insert(month.to_string(), serde_json::to_value(shipments)?);
    }
    Ok(Value::Object(out))
}

pub fn json_file_name(date: chrono::NaiveDate) -> String {
    format!("freight-shipments-{}.json", date.format("%Y-%m-%d"))
}

/// Write the all-months JSON export. Returns the path written.
pub fn export_json(store: &dyn DocumentStore, data_dir: &Path, output: Option<PathBuf>) -> Result<PathBuf> {
    let path = match output {
        Some(p) => p,
        None => {
            let dir = data_dir.join(EXPORTS_DIR);
            std::fs::create_dir_all(&dir)?;
            dir.join(json_file_name(chrono::Local::now().date_naive()))
        }
    };
    let value = all_months_json(store)?;
    std::fs::write(&path, format!("{}\n", serde_json::to_string_pretty(&value)?))?;
    info!(path = %path.display(), "json export written");
    Ok(path)
}

/// One row per shipment with the grid's column order. The id is omitted.
pub fn write_month_csv<W: Write>(writer: W, shipments: &[Shipment]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(Field::ORDER.iter().map(|f| f.label()))?;
    for s in shipments {
        let row: Vec<String> = Field::ORDER
            .iter()
            .map(|&f| match f {
                Field::ShippingCharge => money(s.shipping_charge),
                _ => s.get(f),
            })
            .collect();
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Per-company rows in summary order, then a total row.
pub fn write_summary_csv<W: Write>(writer: W, shipments: &[Shipment]) -> Result<()> {
    let summary = summarize(shipments);
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Company", "Shipments", "Total", "Share"])?;
    for c in &summary.companies {
        wtr.write_record([
            c.company.clone(),
            c.count.to_string(),
            money(c.total),
            percent(c.pct),
        ])?;
    }
    let share = if summary.total > 0.0 { percent(100.0) } else { percent(0.0) };
    wtr.write_record([
        "TOTAL".to_string(),
        summary.record_count.to_string(),
        money(summary.total),
        share,
    ])?;
    wtr.flush()?;
    Ok(())
}

/// Write `<month>.csv` and `<month>-summary.csv` into `dir`. Returns both paths.
pub fn export_month_csv(store: &dyn DocumentStore, month: &str, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let shipments = load_month(store, month)?
        .map(|doc| doc.shipments)
        .unwrap_or_default();

    let records_path = dir.join(format!("{month}.csv"));
    write_month_csv(std::fs::File::create(&records_path)?, &shipments)?;

    let summary_path = dir.join(format!("{month}-summary.csv"));
    write_summary_csv(std::fs::File::create(&summary_path)?, &shipments)?;

    info!(month, rows = shipments.len(), dir = %dir.display(), "csv export written");
    Ok((records_path, summary_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::months::save_month;
    use crate::store::test_support::MemoryStore;

    fn shipment(ref_num: &str, company: &str, charge: f64) -> Shipment {
        let mut s = Shipment::empty();
        s.ref_num = ref_num.into();
        s.company = company.into();
        s.shipping_charge = charge;
        s
    }

    #[test]
    fn test_json_has_all_months() {
        let store = MemoryStore::new();
        save_month(&store, "March", vec![shipment("R1", "A", 5.0)]).unwrap();
        let value = all_months_json(&store).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 12);
        assert_eq!(obj["March"][0]["refNum"], "R1");
        assert_eq!(obj["January"], serde_json::json!([]));
    }

    #[test]
    fn test_json_file_name() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(json_file_name(date), "freight-shipments-2026-03-09.json");
    }

    #[test]
    fn test_month_csv_columns_and_money() {
        let mut buf = Vec::new();
        write_month_csv(&mut buf, &[shipment("R1", "ACME", 1234.5)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Reference,Ship Date,Return Date,Location,Return Location,Company,Ship Method,Charges,PO,Agent"
        );
        assert_eq!(lines.next().unwrap(), "R1,,,,,ACME,,\"$1,234.50\",,");
        assert!(!text.contains("id"));
    }

    #[test]
    fn test_summary_csv_rows() {
        let rows = vec![shipment("1", "A", 10.0), shipment("2", "B", 30.0), shipment("3", "A", 5.0)];
        let mut buf = Vec::new();
        write_summary_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Company,Shipments,Total,Share");
        assert_eq!(lines[1], "B,1,$30.00,66.7%");
        assert_eq!(lines[2], "A,2,$15.00,33.3%");
        assert_eq!(lines[3], "TOTAL,3,$45.00,100.0%");
    }

    #[test]
    fn test_export_month_csv_writes_both_files() {
        let store = MemoryStore::new();
        save_month(&store, "June", vec![shipment("R9", "A", 1.0)]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (records, summary) = export_month_csv(&store, "June", dir.path()).unwrap();
        assert!(records.ends_with("June.csv"));
        assert!(summary.ends_with("June-summary.csv"));
        assert!(std::fs::read_to_string(records).unwrap().contains("R9"));
    }

    #[test]
    fn test_export_json_default_location() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = export_json(&store, dir.path(), None).unwrap();
        assert!(path.starts_with(dir.path().join(EXPORTS_DIR)));
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 12);
    }
}

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::{bar, money, percent};
use crate::months::load_month;
use crate::settings::load_settings;
use crate::summary::{bar_width, summarize, Summary};

const BAR_WIDTH: usize = 30;

pub fn run(month: Option<String>) -> Result<()> {
    let month = super::resolve_month(month.as_deref())?;
    let store = super::open_store(&load_settings())?;
    let shipments = load_month(&store, month)?
        .map(|doc| doc.shipments)
        .unwrap_or_default();
    println!("{}", format_summary(month, &summarize(&shipments)));
    Ok(())
}

pub fn format_summary(month: &str, summary: &Summary) -> String {
    if summary.record_count == 0 {
        return format!("{month}: no shipments.");
    }

    let max = summary.companies.first().map(|c| c.total).unwrap_or(0.0);
    let mut table = Table::new();
    table.set_header(vec!["Company", "Shipments", "Total", "Share", ""]);
    for c in &summary.companies {
        table.add_row(vec![
            Cell::new(&c.company),
            Cell::new(c.count),
            Cell::new(money(c.total)),
            Cell::new(percent(c.pct)),
            Cell::new(bar(bar_width(c.total, max, BAR_WIDTH)).green().to_string()),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(summary.record_count),
        Cell::new(money(summary.total)),
        Cell::new(""),
        Cell::new(""),
    ]);

    format!(
        "Shipping Summary: {month}\n{table}\nCompanies: {}   Average charge: {}",
        summary.company_count,
        money(summary.average)
    )
}

use std::collections::HashMap;

use crate::models::Shipment;

/// Bucket for records with no company.
pub const UNASSIGNED: &str = "(Unassigned)";

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyTotal {
    pub company: String,
    pub count: usize,
    pub total: f64,
    /// Share of the grand total, 0..=100.
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub companies: Vec<CompanyTotal>,
    pub total: f64,
    pub record_count: usize,
    pub company_count: usize,
    pub average: f64,
}

pub fn company_key(company: &str) -> &str {
    let trimmed = company.trim();
    if trimmed.is_empty() {
        UNASSIGNED
    } else {
        trimmed
    }
}

/// Per-company counts and totals, sorted by total descending.
pub fn summarize(shipments: &[Shipment]) -> Summary {
    let mut buckets: HashMap<&str, (usize, f64)> = HashMap::new();
    for s in shipments {
        let entry = buckets.entry(company_key(&s.company)).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += s.shipping_charge;
    }

    let total: f64 = shipments.iter().map(|s| s.shipping_charge).sum();
    let mut companies: Vec<CompanyTotal> = buckets
        .into_iter()
        .map(|(company, (count, sum))| CompanyTotal {
            company: company.to_string(),
            count,
            total: sum,
            pct: if total != 0.0 { sum / total * 100.0 } else { 0.0 },
        })
        .collect();
    companies.sort_by(|a, b| {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.company.cmp(&b.company))
    });

    let record_count = shipments.len();
    Summary {
        company_count: companies.len(),
        companies,
        total,
        record_count,
        average: if record_count > 0 { total / record_count as f64 } else { 0.0 },
    }
}

/// Length of a text bar for `value` scaled against `max`.
pub fn bar_width(value: f64, max: f64, width: usize) -> usize {
    if width == 0 || max <= 0.0 || value <= 0.0 {
        return 0;
    }
    ((value / max) * width as f64).round().clamp(1.0, width as f64) as usize
}

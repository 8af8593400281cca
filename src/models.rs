use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FreightError, Result};

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Resolve a month name case-insensitively to its canonical spelling.
pub fn canonical_month(name: &str) -> Result<&'static str> {
    let wanted = name.trim();
    MONTHS
        .iter()
        .copied()
        .find(|m| m.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| FreightError::UnknownMonth(name.to_string()))
}

pub fn current_month() -> &'static str {
    use chrono::Datelike;
    let idx = chrono::Local::now().month0() as usize;
    MONTHS[idx]
}

/// Month `delta` steps away from `month`, wrapping around the year.
pub fn step_month(month: &str, delta: i32) -> &'static str {
    let idx = MONTHS.iter().position(|m| *m == month).unwrap_or(0) as i32;
    MONTHS[(idx + delta).rem_euclid(12) as usize]
}

/// Grid columns, in left-to-right order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    RefNum,
    ShipDate,
    ReturnDate,
    Location,
    ReturnLocation,
    Company,
    ShipMethod,
    ShippingCharge,
    Po,
    Agent,
}

impl Field {
    pub const ORDER: [Field; 10] = [
        Field::RefNum,
        Field::ShipDate,
        Field::ReturnDate,
        Field::Location,
        Field::ReturnLocation,
        Field::Company,
        Field::ShipMethod,
        Field::ShippingCharge,
        Field::Po,
        Field::Agent,
    ];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    /// The field to the right, or `None` at the last column.
    pub fn next(self) -> Option<Field> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<Field> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::RefNum => "Reference",
            Field::ShipDate => "Ship Date",
            Field::ReturnDate => "Return Date",
            Field::Location => "Location",
            Field::ReturnLocation => "Return Location",
            Field::Company => "Company",
            Field::ShipMethod => "Ship Method",
            Field::ShippingCharge => "Charges",
            Field::Po => "PO",
            Field::Agent => "Agent",
        }
    }

    pub fn is_autocomplete(self) -> bool {
        matches!(
            self,
            Field::Company | Field::Agent | Field::Location | Field::ReturnLocation | Field::ShipMethod
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub ref_num: String,
    #[serde(default)]
    pub ship_date: String,
    #[serde(default)]
    pub return_date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub return_location: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub ship_method: String,
    #[serde(default, deserialize_with = "lenient_charge")]
    pub shipping_charge: f64,
    #[serde(default)]
    pub po: String,
    #[serde(default)]
    pub agent: String,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Shipment {
    pub fn empty() -> Self {
        Self {
            id: new_id(),
            ref_num: String::new(),
            ship_date: String::new(),
            return_date: String::new(),
            location: String::new(),
            return_location: String::new(),
            company: String::new(),
            ship_method: String::new(),
            shipping_charge: 0.0,
            po: String::new(),
            agent: String::new(),
        }
    }

    /// Text shown in the grid and used to seed the edit buffer.
    pub fn get(&self, field: Field) -> String {
        match field {
            Field::RefNum => self.ref_num.clone(),
            Field::ShipDate => self.ship_date.clone(),
            Field::ReturnDate => self.return_date.clone(),
            Field::Location => self.location.clone(),
            Field::ReturnLocation => self.return_location.clone(),
            Field::Company => self.company.clone(),
            Field::ShipMethod => self.ship_method.clone(),
            Field::ShippingCharge => format_charge(self.shipping_charge),
            Field::Po => self.po.clone(),
            Field::Agent => self.agent.clone(),
        }
    }

    /// Store `value` into `field`. The charge is parsed; everything else is
    /// kept as literal text.
    pub fn set(&mut self, field: Field, value: &str) {
        let value = value.to_string();
        match field {
            Field::RefNum => self.ref_num = value,
            Field::ShipDate => self.ship_date = value,
            Field::ReturnDate => self.return_date = value,
            Field::Location => self.location = value,
            Field::ReturnLocation => self.return_location = value,
            Field::Company => self.company = value,
            Field::ShipMethod => self.ship_method = value,
            Field::ShippingCharge => self.shipping_charge = parse_charge(&value),
            Field::Po => self.po = value,
            Field::Agent => self.agent = value,
        }
    }
}

/// Parse a charge, tolerating a leading `$` and thousands separators.
/// Anything unparseable, negative, or non-finite becomes 0.
pub fn parse_charge(input: &str) -> f64 {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

pub fn format_charge(val: f64) -> String {
    if val.fract() == 0.0 {
        format!("{val:.0}")
    } else {
        format!("{val}")
    }
}

fn lenient_charge<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n.as_f64().map(|v| parse_charge(&v.to_string())).unwrap_or(0.0),
        serde_json::Value::String(s) => parse_charge(&s),
        _ => 0.0,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthDocument {
    #[serde(default)]
    pub shipments: Vec<Shipment>,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub month: String,
}

impl MonthDocument {
    pub fn new(month: &str, shipments: Vec<Shipment>) -> Self {
        Self {
            shipments,
            last_modified: chrono::Utc::now().to_rfc3339(),
            month: month.to_string(),
        }
    }
}

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{FreightError, Result};
use crate::models::Field;
use crate::store::{DocumentStore, Subscription, WriteMode, CONFIG, GLOBAL_CONFIG_KEY};

pub const DEFAULT_COMPANIES: &[&str] = &[
    "ATLAS FREIGHT",
    "BLUE RIVER CARGO",
    "CONTINENTAL EXPRESS",
    "NORTHSTAR LOGISTICS",
    "PACIFIC LINES",
];

pub const DEFAULT_LOCATIONS: &[&str] = &[
    "Chicago",
    "Dallas",
    "Los Angeles",
    "Newark",
    "Seattle",
];

pub const AGENTS: &[&str] = &["Alex", "Jordan", "Morgan", "Sam", "Taylor"];

pub const SHIP_METHODS: &[&str] = &["Ground", "Air", "Ocean", "LTL", "FTL"];

/// Current snapshot of the option lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLists {
    pub companies: Vec<String>,
    pub locations: Vec<String>,
}

impl Default for ReferenceLists {
    fn default() -> Self {
        Self {
            companies: to_owned(DEFAULT_COMPANIES),
            locations: to_owned(DEFAULT_LOCATIONS),
        }
    }
}

impl ReferenceLists {
    /// Build from a config document, using the defaults for any list that is
    /// missing, empty, or not a list of strings.
    pub fn from_document(doc: Option<&Value>) -> Self {
        let defaults = Self::default();
        let pick = |name: &str, fallback: Vec<String>| {
            doc.and_then(|d| string_list(d.get(name)))
                .filter(|l| !l.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            companies: pick("companies", defaults.companies),
            locations: pick("locations", defaults.locations),
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Append `candidate` unless it matches an existing entry case-insensitively,
/// then re-sort the list case-insensitively.
pub fn insert_sorted(list: &[String], candidate: &str) -> Result<Vec<String>> {
    let lowered = candidate.to_lowercase();
    if list.iter().any(|item| item.to_lowercase() == lowered) {
        return Err(FreightError::Duplicate(candidate.to_string()));
    }
    let mut updated = list.to_vec();
    updated.push(candidate.to_string());
    updated.sort_by_key(|item| item.to_lowercase());
    Ok(updated)
}

enum Source {
    Fixed,
    Shared {
        updates: Receiver<Option<Value>>,
        _subscription: Subscription,
    },
}

/// Owner of the companies/locations lists. In the shared variant the lists
/// live in the global config document and are replaced wholesale whenever it
/// changes.
pub struct ReferenceRegistry {
    lists: ReferenceLists,
    source: Source,
}

impl ReferenceRegistry {
    pub fn fixed() -> Self {
        Self {
            lists: ReferenceLists::default(),
            source: Source::Fixed,
        }
    }

    /// Open the shared variant: create or backfill the config document, then
    /// subscribe to it.
    pub fn shared(store: &dyn DocumentStore) -> Result<Self> {
        bootstrap_config(store)?;
        let (tx, rx) = mpsc::channel();
        let subscription = store.subscribe(
            CONFIG,
            GLOBAL_CONFIG_KEY,
            Arc::new(move |doc: Option<&Value>| {
                let _ = tx.send(doc.cloned());
            }),
        )?;
        let mut registry = Self {
            lists: ReferenceLists::default(),
            source: Source::Shared {
                updates: rx,
                _subscription: subscription,
            },
        };
        registry.sync();
        Ok(registry)
    }

    pub fn open(store: &dyn DocumentStore, shared: bool) -> Result<Self> {
        if shared {
            Self::shared(store)
        } else {
            Ok(Self::fixed())
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.source, Source::Shared { .. })
    }

    /// Apply any pushed updates. Returns true if the lists were replaced.
    pub fn sync(&mut self) -> bool {
        let Source::Shared { updates, .. } = &self.source else {
            return false;
        };
        let mut latest = None;
        while let Ok(doc) = updates.try_recv() {
            latest = Some(doc);
        }
        match latest {
            Some(doc) => {
                self.lists = ReferenceLists::from_document(doc.as_ref());
                true
            }
            None => false,
        }
    }

    pub fn lists(&self) -> &ReferenceLists {
        &self.lists
    }

    pub fn companies(&self) -> &[String] {
        &self.lists.companies
    }

    pub fn locations(&self) -> &[String] {
        &self.lists.locations
    }

    /// Autocomplete candidates for a field; empty for free-text fields.
    pub fn candidates(&self, field: Field) -> Vec<String> {
        match field {
            Field::Company => self.lists.companies.clone(),
            Field::Location | Field::ReturnLocation => self.lists.locations.clone(),
            Field::Agent => to_owned(AGENTS),
            Field::ShipMethod => to_owned(SHIP_METHODS),
            _ => Vec::new(),
        }
    }

    /// Add a company. Names are stored uppercase. Returns the stored name.
    pub fn add_company(&self, store: &dyn DocumentStore, name: &str) -> Result<String> {
        let candidate = name.trim().to_uppercase();
        self.add_item(store, "companies", &self.lists.companies, candidate)
    }

    /// Add a location, keeping its casing. Returns the stored name.
    pub fn add_location(&self, store: &dyn DocumentStore, name: &str) -> Result<String> {
        let candidate = name.trim().to_string();
        self.add_item(store, "locations", &self.lists.locations, candidate)
    }

    fn add_item(
        &self,
        store: &dyn DocumentStore,
        list_name: &str,
        current: &[String],
        candidate: String,
    ) -> Result<String> {
        if !self.is_shared() {
            return Err(FreightError::Other(
                "Shared reference data is disabled; lists are fixed".into(),
            ));
        }
        if candidate.is_empty() {
            return Err(FreightError::Other("Name cannot be empty".into()));
        }
        let updated = insert_sorted(current, &candidate)?;
        let mut patch = serde_json::Map::new();
        patch.insert(list_name.to_string(), json!(updated));
        patch.insert("updatedAt".into(), json!(chrono::Utc::now().to_rfc3339()));
        store
            .write(CONFIG, GLOBAL_CONFIG_KEY, &Value::Object(patch), WriteMode::Merge)
            .inspect_err(|e| warn!(list = list_name, error = %e, "reference data write failed"))?;
        info!(list = list_name, item = %candidate, "reference item added");
        Ok(candidate)
    }
}

fn bootstrap_config(store: &dyn DocumentStore) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    match store.read(CONFIG, GLOBAL_CONFIG_KEY)? {
        None => {
            info!("creating global reference config");
            let doc = json!({
                "companies": DEFAULT_COMPANIES,
                "locations": DEFAULT_LOCATIONS,
                "createdAt": now,
                "updatedAt": now,
            });
            store.write(CONFIG, GLOBAL_CONFIG_KEY, &doc, WriteMode::Replace)
        }
        Some(doc) => {
            let mut patch = serde_json::Map::new();
            if doc.get("companies").is_none() {
                patch.insert("companies".into(), json!(DEFAULT_COMPANIES));
            }
            if doc.get("locations").is_none() {
                patch.insert("locations".into(), json!(DEFAULT_LOCATIONS));
            }
            if patch.is_empty() {
                return Ok(());
            }
            info!(fields = ?patch.keys().collect::<Vec<_>>(), "backfilling global reference config");
            patch.insert("updatedAt".into(), json!(now));
            store.write(CONFIG, GLOBAL_CONFIG_KEY, &Value::Object(patch), WriteMode::Merge)
        }
    }
}

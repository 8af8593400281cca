use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use crate::error::Result;

pub const SHIPMENTS: &str = "shipments";
pub const CONFIG: &str = "config";
pub const GLOBAL_CONFIG_KEY: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document.
    Replace,
    /// Merge object fields into the existing document.
    Merge,
}

/// Change callback. Called with the current document, or `None` when absent.
pub type Listener = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Key/value document database addressed by collection + key.
pub trait DocumentStore {
    fn read(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    fn write(&self, collection: &str, key: &str, doc: &Value, mode: WriteMode) -> Result<()>;

    /// Register `listener` for one document. It is called once with the
    /// current snapshot, then after every change until the returned
    /// subscription is dropped.
    fn subscribe(&self, collection: &str, key: &str, listener: Listener) -> Result<Subscription>;

    /// Deliver changes made by other parties to local subscribers.
    fn poll_changes(&self) -> Result<()> {
        Ok(())
    }
}

/// Merge `patch` into `target`: objects merge recursively, anything else
/// replaces.
pub fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                let nested = v.is_object() && existing.get(k).is_some_and(Value::is_object);
                if nested {
                    if let Some(slot) = existing.get_mut(k) {
                        merge_into(slot, v);
                    }
                } else {
                    existing.insert(k.clone(), v.clone());
                }
            }
        }
        (slot, v) => *slot = v.clone(),
    }
}

struct ListenerEntry {
    id: u64,
    collection: String,
    key: String,
    listener: Listener,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

fn lock(table: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Subscription routing shared by store implementations.
#[derive(Default, Clone)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collection: &str, key: &str, listener: Listener) -> Subscription {
        let mut table = lock(&self.table);
        table.next_id += 1;
        let id = table.next_id;
        table.entries.push(ListenerEntry {
            id,
            collection: collection.to_string(),
            key: key.to_string(),
            listener,
        });
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Call every listener registered for the document. Handlers are cloned
    /// out of the table first, so a listener may subscribe or unsubscribe.
    pub fn notify(&self, collection: &str, key: &str, doc: Option<&Value>) {
        let handlers: Vec<Listener> = lock(&self.table)
            .entries
            .iter()
            .filter(|e| e.collection == collection && e.key == key)
            .map(|e| e.listener.clone())
            .collect();
        for handler in handlers {
            handler(doc);
        }
    }

    /// Distinct documents that currently have at least one listener.
    pub fn watched(&self) -> Vec<(String, String)> {
        let table = lock(&self.table);
        let mut docs: Vec<(String, String)> = Vec::new();
        for e in &table.entries {
            if !docs.iter().any(|(c, k)| *c == e.collection && *k == e.key) {
                docs.push((e.collection.clone(), e.key.clone()));
            }
        }
        docs
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }
}

/// Deregistration handle. Dropping it has the same effect as `unsubscribe`.
pub struct Subscription {
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            lock(&table).entries.retain(|e| e.id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let mut doc = json!({"companies": ["A"], "locations": ["X"], "meta": {"a": 1}});
        merge_into(&mut doc, &json!({"locations": ["Y", "Z"], "meta": {"b": 2}}));
        assert_eq!(doc["companies"], json!(["A"]));
        assert_eq!(doc["locations"], json!(["Y", "Z"]));
        assert_eq!(doc["meta"], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_notify_reaches_only_matching_document() {
        let listeners = Listeners::new();
        let (tx, rx) = mpsc::channel();
        let _sub = listeners.register(
            "shipments",
            "March",
            Arc::new(move |doc: Option<&Value>| {
                let _ = tx.send(doc.cloned());
            }),
        );

        listeners.notify("shipments", "April", Some(&json!({"month": "April"})));
        assert!(rx.try_recv().is_err());

        listeners.notify("shipments", "March", Some(&json!({"month": "March"})));
        assert_eq!(rx.try_recv().unwrap(), Some(json!({"month": "March"})));
    }

    #[test]
    fn test_dropping_subscription_deregisters() {
        let listeners = Listeners::new();
        let sub = listeners.register("config", "global", Arc::new(|_: Option<&Value>| {}));
        let other = listeners.register("config", "global", Arc::new(|_: Option<&Value>| {}));
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners.watched().len(), 1);

        sub.unsubscribe();
        assert_eq!(listeners.len(), 1);
        drop(other);
        assert_eq!(listeners.len(), 0);
        assert!(listeners.watched().is_empty());
    }
}

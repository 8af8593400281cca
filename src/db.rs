use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{FreightError, Result};
use crate::store::{merge_into, DocumentStore, Listener, Listeners, Subscription, WriteMode};

pub const DB_FILE: &str = "freightlog.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    body TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (collection, key)
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Document store backed by one SQLite table. Every write bumps the row's
/// revision; `poll_changes` compares revisions to pick up writes made through
/// other connections to the same file.
pub struct SqliteStore {
    conn: Connection,
    listeners: Listeners,
    /// Last revision delivered to local listeners, 0 when absent.
    seen: RefCell<HashMap<(String, String), i64>>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            listeners: Listeners::new(),
            seen: RefCell::new(HashMap::new()),
        }
    }

    fn load(&self, collection: &str, key: &str) -> Result<Option<(Value, i64)>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT body, revision FROM documents WHERE collection = ?1 AND key = ?2",
                rusqlite::params![collection, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((body, revision)) => Ok(Some((serde_json::from_str(&body)?, revision))),
            None => Ok(None),
        }
    }

    fn revision(&self, collection: &str, key: &str) -> Result<i64> {
        let rev: Option<i64> = self
            .conn
            .query_row(
                "SELECT revision FROM documents WHERE collection = ?1 AND key = ?2",
                rusqlite::params![collection, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rev.unwrap_or(0))
    }

    fn mark_seen(&self, collection: &str, key: &str, revision: i64) {
        self.seen
            .borrow_mut()
            .insert((collection.to_string(), key.to_string()), revision);
    }

    pub fn count(&self, collection: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT count(*) FROM documents WHERE collection = ?1",
            [collection],
            |r| r.get(0),
        )?)
    }
}

impl DocumentStore for SqliteStore {
    fn read(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.load(collection, key)?.map(|(doc, _)| doc))
    }

    fn write(&self, collection: &str, key: &str, doc: &Value, mode: WriteMode) -> Result<()> {
        let body = match (mode, self.read(collection, key)?) {
            (WriteMode::Merge, Some(mut existing)) if existing.is_object() => {
                merge_into(&mut existing, doc);
                existing
            }
            _ => doc.clone(),
        };
        let text = serde_json::to_string(&body)?;
        self.conn
            .execute(
                "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(collection, key) DO UPDATE SET \
                 body = excluded.body, revision = documents.revision + 1, updated_at = datetime('now')",
                rusqlite::params![collection, key, text],
            )
            .map_err(FreightError::from_sqlite)?;
        let revision = self.revision(collection, key)?;
        debug!(collection, key, revision, ?mode, "document written");
        self.mark_seen(collection, key, revision);
        self.listeners.notify(collection, key, Some(&body));
        Ok(())
    }

    fn subscribe(&self, collection: &str, key: &str, listener: Listener) -> Result<Subscription> {
        let current = self.load(collection, key)?;
        let revision = current.as_ref().map(|(_, rev)| *rev).unwrap_or(0);
        self.mark_seen(collection, key, revision);
        listener(current.as_ref().map(|(doc, _)| doc));
        Ok(self.listeners.register(collection, key, listener))
    }

    fn poll_changes(&self) -> Result<()> {
        for (collection, key) in self.listeners.watched() {
            let revision = self.revision(&collection, &key)?;
            let last = self
                .seen
                .borrow()
                .get(&(collection.clone(), key.clone()))
                .copied()
                .unwrap_or(0);
            if revision == last {
                continue;
            }
            info!(%collection, %key, revision, "remote change detected");
            self.mark_seen(&collection, &key, revision);
            let doc = self.read(&collection, &key)?;
            self.listeners.notify(&collection, &key, doc.as_ref());
        }
        Ok(())
    }
}

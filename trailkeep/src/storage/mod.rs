//! Storage backends behind the persistence store.
//!
//! Both backends hold the same three logical collections and speak
//! [`Record`]s: a key, an integer sort key (newest-first ordering) and a
//! JSON value. The primary is SQLite; the fallback is a flat key/value
//! store holding JSON text under fixed keys.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

pub mod kv;
pub mod sqlite;

pub use kv::{FileKeyValueStore, KeyValueBackend, KeyValueStore, MemoryKeyValueStore};
pub use sqlite::SqliteBackend;

/// Fixed key of the single backup slot.
pub const BACKUP_KEY: &str = "current_route";

/// Logical record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Finalized routes, keyed by route id
    Routes,
    /// Single-slot snapshot
    Backups,
    /// Preferences and the migration marker
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Routes, Collection::Backups, Collection::Settings];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Routes => "routes",
            Collection::Backups => "backups",
            Collection::Settings => "settings",
        }
    }
}

/// Which backend served an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    KeyValue,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::KeyValue => write!(f, "key-value"),
        }
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub key: String,
    /// Ordering key; listings are returned with the largest first
    #[serde(default)]
    pub sort_key: i64,
    pub value: Value,
}

impl Record {
    pub fn new(key: impl Into<String>, sort_key: i64, value: Value) -> Self {
        Self {
            key: key.into(),
            sort_key,
            value,
        }
    }

    /// Serialize a typed value into a record.
    pub fn encode<T: Serialize>(key: impl Into<String>, sort_key: i64, value: &T) -> StoreResult<Self> {
        Ok(Self::new(key, sort_key, serde_json::to_value(value)?))
    }

    /// Decode the value into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| StoreError::Corrupt {
            key: self.key.clone(),
            message: e.to_string(),
        })
    }
}

/// Sort records newest first (by sort key, then key).
pub(crate) fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.sort_key.cmp(&a.sort_key).then_with(|| b.key.cmp(&a.key)));
}

/// Synchronous record store. Callers run these on a blocking thread.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Insert or replace a record.
    fn put(&self, collection: Collection, record: &Record) -> StoreResult<()>;

    /// Insert or replace several records. Backends with transactions
    /// apply them atomically.
    fn put_all(&self, collection: Collection, records: &[Record]) -> StoreResult<()> {
        for record in records {
            self.put(collection, record)?;
        }
        Ok(())
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Record>>;

    /// All records, newest first.
    fn get_all(&self, collection: Collection) -> StoreResult<Vec<Record>>;

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<()>;

    fn clear(&self, collection: Collection) -> StoreResult<()>;
}

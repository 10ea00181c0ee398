//! Flat key/value fallback backend.
//!
//! Each collection lives under one fixed string key as JSON text: the
//! route list and settings as arrays of records, the backup slot as a
//! single record.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{sort_newest_first, BackendKind, Collection, Record, StorageBackend};
use crate::error::{StoreError, StoreResult};

pub const ROUTES_KEY: &str = "trailkeep.routes";
pub const BACKUP_SLOT_KEY: &str = "trailkeep.route_backup";
pub const SETTINGS_KEY: &str = "trailkeep.settings";
/// Route list retained after migrating into the primary backend.
pub const PREMIGRATION_ROUTES_KEY: &str = "trailkeep.routes.premigration";

/// String-keyed text store.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove_item(&self, key: &str) -> StoreResult<()>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// One file per key in a directory, with an optional total size quota.
#[derive(Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileKeyValueStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, quota_bytes: Option<u64>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota_bytes })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Bytes used by every stored key except `exclude`.
    fn used_bytes(&self, exclude: &Path) -> StoreResult<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == exclude || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key);

        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes(&path)?;
            if used + value.len() as u64 > quota {
                return Err(StoreError::QuotaExceeded {
                    backend: BackendKind::KeyValue,
                });
            }
        }

        // Write-then-rename so a crash never leaves a truncated value
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-process store for tests.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            items: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if (used + value.len()) as u64 > quota {
                return Err(StoreError::QuotaExceeded {
                    backend: BackendKind::KeyValue,
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

// ============================================================================
// Record backend over a key/value store
// ============================================================================

/// Fallback backend: collections serialized as JSON under fixed keys.
pub struct KeyValueBackend {
    store: Box<dyn KeyValueStore>,
}

impl KeyValueBackend {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Backend over an in-memory store (for testing).
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryKeyValueStore::new()))
    }

    /// Direct access to the underlying text store.
    pub fn raw(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn list_key(collection: Collection) -> &'static str {
        match collection {
            Collection::Routes => ROUTES_KEY,
            Collection::Backups => BACKUP_SLOT_KEY,
            Collection::Settings => SETTINGS_KEY,
        }
    }

    fn read_list(&self, storage_key: &str) -> StoreResult<Vec<Record>> {
        match self.store.get_item(storage_key)? {
            None => Ok(Vec::new()),
            Some(text) => serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
                key: storage_key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write_list(&self, storage_key: &str, records: &[Record]) -> StoreResult<()> {
        if records.is_empty() {
            return self.store.remove_item(storage_key);
        }
        let text = serde_json::to_string(records)?;
        self.store.set_item(storage_key, &text)
    }

    fn read_slot(&self) -> StoreResult<Option<Record>> {
        match self.store.get_item(BACKUP_SLOT_KEY)? {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: BACKUP_SLOT_KEY.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Copy the current route list under the retained pre-migration key.
    /// Does nothing when there is no route list.
    pub fn retain_premigration_copy(&self) -> StoreResult<bool> {
        match self.store.get_item(ROUTES_KEY)? {
            Some(text) => {
                self.store.set_item(PREMIGRATION_ROUTES_KEY, &text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Routes retained by the last migration.
    pub fn premigration_routes(&self) -> StoreResult<Vec<Record>> {
        self.read_list(PREMIGRATION_ROUTES_KEY)
    }

    /// Drop the retained pre-migration route list. Returns whether one
    /// was present.
    pub fn release_premigration_copy(&self) -> StoreResult<bool> {
        if self.store.get_item(PREMIGRATION_ROUTES_KEY)?.is_none() {
            return Ok(false);
        }
        self.store.remove_item(PREMIGRATION_ROUTES_KEY)?;
        Ok(true)
    }
}

impl StorageBackend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn put(&self, collection: Collection, record: &Record) -> StoreResult<()> {
        if collection == Collection::Backups {
            let text = serde_json::to_string(record)?;
            return self.store.set_item(BACKUP_SLOT_KEY, &text);
        }

        let key = Self::list_key(collection);
        let mut records = self.read_list(key)?;
        match records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.write_list(key, &records)
    }

    fn put_all(&self, collection: Collection, records: &[Record]) -> StoreResult<()> {
        if collection == Collection::Backups {
            return match records.last() {
                Some(last) => self.put(collection, last),
                None => Ok(()),
            };
        }

        let key = Self::list_key(collection);
        let mut existing = self.read_list(key)?;
        for record in records {
            match existing.iter_mut().find(|r| r.key == record.key) {
                Some(slot) => *slot = record.clone(),
                None => existing.push(record.clone()),
            }
        }
        self.write_list(key, &existing)
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Record>> {
        if collection == Collection::Backups {
            return Ok(self.read_slot()?.filter(|r| r.key == key));
        }
        Ok(self
            .read_list(Self::list_key(collection))?
            .into_iter()
            .find(|r| r.key == key))
    }

    fn get_all(&self, collection: Collection) -> StoreResult<Vec<Record>> {
        let mut records = if collection == Collection::Backups {
            self.read_slot()?.into_iter().collect()
        } else {
            self.read_list(Self::list_key(collection))?
        };
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        if collection == Collection::Backups {
            // An unreadable slot is deleted too
            let matches = match self.read_slot() {
                Ok(slot) => slot.map_or(false, |r| r.key == key),
                Err(_) => true,
            };
            return if matches {
                self.store.remove_item(BACKUP_SLOT_KEY)
            } else {
                Ok(())
            };
        }

        let storage_key = Self::list_key(collection);
        let mut records = self.read_list(storage_key)?;
        let before = records.len();
        records.retain(|r| r.key != key);
        if records.len() != before {
            self.write_list(storage_key, &records)?;
        }
        Ok(())
    }

    fn clear(&self, collection: Collection) -> StoreResult<()> {
        self.store.remove_item(Self::list_key(collection))
    }
}

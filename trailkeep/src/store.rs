//! # Persistence Store
//!
//! Dual-backend storage for finalized routes, the single-slot snapshot
//! and settings.
//!
//! ## Backend selection
//!
//! At startup the SQLite primary is opened. On success it is used for the
//! rest of the session, after a one-time migration of any fallback data.
//! If it cannot be opened (or migrated), every operation goes to the
//! key/value fallback instead.
//!
//! ## Write failures
//!
//! A failed write to the primary (typically `SQLITE_FULL`) is retried once
//! against the fallback before the error reaches the caller. Reads merge
//! both backends so spilled records stay visible.
//!
//! Every operation runs its backend call on a blocking thread and is
//! exposed as an `async fn`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use trailcore::{FinalizedRoute, Snapshot};

use crate::config::TrackerConfig;
use crate::error::{StoreError, StoreResult};
use crate::migrations::{migrate_fallback_into_primary, MigrationOutcome};
use crate::storage::{
    sort_newest_first, BackendKind, Collection, FileKeyValueStore, KeyValueBackend, Record,
    SqliteBackend, StorageBackend, BACKUP_KEY,
};

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
}

/// Handle to the persistence backends. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceStore {
    primary: Option<Arc<dyn StorageBackend>>,
    fallback: Arc<KeyValueBackend>,
    /// A backup write went to the fallback while the primary is active
    spilled_backup: Arc<AtomicBool>,
}

impl PersistenceStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open both backends from configuration.
    ///
    /// Fails only if the fallback itself cannot be opened.
    pub async fn open(config: &TrackerConfig, now_ms: i64) -> StoreResult<Self> {
        let fallback_dir = config.fallback_dir.clone();
        let quota = config.fallback_quota_bytes;
        let fallback = blocking(move || FileKeyValueStore::open(fallback_dir, Some(quota))).await?;

        let db_path = config.database_path.to_string_lossy().into_owned();
        let max_pages = config.primary_max_page_count;
        let primary = match blocking(move || SqliteBackend::open_with_limit(&db_path, max_pages)).await
        {
            Ok(db) => Some(Arc::new(db) as Arc<dyn StorageBackend>),
            Err(e) => {
                warn!(
                    "[PersistenceStore] Primary backend unavailable ({}), using fallback for this session",
                    e
                );
                None
            }
        };

        Ok(Self::with_backends(primary, KeyValueBackend::new(Box::new(fallback)), now_ms).await)
    }

    /// Assemble a store from backends, running the migration when a
    /// primary is present.
    pub async fn with_backends(
        primary: Option<Arc<dyn StorageBackend>>,
        fallback: KeyValueBackend,
        now_ms: i64,
    ) -> Self {
        let fallback = Arc::new(fallback);

        let primary = match primary {
            Some(primary) => {
                let (p, f) = (primary.clone(), fallback.clone());
                match blocking(move || migrate_fallback_into_primary(p.as_ref(), &f, now_ms)).await
                {
                    Ok(outcome) => {
                        if outcome != MigrationOutcome::AlreadyComplete {
                            info!("[PersistenceStore] Migration: {:?}", outcome);
                        }
                        Some(primary)
                    }
                    Err(e) => {
                        warn!(
                            "[PersistenceStore] Migration failed ({}), using fallback for this session",
                            e
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let store = Self {
            primary,
            fallback,
            spilled_backup: Arc::new(AtomicBool::new(false)),
        };
        info!("[PersistenceStore] Active backend: {}", store.active_backend());
        store
    }

    /// Primary-only store over in-memory SQLite and an in-memory fallback
    /// (for testing). No migration is run.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            primary: Some(Arc::new(SqliteBackend::in_memory()?)),
            fallback: Arc::new(KeyValueBackend::in_memory()),
            spilled_backup: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn active_backend(&self) -> BackendKind {
        match &self.primary {
            Some(primary) => primary.kind(),
            None => BackendKind::KeyValue,
        }
    }

    pub fn fallback(&self) -> &KeyValueBackend {
        &self.fallback
    }

    // ========================================================================
    // Generic operations
    // ========================================================================

    /// Write to the active backend; a primary failure is retried on the
    /// fallback. Returns the backend that took the write.
    async fn put(&self, collection: Collection, record: Record) -> StoreResult<BackendKind> {
        if let Some(primary) = &self.primary {
            let (p, r) = (primary.clone(), record.clone());
            match blocking(move || p.put(collection, &r)).await {
                Ok(()) => return Ok(primary.kind()),
                Err(e) if e.is_quota() => warn!(
                    "[PersistenceStore] Primary quota exceeded writing {} '{}', retrying on fallback",
                    collection.name(),
                    record.key
                ),
                Err(e) => warn!(
                    "[PersistenceStore] Primary write of {} '{}' failed ({}), retrying on fallback",
                    collection.name(),
                    record.key,
                    e
                ),
            }
        }

        let f = self.fallback.clone();
        blocking(move || f.put(collection, &record)).await?;
        Ok(BackendKind::KeyValue)
    }

    /// Read one record: primary first, then fallback.
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Record>> {
        if let Some(primary) = &self.primary {
            let (p, k) = (primary.clone(), key.to_string());
            if let Some(record) = blocking(move || p.get(collection, &k)).await? {
                return Ok(Some(record));
            }
            let (f, k) = (self.fallback.clone(), key.to_string());
            return Ok(blocking(move || f.get(collection, &k))
                .await
                .unwrap_or_else(|e| {
                    warn!("[PersistenceStore] Ignoring unreadable fallback {}: {}", collection.name(), e);
                    None
                }));
        }

        let (f, k) = (self.fallback.clone(), key.to_string());
        blocking(move || f.get(collection, &k)).await
    }

    /// All records of a collection across both backends, newest first.
    /// Primary records win on key collisions.
    async fn get_all(&self, collection: Collection) -> StoreResult<Vec<Record>> {
        let f = self.fallback.clone();
        let Some(primary) = &self.primary else {
            return blocking(move || f.get_all(collection)).await;
        };

        let p = primary.clone();
        let mut records = blocking(move || p.get_all(collection)).await?;
        let spilled = blocking(move || f.get_all(collection)).await.unwrap_or_else(|e| {
            warn!("[PersistenceStore] Ignoring unreadable fallback {}: {}", collection.name(), e);
            Vec::new()
        });

        if !spilled.is_empty() {
            let seen: HashSet<String> = records.iter().map(|r| r.key.clone()).collect();
            records.extend(spilled.into_iter().filter(|r| !seen.contains(&r.key)));
            sort_newest_first(&mut records);
        }
        Ok(records)
    }

    /// Delete from both backends. Both are attempted; the first error wins.
    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let primary_result = match &self.primary {
            Some(primary) => {
                let (p, k) = (primary.clone(), key.to_string());
                blocking(move || p.delete(collection, &k)).await
            }
            None => Ok(()),
        };
        let (f, k) = (self.fallback.clone(), key.to_string());
        let fallback_result = blocking(move || f.delete(collection, &k)).await;
        primary_result.and(fallback_result)
    }

    // ========================================================================
    // Finalized routes
    // ========================================================================

    pub async fn put_route(&self, route: &FinalizedRoute) -> StoreResult<BackendKind> {
        let record = Record::encode(route.id.clone(), route.created_at, route)?;
        let backend = self.put(Collection::Routes, record).await?;
        info!(
            "[PersistenceStore] Saved route {} ({} entries) to {}",
            route.id,
            route.entries.len(),
            backend
        );
        Ok(backend)
    }

    /// Finalized routes, newest first. Undecodable records are skipped.
    pub async fn get_routes(&self) -> StoreResult<Vec<FinalizedRoute>> {
        let records = self.get_all(Collection::Routes).await?;
        Ok(records
            .iter()
            .filter_map(|r| match r.decode::<FinalizedRoute>() {
                Ok(route) => Some(route),
                Err(e) => {
                    warn!("[PersistenceStore] Skipping route '{}': {}", r.key, e);
                    None
                }
            })
            .collect())
    }

    pub async fn get_route(&self, id: &str) -> StoreResult<Option<FinalizedRoute>> {
        match self.get(Collection::Routes, id).await? {
            Some(record) => record.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Delete a route from both backends. Any retained pre-migration copy
    /// is dropped with it, so a later migration check cannot restore the
    /// route.
    pub async fn delete_route(&self, id: &str) -> StoreResult<()> {
        self.delete(Collection::Routes, id).await?;
        let f = self.fallback.clone();
        if blocking(move || f.release_premigration_copy()).await? {
            info!("[PersistenceStore] Dropped retained pre-migration routes");
        }
        Ok(())
    }

    // ========================================================================
    // Backup slot
    // ========================================================================

    /// Overwrite the single backup slot.
    pub async fn write_backup(&self, snapshot: &Snapshot) -> StoreResult<BackendKind> {
        let record = Record::encode(BACKUP_KEY, snapshot.captured_at, snapshot)?;
        let backend = self.put(Collection::Backups, record).await?;

        if self.primary.is_some() {
            if backend == BackendKind::KeyValue {
                self.spilled_backup.store(true, Ordering::SeqCst);
            } else if self.spilled_backup.swap(false, Ordering::SeqCst) {
                // Older spilled copy is now stale
                let f = self.fallback.clone();
                if let Err(e) = blocking(move || f.delete(Collection::Backups, BACKUP_KEY)).await {
                    warn!("[PersistenceStore] Failed to drop stale spilled backup: {}", e);
                }
            }
        }

        debug!(
            "[PersistenceStore] Backup written to {} ({} entries)",
            backend,
            snapshot.entries.len()
        );
        Ok(backend)
    }

    /// Raw backup value, unvalidated. When both backends hold a copy the
    /// most recently captured one is returned.
    pub async fn read_backup(&self) -> StoreResult<Option<Value>> {
        let f = self.fallback.clone();
        let Some(primary) = &self.primary else {
            let record = blocking(move || f.get(Collection::Backups, BACKUP_KEY)).await?;
            return Ok(record.map(|r| r.value));
        };

        let p = primary.clone();
        let primary_copy = blocking(move || p.get(Collection::Backups, BACKUP_KEY)).await?;
        let spilled_copy = blocking(move || f.get(Collection::Backups, BACKUP_KEY))
            .await
            .unwrap_or_else(|e| {
                warn!("[PersistenceStore] Ignoring unreadable spilled backup: {}", e);
                None
            });

        let newest = match (primary_copy, spilled_copy) {
            (Some(a), Some(b)) => Some(if b.sort_key > a.sort_key { b } else { a }),
            (a, b) => a.or(b),
        };
        Ok(newest.map(|r| r.value))
    }

    /// Clear the backup slot on every backend.
    pub async fn delete_backup(&self) -> StoreResult<()> {
        self.spilled_backup.store(false, Ordering::SeqCst);
        self.delete(Collection::Backups, BACKUP_KEY).await
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.get(Collection::Settings, key).await?.map(|r| r.value))
    }

    pub async fn put_setting(&self, key: &str, value: Value) -> StoreResult<BackendKind> {
        self.put(Collection::Settings, Record::new(key, 0, value)).await
    }

    pub async fn delete_setting(&self, key: &str) -> StoreResult<()> {
        self.delete(Collection::Settings, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trailcore::{GpsPoint, RouteEntry, SCHEMA_VERSION};

    fn route(id: &str, created_at: i64) -> FinalizedRoute {
        FinalizedRoute {
            schema_version: SCHEMA_VERSION,
            id: id.to_string(),
            name: format!("Route {}", id),
            created_at,
            total_distance_km: 1.0,
            elapsed_ms: 60_000,
            entries: vec![RouteEntry::position(GpsPoint::new(46.0, 8.0), created_at, 5.0)],
        }
    }

    fn snapshot(captured_at: i64) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            entries: vec![RouteEntry::note(GpsPoint::new(46.0, 8.0), "x", captured_at)],
            path: Vec::new(),
            total_distance_km: 0.0,
            elapsed_ms: 1_000,
            is_tracking: true,
            is_paused: false,
            captured_at,
            start_time: None,
            device_info: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_routes_newest_first() {
        let store = PersistenceStore::in_memory().unwrap();
        store.put_route(&route("route_1", 100)).await.unwrap();
        store.put_route(&route("route_3", 300)).await.unwrap();
        store.put_route(&route("route_2", 200)).await.unwrap();

        let ids: Vec<String> = store
            .get_routes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["route_3", "route_2", "route_1"]);

        assert_eq!(store.get_route("route_2").await.unwrap().unwrap().created_at, 200);
        store.delete_route("route_2").await.unwrap();
        assert!(store.get_route("route_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backup_slot_overwrites() {
        let store = PersistenceStore::in_memory().unwrap();
        store.write_backup(&snapshot(1)).await.unwrap();
        store.write_backup(&snapshot(2)).await.unwrap();

        let raw = store.read_backup().await.unwrap().unwrap();
        assert_eq!(raw["capturedAt"], 2);

        store.delete_backup().await.unwrap();
        assert!(store.read_backup().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fallback_only_store() {
        let store = PersistenceStore::with_backends(None, KeyValueBackend::in_memory(), 0).await;
        assert_eq!(store.active_backend(), BackendKind::KeyValue);

        assert_eq!(
            store.put_route(&route("route_1", 1)).await.unwrap(),
            BackendKind::KeyValue
        );
        assert_eq!(store.get_routes().await.unwrap().len(), 1);

        store.write_backup(&snapshot(5)).await.unwrap();
        assert!(store.read_backup().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spilled_backup_superseded_by_newer_primary_write() {
        let store = PersistenceStore::in_memory().unwrap();
        // Simulate an earlier spill
        store
            .fallback()
            .put(
                Collection::Backups,
                &Record::encode(BACKUP_KEY, 50, &snapshot(50)).unwrap(),
            )
            .unwrap();
        store.spilled_backup.store(true, Ordering::SeqCst);

        store.write_backup(&snapshot(40)).await.unwrap();
        // Primary write drops the spilled copy
        assert!(store
            .fallback()
            .get(Collection::Backups, BACKUP_KEY)
            .unwrap()
            .is_none());
        assert_eq!(store.read_backup().await.unwrap().unwrap()["capturedAt"], 40);
    }

    #[tokio::test]
    async fn test_settings() {
        let store = PersistenceStore::in_memory().unwrap();
        store
            .put_setting("accessibility_survey", json!({ "wheelchair": true }))
            .await
            .unwrap();
        assert!(store.get_setting("accessibility_survey").await.unwrap().is_some());
        store.delete_setting("accessibility_survey").await.unwrap();
        assert!(store.get_setting("accessibility_survey").await.unwrap().is_none());
    }
}

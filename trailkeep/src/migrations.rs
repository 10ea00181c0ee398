//! One-time migration of fallback data into the primary backend.

use std::collections::HashSet;

use log::{info, warn};
use serde_json::json;

use crate::error::StoreResult;
use crate::storage::{Collection, KeyValueBackend, Record, StorageBackend, BACKUP_KEY};

/// Settings key marking the migration as done.
pub const MIGRATION_MARKER_KEY: &str = "fallback_migration_complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fallback data copied in and cleared
    Migrated { routes: usize, backup: bool },
    /// Marker present; nothing to do
    AlreadyComplete,
    /// Marker present but the primary was missing routes from the
    /// retained pre-migration copy; those were copied back in
    Recovered { routes: usize },
}

/// Copy any fallback route list and backup into the primary, then clear
/// the fallback copies and set the marker.
///
/// The fallback route list is retained until every migrated route has
/// been read back from the primary. A later run that still finds the
/// retained list restores whatever the primary lacks, then drops it.
/// Once dropped, re-running is a no-op, so routes the user deletes
/// afterwards stay deleted.
pub fn migrate_fallback_into_primary(
    primary: &dyn StorageBackend,
    fallback: &KeyValueBackend,
    now_ms: i64,
) -> StoreResult<MigrationOutcome> {
    if primary.get(Collection::Settings, MIGRATION_MARKER_KEY)?.is_some() {
        return recover_if_empty(primary, fallback);
    }

    info!("[Migration] Running fallback -> primary migration");

    let routes = fallback.get_all(Collection::Routes).unwrap_or_else(|e| {
        warn!("[Migration] Fallback route list unreadable, skipping: {}", e);
        Vec::new()
    });
    let backup = fallback
        .get(Collection::Backups, BACKUP_KEY)
        .unwrap_or_else(|e| {
            warn!("[Migration] Fallback backup unreadable, skipping: {}", e);
            None
        });

    if !routes.is_empty() {
        primary.put_all(Collection::Routes, &routes)?;
    }
    if let Some(record) = &backup {
        primary.put(Collection::Backups, record)?;
    }

    if fallback.retain_premigration_copy()? {
        info!("[Migration] Retained pre-migration copy of {} routes", routes.len());
    }
    fallback.clear(Collection::Routes)?;
    fallback.clear(Collection::Backups)?;

    primary.put(
        Collection::Settings,
        &Record::new(
            MIGRATION_MARKER_KEY,
            now_ms,
            json!({ "completedAt": now_ms, "routes": routes.len() }),
        ),
    )?;

    if missing_from_primary(primary, &routes)?.is_empty() {
        fallback.release_premigration_copy()?;
    } else {
        warn!("[Migration] Primary is missing migrated routes; keeping retained copy");
    }

    info!(
        "[Migration] Completed: {} routes, backup={}",
        routes.len(),
        backup.is_some()
    );
    Ok(MigrationOutcome::Migrated {
        routes: routes.len(),
        backup: backup.is_some(),
    })
}

fn recover_if_empty(
    primary: &dyn StorageBackend,
    fallback: &KeyValueBackend,
) -> StoreResult<MigrationOutcome> {
    let retained = fallback.premigration_routes().unwrap_or_else(|e| {
        warn!("[Migration] Retained copy unreadable: {}", e);
        Vec::new()
    });
    if retained.is_empty() {
        info!("[Migration] Already complete, skipping");
        return Ok(MigrationOutcome::AlreadyComplete);
    }

    let missing = missing_from_primary(primary, &retained)?;
    if !missing.is_empty() {
        warn!(
            "[Migration] Primary lacks {} migrated routes; restoring from retained copy",
            missing.len()
        );
        primary.put_all(Collection::Routes, &missing)?;
    }
    fallback.release_premigration_copy()?;

    if missing.is_empty() {
        Ok(MigrationOutcome::AlreadyComplete)
    } else {
        Ok(MigrationOutcome::Recovered {
            routes: missing.len(),
        })
    }
}

/// Records whose keys the primary route collection does not hold.
fn missing_from_primary(
    primary: &dyn StorageBackend,
    records: &[Record],
) -> StoreResult<Vec<Record>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let stored: HashSet<String> = primary
        .get_all(Collection::Routes)?
        .into_iter()
        .map(|r| r.key)
        .collect();
    Ok(records
        .iter()
        .filter(|r| !stored.contains(&r.key))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::BACKUP_SLOT_KEY;
    use crate::storage::SqliteBackend;

    fn seeded_fallback() -> KeyValueBackend {
        let fallback = KeyValueBackend::in_memory();
        fallback
            .put(Collection::Routes, &Record::new("route_1", 1, json!({ "name": "A" })))
            .unwrap();
        fallback
            .put(Collection::Routes, &Record::new("route_2", 2, json!({ "name": "B" })))
            .unwrap();
        fallback
            .put(Collection::Backups, &Record::new(BACKUP_KEY, 3, json!({ "entries": [] })))
            .unwrap();
        fallback
    }

    #[test]
    fn test_first_run_migrates_and_clears() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = seeded_fallback();

        let outcome = migrate_fallback_into_primary(&primary, &fallback, 10).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                routes: 2,
                backup: true
            }
        );

        assert_eq!(primary.get_all(Collection::Routes).unwrap().len(), 2);
        assert!(primary.get(Collection::Backups, BACKUP_KEY).unwrap().is_some());
        assert!(fallback.get_all(Collection::Routes).unwrap().is_empty());
        assert_eq!(fallback.raw().get_item(BACKUP_SLOT_KEY).unwrap(), None);
        // Every route read back from the primary, so nothing is retained
        assert!(fallback.premigration_routes().unwrap().is_empty());
    }

    #[test]
    fn test_rerun_is_noop() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = seeded_fallback();
        migrate_fallback_into_primary(&primary, &fallback, 10).unwrap();

        // New fallback data after completion is not pulled in again
        fallback
            .put(Collection::Routes, &Record::new("route_9", 9, json!({})))
            .unwrap();
        let outcome = migrate_fallback_into_primary(&primary, &fallback, 20).unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyComplete);
        assert_eq!(primary.get_all(Collection::Routes).unwrap().len(), 2);
    }

    /// A retained copy left behind by a migration whose writes did not all
    /// land.
    fn unverified_migration(primary: &SqliteBackend) -> KeyValueBackend {
        let fallback = seeded_fallback();
        fallback.retain_premigration_copy().unwrap();
        fallback.clear(Collection::Routes).unwrap();
        primary
            .put(
                Collection::Settings,
                &Record::new(MIGRATION_MARKER_KEY, 10, json!({ "routes": 2 })),
            )
            .unwrap();
        fallback
    }

    #[test]
    fn test_unverified_migration_restores_missing_routes() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = unverified_migration(&primary);
        primary
            .put(Collection::Routes, &Record::new("route_1", 1, json!({ "name": "A" })))
            .unwrap();

        let outcome = migrate_fallback_into_primary(&primary, &fallback, 20).unwrap();
        assert_eq!(outcome, MigrationOutcome::Recovered { routes: 1 });
        assert_eq!(primary.get_all(Collection::Routes).unwrap().len(), 2);
        assert!(fallback.premigration_routes().unwrap().is_empty());

        // The retained copy is gone, so deletions afterwards stick
        primary.clear(Collection::Routes).unwrap();
        assert_eq!(
            migrate_fallback_into_primary(&primary, &fallback, 30).unwrap(),
            MigrationOutcome::AlreadyComplete
        );
        assert!(primary.get_all(Collection::Routes).unwrap().is_empty());
    }

    #[test]
    fn test_verified_migration_does_not_resurrect_deleted_routes() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = seeded_fallback();
        migrate_fallback_into_primary(&primary, &fallback, 10).unwrap();

        primary.clear(Collection::Routes).unwrap();
        let outcome = migrate_fallback_into_primary(&primary, &fallback, 20).unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyComplete);
        assert!(primary.get_all(Collection::Routes).unwrap().is_empty());
    }

    #[test]
    fn test_nothing_to_migrate_sets_marker() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = KeyValueBackend::in_memory();

        let outcome = migrate_fallback_into_primary(&primary, &fallback, 10).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                routes: 0,
                backup: false
            }
        );
        assert!(primary
            .get(Collection::Settings, MIGRATION_MARKER_KEY)
            .unwrap()
            .is_some());
        assert_eq!(
            migrate_fallback_into_primary(&primary, &fallback, 20).unwrap(),
            MigrationOutcome::AlreadyComplete
        );
    }

    #[test]
    fn test_corrupt_fallback_is_skipped() {
        let primary = SqliteBackend::in_memory().unwrap();
        let fallback = KeyValueBackend::in_memory();
        fallback
            .raw()
            .set_item(crate::storage::kv::ROUTES_KEY, "[{broken")
            .unwrap();

        let outcome = migrate_fallback_into_primary(&primary, &fallback, 10).unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                routes: 0,
                backup: false
            }
        );
    }
}

//! Startup validation of the backup slot.
//!
//! Every failure mode degrades to "no backup": unreadable, invalid,
//! expired or empty snapshots are deleted and never surfaced as errors.

use log::{info, warn};
use trailcore::{validate_snapshot, Snapshot, SnapshotCheck};

use crate::store::PersistenceStore;

/// Read and validate the backup slot.
///
/// Returns the snapshot only if it is restorable; otherwise the slot is
/// cleared and `None` is returned.
pub async fn check_for_unsaved_route(
    store: &PersistenceStore,
    now_wall_ms: i64,
    max_age_ms: i64,
) -> Option<Snapshot> {
    let raw = match store.read_backup().await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("[Recovery] Backup unreadable, discarding: {}", e);
            discard_backup(store).await;
            return None;
        }
    };

    match validate_snapshot(&raw, now_wall_ms, max_age_ms) {
        SnapshotCheck::Restorable(snapshot) => {
            info!(
                "[Recovery] Found unsaved route: {} entries, {:.3} km, {} ms",
                snapshot.entries.len(),
                snapshot.total_distance_km,
                snapshot.elapsed_ms
            );
            Some(snapshot)
        }
        SnapshotCheck::Invalid(reason) => {
            warn!("[Recovery] Invalid backup, discarding: {}", reason);
            discard_backup(store).await;
            None
        }
        SnapshotCheck::Expired { age_ms } => {
            info!("[Recovery] Backup expired ({} ms old), discarding", age_ms);
            discard_backup(store).await;
            None
        }
        SnapshotCheck::Empty => {
            info!("[Recovery] Backup has no entries, discarding");
            discard_backup(store).await;
            None
        }
    }
}

/// Delete the backup slot, logging instead of failing.
pub async fn discard_backup(store: &PersistenceStore) {
    if let Err(e) = store.delete_backup().await {
        warn!("[Recovery] Failed to delete backup: {}", e);
    }
}

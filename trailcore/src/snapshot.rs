//! Durable schemas: crash-recovery snapshots and finalized routes.
//!
//! Both records are versioned. Snapshots read back from storage are
//! validated at the deserialization boundary by [`validate_snapshot`],
//! which yields a typed [`SnapshotCheck`] rather than a partially trusted
//! blob.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::RouteEntry;
use crate::GpsPoint;

/// Current schema version for snapshots and finalized routes.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Point-in-time copy of the route buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub entries: Vec<RouteEntry>,
    #[serde(default)]
    pub path: Vec<GpsPoint>,
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub is_tracking: bool,
    #[serde(default)]
    pub is_paused: bool,
    /// Wall-clock capture time, Unix milliseconds
    pub captured_at: i64,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub device_info: String,
}

impl Snapshot {
    /// Path points derived from the position entries, in order.
    pub fn position_path(&self) -> Vec<GpsPoint> {
        self.entries
            .iter()
            .filter_map(|e| e.as_position().map(|p| p.coords))
            .collect()
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary::of(
            &self.entries,
            self.total_distance_km,
            self.elapsed_ms,
            Some(self.captured_at),
        )
    }
}

/// Result of validating a stored snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotCheck {
    /// Well-formed, recent and non-empty
    Restorable(Snapshot),
    /// Structurally invalid; the reason is for logging
    Invalid(String),
    /// Older than the maximum backup age
    Expired { age_ms: i64 },
    /// Well-formed but holds no entries
    Empty,
}

/// Validate a raw snapshot value read from storage.
///
/// Checks run in order: object shape, array-valued `entries`, schema
/// version, typed decode, numeric ranges, age against `max_age_ms`, then
/// emptiness.
pub fn validate_snapshot(raw: &Value, now_wall_ms: i64, max_age_ms: i64) -> SnapshotCheck {
    let Some(obj) = raw.as_object() else {
        return SnapshotCheck::Invalid("snapshot is not an object".to_string());
    };

    if !obj.get("entries").is_some_and(Value::is_array) {
        return SnapshotCheck::Invalid("entries missing or not an array".to_string());
    }

    if let Some(version) = obj.get("schemaVersion") {
        match version.as_u64() {
            Some(v) if v <= SCHEMA_VERSION as u64 => {}
            _ => {
                return SnapshotCheck::Invalid(format!("unsupported schema version {}", version))
            }
        }
    }

    let snapshot: Snapshot = match serde_json::from_value(raw.clone()) {
        Ok(s) => s,
        Err(e) => return SnapshotCheck::Invalid(e.to_string()),
    };

    if snapshot.captured_at < 0 {
        return SnapshotCheck::Invalid(format!(
            "capturedAt {} out of range",
            snapshot.captured_at
        ));
    }
    if i64::try_from(snapshot.elapsed_ms).is_err() {
        return SnapshotCheck::Invalid(format!(
            "elapsedMs {} out of range",
            snapshot.elapsed_ms
        ));
    }
    if !snapshot.total_distance_km.is_finite() || snapshot.total_distance_km < 0.0 {
        return SnapshotCheck::Invalid(format!(
            "totalDistanceKm {} out of range",
            snapshot.total_distance_km
        ));
    }

    let age_ms = now_wall_ms.saturating_sub(snapshot.captured_at);
    if age_ms > max_age_ms {
        return SnapshotCheck::Expired { age_ms };
    }

    if snapshot.entries.is_empty() {
        return SnapshotCheck::Empty;
    }

    SnapshotCheck::Restorable(snapshot)
}

/// Immutable, named, saved route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedRoute {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub name: String,
    /// Unix milliseconds
    pub created_at: i64,
    pub total_distance_km: f64,
    pub elapsed_ms: u64,
    pub entries: Vec<RouteEntry>,
}

impl FinalizedRoute {
    pub fn summary(&self) -> RouteSummary {
        RouteSummary::of(&self.entries, self.total_distance_km, self.elapsed_ms, None)
    }
}

/// Counts and totals shown to the user before saving or restoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub entry_count: usize,
    pub position_count: usize,
    pub photo_count: usize,
    pub note_count: usize,
    pub total_distance_km: f64,
    pub elapsed_ms: u64,
    pub captured_at: Option<i64>,
}

impl RouteSummary {
    pub fn of(
        entries: &[RouteEntry],
        total_distance_km: f64,
        elapsed_ms: u64,
        captured_at: Option<i64>,
    ) -> Self {
        let mut summary = RouteSummary {
            entry_count: entries.len(),
            position_count: 0,
            photo_count: 0,
            note_count: 0,
            total_distance_km,
            elapsed_ms,
            captured_at,
        };
        for entry in entries {
            match entry {
                RouteEntry::Position(_) => summary.position_count += 1,
                RouteEntry::Photo(_) => summary.photo_count += 1,
                RouteEntry::Note(_) => summary.note_count += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn raw_snapshot(captured_at: i64, entries: Value) -> Value {
        json!({
            "schemaVersion": 1,
            "entries": entries,
            "path": [],
            "totalDistanceKm": 1.25,
            "elapsedMs": 600000,
            "isTracking": true,
            "isPaused": false,
            "capturedAt": captured_at,
            "deviceInfo": "test"
        })
    }

    fn one_position() -> Value {
        json!([{
            "type": "position",
            "id": 1,
            "coords": { "latitude": 46.0, "longitude": 8.0 },
            "timestamp": NOW - 1000,
            "accuracy": 5.0
        }])
    }

    #[test]
    fn test_restorable() {
        let raw = raw_snapshot(NOW - 60_000, one_position());
        match validate_snapshot(&raw, NOW, DAY_MS) {
            SnapshotCheck::Restorable(s) => {
                assert_eq!(s.entries.len(), 1);
                assert_eq!(s.elapsed_ms, 600_000);
                assert_eq!(s.position_path(), vec![GpsPoint::new(46.0, 8.0)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_object_and_missing_entries() {
        assert!(matches!(
            validate_snapshot(&json!([1, 2, 3]), NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
        assert!(matches!(
            validate_snapshot(&json!({ "entries": "nope", "capturedAt": NOW }), NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
        assert!(matches!(
            validate_snapshot(&json!({ "capturedAt": NOW }), NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
    }

    #[test]
    fn test_rejects_malformed_entry() {
        let raw = raw_snapshot(NOW, json!([{ "type": "teleport" }]));
        assert!(matches!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
    }

    #[test]
    fn test_rejects_future_schema() {
        let mut raw = raw_snapshot(NOW, one_position());
        raw["schemaVersion"] = json!(SCHEMA_VERSION + 1);
        assert!(matches!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
    }

    #[test]
    fn test_rejects_out_of_range_numbers() {
        let raw = raw_snapshot(i64::MIN, one_position());
        assert!(matches!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));

        let mut raw = raw_snapshot(NOW, one_position());
        raw["elapsedMs"] = json!(1u64 << 63);
        assert!(matches!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));

        let mut raw = raw_snapshot(NOW, one_position());
        raw["totalDistanceKm"] = json!(-3.0);
        assert!(matches!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Invalid(_)
        ));
    }

    #[test]
    fn test_age_at_extreme_wall_clock() {
        let raw = raw_snapshot(0, one_position());
        assert!(matches!(
            validate_snapshot(&raw, i64::MAX, DAY_MS),
            SnapshotCheck::Expired { age_ms: i64::MAX }
        ));
    }

    #[test]
    fn test_expired() {
        let raw = raw_snapshot(NOW - DAY_MS - 1, one_position());
        assert_eq!(
            validate_snapshot(&raw, NOW, DAY_MS),
            SnapshotCheck::Expired { age_ms: DAY_MS + 1 }
        );
    }

    #[test]
    fn test_empty() {
        let raw = raw_snapshot(NOW, json!([]));
        assert_eq!(validate_snapshot(&raw, NOW, DAY_MS), SnapshotCheck::Empty);
    }

    #[test]
    fn test_summary_counts() {
        let entries = vec![
            RouteEntry::position(GpsPoint::new(0.0, 0.0), 1, 5.0),
            RouteEntry::photo(GpsPoint::new(0.0, 0.0), vec![1, 2], 2),
            RouteEntry::note(GpsPoint::new(0.0, 0.0), "hi", 3),
            RouteEntry::position(GpsPoint::new(0.0, 0.1), 4, 5.0),
        ];
        let summary = RouteSummary::of(&entries, 2.0, 1000, None);
        assert_eq!(summary.entry_count, 4);
        assert_eq!(summary.position_count, 2);
        assert_eq!(summary.photo_count, 1);
        assert_eq!(summary.note_count, 1);
    }
}

//! # Trailcore
//!
//! Route capture core for live GPS recording.
//!
//! This library provides:
//! - A noise-gating sample filter (accuracy and minimum-movement thresholds)
//! - Haversine distance accumulation over accepted samples
//! - Throttled elevation enrichment decisions
//! - A pause/resume-aware stopwatch driven by a monotonic clock
//! - The route recorder state machine (Idle / Tracking / Paused)
//! - Versioned snapshot and finalized-route schemas with validation
//!
//! Nothing in this crate performs I/O. Persistence, positioning and the
//! external elevation lookup live in the app layer, which feeds samples in
//! and serializes snapshots out.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trailcore::{ManualClock, RawSample, RecorderConfig, RouteRecorder};
//!
//! let clock = Arc::new(ManualClock::new(1_700_000_000_000));
//! let mut recorder = RouteRecorder::new(RecorderConfig::default(), clock.clone());
//! recorder.start().unwrap();
//!
//! recorder.process_sample(RawSample::new(51.5074, -0.1278, 5.0, clock.wall_ms()));
//! clock.advance(1_000);
//! recorder.process_sample(RawSample::new(51.5084, -0.1278, 5.0, clock.wall_ms()));
//!
//! assert!(recorder.total_distance_km() > 0.1);
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, RouteError};

// Great-circle geometry
pub mod geo_utils;
pub use geo_utils::{haversine_km, haversine_m, EARTH_RADIUS_KM};

// Route entries (position samples, photos, notes)
pub mod entry;
pub use entry::{
    Elevation, ElevationSource, EntryId, NoteEntry, PhotoEntry, PhotoPayload, PositionEntry,
    RouteEntry,
};

// Sample filter (accuracy gate + jitter gate)
pub mod filter;
pub use filter::{FilterDecision, RawSample, Rejection, SampleFilter};

// Running distance total
pub mod distance;
pub use distance::DistanceAccumulator;

// Elevation throttling
pub mod elevation;
pub use elevation::{ElevationPlan, ElevationThrottle};

// Clocks and the elapsed-time tracker
pub mod timer;
pub use timer::{Clock, ElapsedTimer, ManualClock};

// Snapshot and finalized-route schemas
pub mod snapshot;
pub use snapshot::{
    validate_snapshot, FinalizedRoute, RouteSummary, Snapshot, SnapshotCheck, SCHEMA_VERSION,
};

// Route buffer state machine
pub mod recorder;
pub use recorder::{
    RecorderConfig, RouteRecorder, SampleOutcome, StartKind, TrackingState, TrackingStatus,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trailcore::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

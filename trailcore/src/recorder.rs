//! # Route Recorder
//!
//! The route buffer and its state machine.
//!
//! ## States
//!
//! - **Idle**: no active capture. The buffer may still hold a restored or
//!   cancelled-save route, in which case the next `start()` resumes it.
//! - **Tracking**: samples are filtered, accumulated and appended.
//! - **Paused**: capture and timer suspended, buffer retained.
//!
//! The recorder is synchronous and owns no I/O. The app layer feeds it
//! samples, performs the elevation lookups it asks for, and persists the
//! snapshots it produces.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceAccumulator;
use crate::elevation::{ElevationPlan, ElevationThrottle};
use crate::entry::{Elevation, EntryId, RouteEntry};
use crate::error::{Result, RouteError};
use crate::filter::{FilterDecision, RawSample, Rejection, SampleFilter};
use crate::snapshot::{FinalizedRoute, RouteSummary, Snapshot, SCHEMA_VERSION};
use crate::timer::{Clock, ElapsedTimer};
use crate::GpsPoint;

/// Thresholds for the capture pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Samples with a larger accuracy radius are dropped (meters)
    pub max_accuracy_m: f64,
    /// Samples closer than this to the last accepted point are dropped (meters)
    pub min_movement_m: f64,
    /// Minimum spacing between external elevation lookups
    pub elevation_interval_ms: u64,
    /// Snapshot whenever the entry count reaches a multiple of this
    pub backup_every_entries: usize,
    /// Snapshot on insertion if the last one is older than this
    pub backup_max_gap_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 100.0,
            min_movement_m: 3.0,
            elevation_interval_ms: 10_000,
            backup_every_entries: 10,
            backup_max_gap_ms: 120_000,
        }
    }
}

/// Recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    Idle,
    Tracking,
    Paused,
}

/// Flag view of the state, as exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStatus {
    pub is_tracking: bool,
    pub is_paused: bool,
}

/// How `start()` began capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// Buffer cleared, timer from zero
    Fresh,
    /// Existing route continued from its elapsed time
    Resumed { elapsed_ms: u64 },
}

/// Result of feeding one raw sample to the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Rejected(Rejection),
    Accepted {
        entry_id: EntryId,
        /// Set when an external elevation lookup should be issued for it
        lookup: Option<GpsPoint>,
        /// Elevation attached at insertion (device or cached)
        elevation: Option<Elevation>,
        /// Leg length added to the total, in km
        leg_km: f64,
        /// A threshold snapshot should be written now
        backup_due: bool,
    },
}

/// The live route buffer plus the capture pipeline around it.
pub struct RouteRecorder {
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    filter: SampleFilter,
    distance: DistanceAccumulator,
    elevation: ElevationThrottle,
    timer: ElapsedTimer,

    entries: Vec<RouteEntry>,
    path: Vec<GpsPoint>,
    state: TrackingState,
    /// Wall-clock session start, Unix milliseconds
    start_time: Option<i64>,
    last_accepted: Option<GpsPoint>,
    /// First sample after a start skips the jitter gate
    skip_jitter_once: bool,
    next_id: u64,
    /// Monotonic time of the last snapshot write
    last_backup_ms: Option<u64>,
}

impl RouteRecorder {
    pub fn new(config: RecorderConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            filter: SampleFilter::new(config.max_accuracy_m, config.min_movement_m),
            elevation: ElevationThrottle::new(config.elevation_interval_ms),
            distance: DistanceAccumulator::new(),
            timer: ElapsedTimer::new(clock.clone()),
            config,
            clock,
            entries: Vec::new(),
            path: Vec::new(),
            state: TrackingState::Idle,
            start_time: None,
            last_accepted: None,
            skip_jitter_once: false,
            next_id: 1,
            last_backup_ms: None,
        }
    }

    // ========================================================================
    // State Machine
    // ========================================================================

    /// Idle → Tracking.
    ///
    /// A buffer holding entries with a positive elapsed time is resumed;
    /// anything else starts a fresh route.
    pub fn start(&mut self) -> Result<StartKind> {
        if self.state != TrackingState::Idle {
            return Err(RouteError::AlreadyTracking);
        }

        let now = self.clock.monotonic_ms();
        let wall = self.clock.wall_ms();
        let elapsed = self.timer.elapsed_ms();

        let kind = if !self.entries.is_empty() && elapsed > 0 {
            self.start_time = Some(wall - elapsed as i64);
            self.timer.start(elapsed);
            self.last_accepted = self.path.last().copied();
            StartKind::Resumed {
                elapsed_ms: elapsed,
            }
        } else {
            self.reset();
            self.start_time = Some(wall);
            self.timer.start(0);
            StartKind::Fresh
        };

        self.state = TrackingState::Tracking;
        self.skip_jitter_once = true;
        self.last_backup_ms = Some(now);

        log::info!("[RouteRecorder] Tracking started ({:?})", kind);
        Ok(kind)
    }

    /// Tracking ↔ Paused. Returns the new state.
    pub fn toggle_pause(&mut self) -> Result<TrackingState> {
        match self.state {
            TrackingState::Tracking => {
                let elapsed = self.timer.pause();
                self.state = TrackingState::Paused;
                log::info!("[RouteRecorder] Paused at {} ms", elapsed);
            }
            TrackingState::Paused => {
                self.timer.resume();
                self.state = TrackingState::Tracking;
                log::info!("[RouteRecorder] Resumed at {} ms", self.timer.elapsed_ms());
            }
            TrackingState::Idle => return Err(RouteError::NotTracking),
        }
        Ok(self.state)
    }

    /// Tracking/Paused → Idle. Returns the final elapsed time.
    ///
    /// The buffer is kept; call [`reset`](Self::reset) once the route has
    /// been saved or discarded.
    pub fn stop(&mut self) -> Result<u64> {
        if self.state == TrackingState::Idle {
            return Err(RouteError::NotTracking);
        }
        let elapsed = self.timer.stop();
        self.state = TrackingState::Idle;
        log::info!(
            "[RouteRecorder] Stopped: {} entries, {:.3} km, {} ms",
            self.entries.len(),
            self.distance.total_km(),
            elapsed
        );
        Ok(elapsed)
    }

    /// Clear the buffer back to empty. Does not change the state.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.path.clear();
        self.distance.reset();
        self.elevation.reset();
        self.timer.reset();
        self.start_time = None;
        self.last_accepted = None;
        self.next_id = 1;
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Run one raw sample through filter, distance and elevation, and
    /// append it on acceptance.
    pub fn process_sample(&mut self, sample: RawSample) -> SampleOutcome {
        if self.state != TrackingState::Tracking {
            return SampleOutcome::Rejected(Rejection::NotTracking);
        }

        let decision = self
            .filter
            .evaluate(&sample, self.last_accepted, self.skip_jitter_once);

        if let FilterDecision::Reject(reason) = decision {
            log::debug!("[RouteRecorder] Sample rejected: {:?}", reason);
            return SampleOutcome::Rejected(reason);
        }

        let coords = sample.coords();
        let leg_km = match self.last_accepted {
            Some(prev) => self.distance.add_leg(&prev, &coords),
            None => 0.0,
        };
        self.last_accepted = Some(coords);
        self.skip_jitter_once = false;

        let plan = self.elevation.plan(
            sample.usable_altitude(),
            sample.altitude_accuracy,
            self.clock.monotonic_ms(),
        );
        let (elevation, lookup) = match plan {
            ElevationPlan::Device(e) | ElevationPlan::Cached(e) => (Some(e), None),
            ElevationPlan::Lookup => (None, Some(coords)),
            ElevationPlan::Unavailable => (None, None),
        };

        let mut entry = RouteEntry::position(coords, sample.timestamp, sample.accuracy);
        if let Some(p) = entry.as_position_mut() {
            p.elevation = elevation;
        }

        let (entry_id, backup_due) = self.insert(entry);
        self.path.push(coords);

        SampleOutcome::Accepted {
            entry_id,
            lookup,
            elevation,
            leg_km,
            backup_due,
        }
    }

    /// Append an entry supplied by a collaborator (photo, note, position).
    ///
    /// Returns the assigned id and whether a threshold snapshot is due.
    pub fn add_route_point(&mut self, entry: RouteEntry) -> (EntryId, bool) {
        self.insert(entry)
    }

    /// Append a coordinate to the derived path.
    pub fn add_path_point(&mut self, coords: GpsPoint) {
        self.path.push(coords);
    }

    fn insert(&mut self, mut entry: RouteEntry) -> (EntryId, bool) {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        entry.set_id(id);
        self.entries.push(entry);
        (id, self.backup_due())
    }

    /// Apply an external elevation reply to the entry it was issued for.
    ///
    /// Returns `true` when the entry was found and patched. The value is
    /// cached for throttled samples either way.
    pub fn apply_elevation(&mut self, entry_id: EntryId, meters: f64) -> bool {
        let Some(elevation) = self.elevation.record_lookup(meters) else {
            return false;
        };

        let target = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.id() == entry_id)
            .and_then(RouteEntry::as_position_mut);

        match target {
            Some(position) => {
                position.elevation = Some(elevation);
                true
            }
            None => {
                log::debug!(
                    "[RouteRecorder] Elevation reply for {:?} has no matching entry",
                    entry_id
                );
                false
            }
        }
    }

    // ========================================================================
    // Backups
    // ========================================================================

    /// Whether an insertion-triggered snapshot should be written now.
    pub fn backup_due(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        let every = self.config.backup_every_entries;
        let count_hit = every > 0 && !self.entries.is_empty() && self.entries.len() % every == 0;
        let gap_hit = match self.last_backup_ms {
            Some(last) => {
                self.clock.monotonic_ms().saturating_sub(last) > self.config.backup_max_gap_ms
            }
            None => true,
        };
        count_hit || gap_hit
    }

    /// Record that a snapshot has just been written.
    pub fn mark_backup_written(&mut self) {
        self.last_backup_ms = Some(self.clock.monotonic_ms());
    }

    /// Copy the buffer into a snapshot, using the live elapsed time.
    pub fn snapshot(&self, device_info: &str) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            entries: self.entries.clone(),
            path: self.path.clone(),
            total_distance_km: self.distance.total_km(),
            elapsed_ms: self.timer.elapsed_ms(),
            is_tracking: self.is_active(),
            is_paused: self.state == TrackingState::Paused,
            captured_at: self.clock.wall_ms(),
            start_time: self.start_time,
            device_info: device_info.to_string(),
        }
    }

    /// Repopulate an idle recorder from a snapshot.
    ///
    /// The restored route is never auto-resumed: the recorder stays Idle
    /// and the next `start()` continues it.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        if self.is_active() {
            return Err(RouteError::RestoreWhileActive);
        }
        let Ok(elapsed) = i64::try_from(snapshot.elapsed_ms) else {
            return Err(RouteError::InvalidSnapshot(format!(
                "elapsed time {} ms out of range",
                snapshot.elapsed_ms
            )));
        };
        if !snapshot.total_distance_km.is_finite() || snapshot.total_distance_km < 0.0 {
            return Err(RouteError::InvalidSnapshot(format!(
                "distance {} km out of range",
                snapshot.total_distance_km
            )));
        }

        let path = if snapshot.path.is_empty() {
            snapshot.position_path()
        } else {
            snapshot.path.clone()
        };

        self.reset();
        self.entries = snapshot.entries;

        let ids_usable = {
            let mut seen = std::collections::HashSet::new();
            self.entries
                .iter()
                .all(|e| e.id().is_assigned() && seen.insert(e.id()))
        };
        if !ids_usable {
            for (i, entry) in self.entries.iter_mut().enumerate() {
                entry.set_id(EntryId(i as u64 + 1));
            }
        }
        self.next_id = self.entries.iter().map(|e| e.id().0).max().unwrap_or(0) + 1;

        self.path = path;
        self.last_accepted = self.path.last().copied();
        self.distance = DistanceAccumulator::with_total(snapshot.total_distance_km);
        self.timer.set_elapsed(snapshot.elapsed_ms);
        self.start_time = Some(self.clock.wall_ms().saturating_sub(elapsed));
        self.state = TrackingState::Idle;

        log::info!(
            "[RouteRecorder] Restored {} entries, {:.3} km, {} ms",
            self.entries.len(),
            self.distance.total_km(),
            snapshot.elapsed_ms
        );
        Ok(())
    }

    /// Build a finalized route from the buffer. The buffer is left intact.
    pub fn finalize(&self, id: String, name: String) -> Result<FinalizedRoute> {
        if self.entries.is_empty() {
            return Err(RouteError::EmptyRoute);
        }
        Ok(FinalizedRoute {
            schema_version: SCHEMA_VERSION,
            id,
            name,
            created_at: self.clock.wall_ms(),
            total_distance_km: self.distance.total_km(),
            elapsed_ms: self.timer.elapsed_ms(),
            entries: self.entries.clone(),
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Tracking or paused.
    pub fn is_active(&self) -> bool {
        self.state != TrackingState::Idle
    }

    pub fn status(&self) -> TrackingStatus {
        TrackingStatus {
            is_tracking: self.is_active(),
            is_paused: self.state == TrackingState::Paused,
        }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn path(&self) -> &[GpsPoint] {
        &self.path
    }

    pub fn total_distance_km(&self) -> f64 {
        self.distance.total_km()
    }

    /// Live elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary::of(
            &self.entries,
            self.distance.total_km(),
            self.timer.elapsed_ms(),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ElevationSource;
    use crate::geo_utils::{haversine_km, meters_to_lat_degrees};
    use crate::timer::ManualClock;

    const WALL: i64 = 1_700_000_000_000;

    fn recorder() -> (Arc<ManualClock>, RouteRecorder) {
        let clock = Arc::new(ManualClock::new(WALL));
        let recorder = RouteRecorder::new(RecorderConfig::default(), clock.clone());
        (clock, recorder)
    }

    /// Sample `meters` north of the origin.
    fn sample_north(clock: &ManualClock, meters: f64) -> RawSample {
        RawSample::new(
            46.0 + meters_to_lat_degrees(meters),
            8.0,
            5.0,
            clock.wall_ms(),
        )
    }

    #[test]
    fn test_state_transitions() {
        let (_clock, mut rec) = recorder();
        assert_eq!(rec.state(), TrackingState::Idle);
        assert!(rec.toggle_pause().is_err());
        assert!(rec.stop().is_err());

        assert_eq!(rec.start().unwrap(), StartKind::Fresh);
        assert!(rec.start().is_err());
        assert_eq!(rec.toggle_pause().unwrap(), TrackingState::Paused);
        assert_eq!(
            rec.status(),
            TrackingStatus {
                is_tracking: true,
                is_paused: true
            }
        );
        assert_eq!(rec.toggle_pause().unwrap(), TrackingState::Tracking);
        rec.stop().unwrap();
        assert_eq!(rec.state(), TrackingState::Idle);
    }

    #[test]
    fn test_distance_is_sum_of_legs() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();

        let mut accepted = Vec::new();
        for i in 0..12 {
            let s = sample_north(&clock, i as f64 * 10.0);
            if let SampleOutcome::Accepted { .. } = rec.process_sample(s) {
                accepted.push(s.coords());
            }
            clock.advance(1_000);
        }

        assert_eq!(accepted.len(), 12);
        let expected: f64 = accepted.windows(2).map(|w| haversine_km(&w[0], &w[1])).sum();
        assert!((rec.total_distance_km() - expected).abs() < 1e-12);
        assert!((rec.total_distance_km() * 1000.0 - 110.0).abs() < 1e-6);
        assert_eq!(rec.path().len(), 12);
    }

    #[test]
    fn test_jitter_changes_nothing() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.process_sample(sample_north(&clock, 0.0));
        rec.process_sample(sample_north(&clock, 10.0));

        let distance = rec.total_distance_km();
        let outcome = rec.process_sample(sample_north(&clock, 12.0));

        assert!(matches!(
            outcome,
            SampleOutcome::Rejected(Rejection::Jitter { .. })
        ));
        assert_eq!(rec.total_distance_km(), distance);
        assert_eq!(rec.entries().len(), 2);
        assert_eq!(rec.path().len(), 2);
    }

    #[test]
    fn test_count_threshold_triggers_backup() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();

        let mut due_at = Vec::new();
        for i in 0..12 {
            if let SampleOutcome::Accepted { backup_due, .. } =
                rec.process_sample(sample_north(&clock, i as f64 * 10.0))
            {
                if backup_due {
                    due_at.push(rec.entries().len());
                    rec.mark_backup_written();
                }
            }
        }
        assert_eq!(due_at, vec![10]);
    }

    #[test]
    fn test_gap_threshold_triggers_backup_while_paused() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.toggle_pause().unwrap();
        clock.advance(120_001);

        let (_, due) = rec.add_route_point(RouteEntry::note(GpsPoint::new(46.0, 8.0), "x", 0));
        assert!(due);
    }

    #[test]
    fn test_no_backup_when_idle() {
        let (clock, mut rec) = recorder();
        clock.advance(500_000);
        let (_, due) = rec.add_route_point(RouteEntry::note(GpsPoint::new(46.0, 8.0), "x", 0));
        assert!(!due);
    }

    #[test]
    fn test_samples_ignored_while_paused() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.toggle_pause().unwrap();
        let outcome = rec.process_sample(sample_north(&clock, 0.0));
        assert_eq!(outcome, SampleOutcome::Rejected(Rejection::NotTracking));
    }

    #[test]
    fn test_pause_resume_elapsed_scenario() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        clock.advance(65_000);
        rec.toggle_pause().unwrap();
        assert_eq!(rec.elapsed_ms(), 65_000);

        // Time spent paused does not count
        clock.advance(40_000);
        rec.toggle_pause().unwrap();
        clock.advance(10_000);
        let final_ms = rec.stop().unwrap();
        assert!((final_ms as i64 - 75_000).abs() <= 1_000);
    }

    #[test]
    fn test_elevation_applied_by_id() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();

        let first = rec.process_sample(sample_north(&clock, 0.0));
        let SampleOutcome::Accepted {
            entry_id, lookup, ..
        } = first
        else {
            panic!("first sample rejected");
        };
        assert!(lookup.is_some());

        // Another sample lands before the reply; within the throttle window
        clock.advance(2_000);
        let second = rec.process_sample(sample_north(&clock, 20.0));
        assert!(matches!(
            second,
            SampleOutcome::Accepted { lookup: None, elevation: None, .. }
        ));

        assert!(rec.apply_elevation(entry_id, 431.0));
        let patched = rec.entries()[0].as_position().unwrap();
        assert_eq!(patched.elevation.unwrap().source, ElevationSource::Api);
        assert!(rec.entries()[1].as_position().unwrap().elevation.is_none());

        // Following throttled sample reuses the cached value
        clock.advance(2_000);
        match rec.process_sample(sample_north(&clock, 40.0)) {
            SampleOutcome::Accepted {
                elevation: Some(e), ..
            } => assert_eq!(e.source, ElevationSource::ApiCached),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_device_altitude_attached_immediately() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        let s = sample_north(&clock, 0.0).with_altitude(1200.0, Some(4.0));
        match rec.process_sample(s) {
            SampleOutcome::Accepted {
                lookup: None,
                elevation: Some(e),
                ..
            } => {
                assert_eq!(e.source, ElevationSource::Device);
                assert_eq!(e.meters, 1200.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fresh_start_clears_buffer() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.process_sample(sample_north(&clock, 0.0));
        rec.stop().unwrap();
        // Stopped at 0 ms elapsed: not resumable
        assert_eq!(rec.start().unwrap(), StartKind::Fresh);
        assert!(rec.entries().is_empty());
    }

    #[test]
    fn test_cancelled_stop_resumes() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.process_sample(sample_north(&clock, 0.0));
        clock.advance(30_000);
        rec.stop().unwrap();

        clock.advance(5_000);
        assert_eq!(
            rec.start().unwrap(),
            StartKind::Resumed { elapsed_ms: 30_000 }
        );
        assert_eq!(rec.entries().len(), 1);
        assert_eq!(rec.start_time(), Some(clock.wall_ms() - 30_000));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        for i in 0..5 {
            rec.process_sample(sample_north(&clock, i as f64 * 25.0));
            clock.advance(3_000);
        }
        rec.add_route_point(RouteEntry::note(GpsPoint::new(46.0, 8.0), "summit", 0));
        let snapshot = rec.snapshot("unit-test");
        assert!(snapshot.is_tracking);

        let (_clock2, mut restored) = recorder();
        restored.restore(snapshot.clone()).unwrap();
        assert_eq!(restored.entries().len(), 6);
        assert_eq!(restored.total_distance_km(), rec.total_distance_km());
        assert_eq!(restored.elapsed_ms(), 15_000);
        assert_eq!(restored.status(), TrackingStatus { is_tracking: false, is_paused: false });

        // Ids continue after the restored maximum
        let (id, _) = restored.add_route_point(RouteEntry::note(GpsPoint::new(0.0, 0.0), "n", 0));
        assert_eq!(id, EntryId(7));
    }

    #[test]
    fn test_restore_rebuilds_empty_path() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        for i in 0..4 {
            rec.process_sample(sample_north(&clock, i as f64 * 50.0));
        }
        let mut snapshot = rec.snapshot("unit-test");
        let expected = snapshot.path.clone();
        snapshot.path.clear();

        let (_c, mut restored) = recorder();
        restored.restore(snapshot).unwrap();
        assert_eq!(restored.path(), expected.as_slice());
    }

    #[test]
    fn test_restore_rejects_out_of_range_elapsed() {
        let (clock, mut rec) = recorder();
        rec.start().unwrap();
        rec.process_sample(sample_north(&clock, 0.0));
        rec.stop().unwrap();
        let mut snapshot = rec.snapshot("unit-test");
        snapshot.elapsed_ms = 1 << 63;

        let (_c, mut restored) = recorder();
        assert!(matches!(
            restored.restore(snapshot),
            Err(RouteError::InvalidSnapshot(_))
        ));
        assert!(restored.entries().is_empty());
        assert_eq!(restored.elapsed_ms(), 0);
    }

    #[test]
    fn test_restore_refused_while_active() {
        let (_clock, mut rec) = recorder();
        let snapshot = rec.snapshot("x");
        rec.start().unwrap();
        assert_eq!(rec.restore(snapshot), Err(RouteError::RestoreWhileActive));
    }

    #[test]
    fn test_finalize_empty_is_error() {
        let (_clock, rec) = recorder();
        assert_eq!(
            rec.finalize("r1".into(), "Empty".into()),
            Err(RouteError::EmptyRoute)
        );
    }
}

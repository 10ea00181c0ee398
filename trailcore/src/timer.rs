//! Clocks and the pause/resume-aware elapsed-time tracker.
//!
//! Elapsed time is always a difference of two readings of a monotonic
//! clock. Wall-clock time is only used for capture timestamps and for
//! snapshot age, so a wall-clock jump (NTP sync, manual change) never
//! corrupts the elapsed value.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Time source for the recorder.
pub trait Clock: Send + Sync {
    /// Milliseconds on a monotonic clock with an arbitrary origin.
    fn monotonic_ms(&self) -> u64;

    /// Wall-clock time as Unix milliseconds.
    fn wall_ms(&self) -> i64;
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    monotonic: AtomicU64,
    wall: AtomicI64,
}

impl ManualClock {
    pub fn new(wall_start_ms: i64) -> Self {
        Self {
            monotonic: AtomicU64::new(0),
            wall: AtomicI64::new(wall_start_ms),
        }
    }

    /// Advance both clocks by `ms`.
    pub fn advance(&self, ms: u64) {
        self.monotonic.fetch_add(ms, Ordering::SeqCst);
        self.wall.fetch_add(ms as i64, Ordering::SeqCst);
    }

    /// Jump the wall clock without touching the monotonic clock.
    pub fn set_wall(&self, wall_ms: i64) {
        self.wall.store(wall_ms, Ordering::SeqCst);
    }

    pub fn wall_ms(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_ms(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Pause/resume-aware stopwatch.
///
/// While running, the start reference is `now - baseline`, so the elapsed
/// value is recomputed from the clock on every read and never drifts from
/// missed display ticks.
pub struct ElapsedTimer {
    clock: Arc<dyn Clock>,
    /// Monotonic start reference while running (may be negative after a
    /// resume from a baseline larger than the clock's origin offset).
    start_ref_ms: Option<i64>,
    elapsed_ms: u64,
}

impl ElapsedTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            start_ref_ms: None,
            elapsed_ms: 0,
        }
    }

    fn now(&self) -> i64 {
        i64::try_from(self.clock.monotonic_ms()).unwrap_or(i64::MAX)
    }

    pub fn is_running(&self) -> bool {
        self.start_ref_ms.is_some()
    }

    /// Start counting from `resume_from_ms`. Returns `false` (and does
    /// nothing) when already running.
    pub fn start(&mut self, resume_from_ms: u64) -> bool {
        if self.is_running() {
            return false;
        }
        let baseline = i64::try_from(resume_from_ms).unwrap_or(i64::MAX);
        self.start_ref_ms = Some(self.now().saturating_sub(baseline));
        self.elapsed_ms = resume_from_ms;
        true
    }

    /// Capture the elapsed value and stop counting.
    pub fn pause(&mut self) -> u64 {
        if let Some(start) = self.start_ref_ms.take() {
            self.elapsed_ms = self.now().saturating_sub(start).max(0) as u64;
        }
        self.elapsed_ms
    }

    /// Continue from the retained elapsed value.
    pub fn resume(&mut self) -> bool {
        self.start(self.elapsed_ms)
    }

    /// Same capture as `pause`, returning the final value.
    pub fn stop(&mut self) -> u64 {
        self.pause()
    }

    /// Force the stored value without starting. Ignored while running.
    pub fn set_elapsed(&mut self, ms: u64) {
        if !self.is_running() {
            self.elapsed_ms = ms;
        }
    }

    /// Live elapsed value: computed from the clock while running.
    pub fn elapsed_ms(&self) -> u64 {
        match self.start_ref_ms {
            Some(start) => self.now().saturating_sub(start).max(0) as u64,
            None => self.elapsed_ms,
        }
    }

    /// Stop and zero.
    pub fn reset(&mut self) {
        self.start_ref_ms = None;
        self.elapsed_ms = 0;
    }
}

impl std::fmt::Debug for ElapsedTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElapsedTimer")
            .field("running", &self.is_running())
            .field("elapsed_ms", &self.elapsed_ms())
            .finish()
    }
}

//! # Tracking Session
//!
//! The context object that owns the live route buffer and wires it to
//! its collaborators: the positioning subscription, the elevation lookup,
//! the persistence store and the UI prompter.
//!
//! There is exactly one session per app run. It is constructed at startup
//! and passed by `&mut` to whatever drives it; nothing is reachable through
//! globals.
//!
//! ## Event loop
//!
//! [`TrackingSession::next_event`] waits for the next thing that needs the
//! buffer (a positioning sample, the 30 s backup tick, the 1 Hz display
//! tick or an elevation reply) and [`TrackingSession::handle_event`]
//! applies it. Events are handled one at a time, so buffer mutations are
//! serialized. [`TrackingSession::run`] multiplexes these with UI
//! commands until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use trailcore::{
    Clock, EntryId, FinalizedRoute, GpsPoint, RawSample, RouteEntry, RouteError,
    RouteRecorder, RouteSummary, SampleOutcome, Snapshot, StartKind, TrackingState,
    TrackingStatus,
};

use crate::clock::TokioClock;
use crate::config::TrackerConfig;
use crate::error::{ElevationError, Result, SessionError};
use crate::http::ElevationLookup;
use crate::position::{PositionError, PositionSource, Subscription};
use crate::prompts::{Notice, Prompter, SaveDecision};
use crate::recovery;
use crate::storage::BackendKind;
use crate::store::PersistenceStore;

/// Settings key of the accessibility-survey side channel; a fresh start
/// clears it.
pub const ACCESSIBILITY_SURVEY_KEY: &str = "accessibility_survey";

const DISPLAY_TICK: Duration = Duration::from_secs(1);

type ElevationReply = BoxFuture<'static, (EntryId, std::result::Result<Option<f64>, ElevationError>)>;

/// External collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    pub positions: Arc<dyn PositionSource>,
    pub elevation: Arc<dyn ElevationLookup>,
    pub prompter: Arc<dyn Prompter>,
}

/// Command from the UI.
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    TogglePause,
    Stop,
    AddEntry(RouteEntry),
    Shutdown,
}

impl SessionCommand {
    fn label(&self) -> &'static str {
        match self {
            SessionCommand::Start => "start",
            SessionCommand::TogglePause => "toggle pause",
            SessionCommand::Stop => "stop",
            SessionCommand::AddEntry(_) => "add entry",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}

/// Something that needs the route buffer.
#[derive(Debug)]
pub enum SessionEvent {
    Sample(std::result::Result<RawSample, PositionError>),
    /// The positioning subscription ended on its own
    PositionClosed,
    BackupTick,
    DisplayTick,
    Elevation {
        entry_id: EntryId,
        result: std::result::Result<Option<f64>, ElevationError>,
    },
}

/// Result of `stop()`.
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing was captured; buffer reset without prompting
    Empty,
    Saved(FinalizedRoute),
    Discarded,
    /// Buffer kept; the next `start()` resumes it
    Cancelled,
}

pub struct TrackingSession {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    store: PersistenceStore,
    recorder: RouteRecorder,

    positions: Arc<dyn PositionSource>,
    elevation: Arc<dyn ElevationLookup>,
    prompter: Arc<dyn Prompter>,

    subscription: Option<Subscription>,
    backup_timer: Option<Interval>,
    display_timer: Option<Interval>,
    pending_elevations: FuturesUnordered<ElevationReply>,
    elapsed_tx: watch::Sender<u64>,
    recovery_checked: bool,
}

impl TrackingSession {
    pub fn new(
        config: TrackerConfig,
        store: PersistenceStore,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recorder = RouteRecorder::new(config.recorder.clone(), clock.clone());
        let (elapsed_tx, _) = watch::channel(0);
        Self {
            config,
            clock,
            store,
            recorder,
            positions: collaborators.positions,
            elevation: collaborators.elevation,
            prompter: collaborators.prompter,
            subscription: None,
            backup_timer: None,
            display_timer: None,
            pending_elevations: FuturesUnordered::new(),
            elapsed_tx,
            recovery_checked: false,
        }
    }

    /// Open the store from configuration and build a session on the
    /// runtime clock.
    pub async fn open(config: TrackerConfig, collaborators: Collaborators) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let store = PersistenceStore::open(&config, clock.wall_ms()).await?;
        Ok(Self::new(config, store, collaborators, clock))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Idle → Tracking. Resumes a restored or cancelled route, otherwise
    /// starts fresh.
    pub async fn start(&mut self) -> Result<StartKind> {
        let kind = self.recorder.start()?;

        if let Err(e) = self.subscribe() {
            self.recorder.stop().ok();
            self.prompter.notify(e.into());
            return Err(e.into());
        }

        if kind == StartKind::Fresh {
            self.pending_elevations = FuturesUnordered::new();
            if let Err(e) = self.store.delete_setting(ACCESSIBILITY_SURVEY_KEY).await {
                warn!("[TrackingSession] Failed to clear accessibility survey: {}", e);
            }
        }

        self.start_timers();
        self.publish_elapsed();
        info!("[TrackingSession] Tracking started ({:?})", kind);
        Ok(kind)
    }

    /// Tracking ↔ Paused. Pausing drops the subscription and the timers and
    /// writes a snapshot; resuming re-subscribes.
    pub async fn toggle_pause(&mut self) -> Result<TrackingState> {
        match self.recorder.state() {
            TrackingState::Idle => Err(RouteError::NotTracking.into()),
            TrackingState::Tracking => {
                self.recorder.toggle_pause()?;
                self.unsubscribe();
                self.stop_timers();
                self.publish_elapsed();
                self.backup_or_warn().await;
                Ok(TrackingState::Paused)
            }
            TrackingState::Paused => {
                if let Err(e) = self.subscribe() {
                    self.prompter.notify(e.into());
                    return Err(e.into());
                }
                self.recorder.toggle_pause()?;
                self.start_timers();
                Ok(TrackingState::Tracking)
            }
        }
    }

    /// Tracking/Paused → Idle, then the save-or-discard flow.
    ///
    /// A final snapshot is written before prompting, so a cancelled or
    /// failed save is still recoverable. On save failure the buffer stays
    /// in memory and the error is returned.
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        let elapsed = self.halt_capture()?;

        if self.recorder.entries().is_empty() {
            self.reset_buffer();
            recovery::discard_backup(&self.store).await;
            info!("[TrackingSession] Stopped with nothing captured");
            return Ok(StopOutcome::Empty);
        }

        self.backup_or_warn().await;
        info!(
            "[TrackingSession] Stopped after {} ms, asking to save {} entries",
            elapsed,
            self.recorder.entries().len()
        );

        match self.prompter.confirm_save(self.recorder.summary()).await {
            SaveDecision::Saved(name) => match self.save_session(Some(name)).await {
                Ok(route) => Ok(StopOutcome::Saved(route)),
                Err(e) => {
                    self.prompter.notify(Notice::SaveFailed(e.to_string()));
                    Err(e)
                }
            },
            SaveDecision::Discarded => {
                recovery::discard_backup(&self.store).await;
                self.reset_buffer();
                info!("[TrackingSession] Route discarded");
                Ok(StopOutcome::Discarded)
            }
            SaveDecision::Cancelled => {
                info!("[TrackingSession] Save cancelled, route kept in memory");
                Ok(StopOutcome::Cancelled)
            }
        }
    }

    /// Persist the buffer as a finalized route, clear the backup and reset.
    ///
    /// Requires a non-empty, stopped buffer. A blank name gets a
    /// date-based default.
    pub async fn save_session(&mut self, name: Option<String>) -> Result<FinalizedRoute> {
        if self.recorder.entries().is_empty() {
            return Err(RouteError::EmptyRoute.into());
        }
        if self.recorder.is_active() {
            return Err(SessionError::InvalidState(
                "stop tracking before saving".to_string(),
            ));
        }

        let now = self.clock.wall_ms();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_route_name(now));

        let id = self.unused_route_id(now).await?;
        let route = self.recorder.finalize(id, name)?;
        self.store.put_route(&route).await?;

        recovery::discard_backup(&self.store).await;
        self.reset_buffer();

        info!(
            "[TrackingSession] Saved '{}' ({} entries, {:.3} km)",
            route.name,
            route.entries.len(),
            route.total_distance_km
        );
        Ok(route)
    }

    /// `route_<wall ms>`, suffixed when that id is already stored so a
    /// same-millisecond save or a clock step back never overwrites a route.
    async fn unused_route_id(&self, now: i64) -> Result<String> {
        let base = format!("route_{}", now);
        let mut id = base.clone();
        let mut suffix = 1u32;
        while self.store.get_route(&id).await?.is_some() {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        Ok(id)
    }

    /// Late elevation replies for a cleared buffer are dropped with it,
    /// since entry ids restart from 1.
    fn reset_buffer(&mut self) {
        self.recorder.reset();
        self.pending_elevations = FuturesUnordered::new();
        self.publish_elapsed();
    }

    fn halt_capture(&mut self) -> Result<u64> {
        let elapsed = self.recorder.stop()?;
        self.unsubscribe();
        self.stop_timers();
        self.publish_elapsed();
        Ok(elapsed)
    }

    fn subscribe(&mut self) -> std::result::Result<(), PositionError> {
        let subscription = self.positions.subscribe(&self.config.position)?;
        debug!("[TrackingSession] Subscribed to positioning ({})", subscription.id);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Dropping the receiver discards any samples still queued.
    fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.positions.unsubscribe(subscription.id);
            debug!("[TrackingSession] Unsubscribed ({})", subscription.id);
        }
    }

    fn start_timers(&mut self) {
        let every = Duration::from_secs(self.config.backup_interval_secs.max(1));
        let mut backup = interval_at(Instant::now() + every, every);
        backup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.backup_timer = Some(backup);

        let mut display = interval_at(Instant::now() + DISPLAY_TICK, DISPLAY_TICK);
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.display_timer = Some(display);
    }

    fn stop_timers(&mut self) {
        self.backup_timer = None;
        self.display_timer = None;
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Feed one positioning sample through the pipeline.
    pub async fn process_sample(&mut self, sample: RawSample) -> SampleOutcome {
        let outcome = self.recorder.process_sample(sample);
        if let SampleOutcome::Accepted {
            entry_id,
            lookup,
            backup_due,
            ..
        } = &outcome
        {
            if let Some(point) = lookup {
                self.request_elevation(*entry_id, *point);
            }
            if *backup_due {
                self.backup_or_warn().await;
            }
        }
        outcome
    }

    /// Append a collaborator-supplied entry (photo, note). Returns its id.
    pub async fn add_route_point(&mut self, entry: RouteEntry) -> EntryId {
        let (id, backup_due) = self.recorder.add_route_point(entry);
        if backup_due {
            self.backup_or_warn().await;
        }
        id
    }

    pub fn add_path_point(&mut self, coords: GpsPoint) {
        self.recorder.add_path_point(coords);
    }

    fn request_elevation(&mut self, entry_id: EntryId, point: GpsPoint) {
        let lookup = self.elevation.lookup(point);
        self.pending_elevations
            .push(async move { (entry_id, lookup.await) }.boxed());
    }

    fn apply_elevation_result(
        &mut self,
        entry_id: EntryId,
        result: std::result::Result<Option<f64>, ElevationError>,
    ) {
        match result {
            Ok(Some(meters)) => {
                if self.recorder.apply_elevation(entry_id, meters) {
                    debug!("[TrackingSession] Elevation {:.1} m applied to {:?}", meters, entry_id);
                }
            }
            Ok(None) => debug!("[TrackingSession] No elevation for {:?}", entry_id),
            Err(e) => warn!("[TrackingSession] Elevation lookup failed for {:?}: {}", entry_id, e),
        }
    }

    /// Wait for every in-flight elevation lookup and apply the replies.
    pub async fn flush_elevations(&mut self) {
        while let Some((entry_id, result)) = self.pending_elevations.next().await {
            self.apply_elevation_result(entry_id, result);
        }
    }

    async fn handle_position_error(&mut self, error: PositionError) {
        warn!("[TrackingSession] Positioning error: {}", error);
        self.prompter.notify(error.into());

        if error == PositionError::PermissionDenied && self.recorder.is_active() {
            warn!("[TrackingSession] Permission denied, force stopping capture");
            if self.halt_capture().is_ok() {
                self.backup_or_warn().await;
            }
        }
    }

    // ========================================================================
    // Backups and recovery
    // ========================================================================

    /// Snapshot the buffer (with the live elapsed time) into the backup slot.
    pub async fn write_backup(&mut self) -> Result<BackendKind> {
        let snapshot = self.recorder.snapshot(&self.config.device_info);
        let backend = self.store.write_backup(&snapshot).await?;
        self.recorder.mark_backup_written();
        Ok(backend)
    }

    async fn backup_or_warn(&mut self) {
        if let Err(e) = self.write_backup().await {
            warn!("[TrackingSession] Backup write failed: {}", e);
        }
    }

    /// A restorable snapshot, or `None`. Never consulted while tracking.
    pub async fn check_for_unsaved_route(&self) -> Option<Snapshot> {
        if self.recorder.is_active() {
            return None;
        }
        recovery::check_for_unsaved_route(
            &self.store,
            self.clock.wall_ms(),
            self.config.max_backup_age_ms(),
        )
        .await
    }

    /// Repopulate the idle buffer from a snapshot. The route is not resumed.
    pub fn restore_from_backup(&mut self, snapshot: Snapshot) -> bool {
        match self.recorder.restore(snapshot) {
            Ok(()) => {
                self.publish_elapsed();
                true
            }
            Err(e) => {
                warn!("[TrackingSession] Restore refused: {}", e);
                false
            }
        }
    }

    /// Startup recovery: offer any unsaved route once per session.
    ///
    /// Returns `true` if a route was restored into the buffer.
    pub async fn recover_on_startup(&mut self) -> bool {
        if self.recovery_checked || self.recorder.is_active() {
            return false;
        }
        self.recovery_checked = true;

        let Some(snapshot) = self.check_for_unsaved_route().await else {
            return false;
        };

        if self.prompter.offer_restore(snapshot.summary()).await {
            self.restore_from_backup(snapshot)
        } else {
            info!("[TrackingSession] Restore declined, discarding backup");
            recovery::discard_backup(&self.store).await;
            false
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Wait for the next event. Returns `None` when nothing is active.
    ///
    /// Cancel-safe: dropping the future loses no event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let has_pending = !self.pending_elevations.is_empty();
        if self.subscription.is_none()
            && self.backup_timer.is_none()
            && self.display_timer.is_none()
            && !has_pending
        {
            return None;
        }

        tokio::select! {
            sample = recv_sample(&mut self.subscription) => Some(match sample {
                Some(sample) => SessionEvent::Sample(sample),
                None => SessionEvent::PositionClosed,
            }),
            _ = tick(&mut self.backup_timer) => Some(SessionEvent::BackupTick),
            _ = tick(&mut self.display_timer) => Some(SessionEvent::DisplayTick),
            Some((entry_id, result)) = self.pending_elevations.next(), if has_pending => {
                Some(SessionEvent::Elevation { entry_id, result })
            }
            else => None,
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Sample(Ok(sample)) => {
                self.process_sample(sample).await;
            }
            SessionEvent::Sample(Err(error)) => self.handle_position_error(error).await,
            SessionEvent::PositionClosed => {
                warn!("[TrackingSession] Positioning subscription closed");
                self.subscription = None;
            }
            SessionEvent::BackupTick => self.backup_or_warn().await,
            SessionEvent::DisplayTick => self.publish_elapsed(),
            SessionEvent::Elevation { entry_id, result } => {
                self.apply_elevation_result(entry_id, result)
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        let label = command.label();
        let result = match command {
            SessionCommand::Start => self.start().await.map(|_| ()),
            SessionCommand::TogglePause => self.toggle_pause().await.map(|_| ()),
            SessionCommand::Stop => self
                .stop()
                .await
                .map(|outcome| info!("[TrackingSession] Stop outcome: {:?}", outcome)),
            SessionCommand::AddEntry(entry) => {
                self.add_route_point(entry).await;
                Ok(())
            }
            SessionCommand::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!("[TrackingSession] Command '{}' failed: {}", label, e);
        }
    }

    /// Process commands and events until `Shutdown` or the command channel
    /// closes. An active route is snapshotted on the way out.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = self.next_event() => self.handle_event(event).await,
            }
        }

        if self.recorder.is_active() {
            self.backup_or_warn().await;
        }
        info!("[TrackingSession] Event loop stopped");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Copy of the captured entries.
    pub fn get_route_data(&self) -> Vec<RouteEntry> {
        self.recorder.entries().to_vec()
    }

    pub fn get_path(&self) -> Vec<GpsPoint> {
        self.recorder.path().to_vec()
    }

    pub fn get_total_distance(&self) -> f64 {
        self.recorder.total_distance_km()
    }

    pub fn get_elapsed_time(&self) -> u64 {
        self.recorder.elapsed_ms()
    }

    pub fn get_tracking_state(&self) -> TrackingStatus {
        self.recorder.status()
    }

    pub fn summary(&self) -> RouteSummary {
        self.recorder.summary()
    }

    /// Finalized routes, newest first.
    pub async fn get_sessions(&self) -> Result<Vec<FinalizedRoute>> {
        Ok(self.store.get_routes().await?)
    }

    /// Live elapsed time, refreshed by the display tick.
    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    fn publish_elapsed(&self) {
        self.elapsed_tx.send_replace(self.recorder.elapsed_ms());
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }
}

async fn recv_sample(
    subscription: &mut Option<Subscription>,
) -> Option<std::result::Result<RawSample, PositionError>> {
    match subscription {
        Some(subscription) => subscription.samples.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn default_route_name(wall_ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(wall_ms) {
        Some(at) => format!("Route {}", at.format("%Y-%m-%d %H:%M")),
        None => "Route".to_string(),
    }
}

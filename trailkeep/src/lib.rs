//! # Trailkeep
//!
//! App layer around [`trailcore`]: a live tracking session wired to a
//! positioning source, an external elevation service and a two-tier
//! persistence store that keeps routes alive through quota exhaustion,
//! backend failure and crashes.
//!
//! - [`store`]: SQLite primary with a key/value fallback, transparent to
//!   callers
//! - [`migrations`]: one-time move of fallback data into the primary
//! - [`recovery`]: startup validation of the backup slot
//! - [`session`]: the tracking session and its event loop

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod migrations;
pub mod position;
pub mod prompts;
pub mod recovery;
pub mod session;
pub mod storage;
pub mod store;

pub use clock::TokioClock;
pub use config::{PositionOptions, TrackerConfig};
pub use error::{ConfigError, ElevationError, Result, SessionError, StoreError, StoreResult};
pub use http::{ElevationLookup, NoElevation, OpenElevationClient};
pub use migrations::{migrate_fallback_into_primary, MigrationOutcome, MIGRATION_MARKER_KEY};
pub use position::{ChannelPositionSource, PositionError, PositionSource, Subscription};
pub use prompts::{Notice, Prompter, SaveDecision, ScriptedPrompter};
pub use session::{
    Collaborators, SessionCommand, SessionEvent, StopOutcome, TrackingSession,
    ACCESSIBILITY_SURVEY_KEY,
};
pub use storage::{BackendKind, Collection, Record, StorageBackend};
pub use store::PersistenceStore;

/// Install the `env_logger` backend, defaulting to `info`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

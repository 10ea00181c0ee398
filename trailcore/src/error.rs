//! Error type for route capture operations.
//!
//! Only programmer-visible misuse surfaces here. Rejected samples are not
//! errors (see [`crate::Rejection`]) and malformed snapshots are reported
//! through [`crate::SnapshotCheck`].

use thiserror::Error;

/// Errors raised by the route recorder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    /// `start()` while already tracking or paused
    #[error("Tracking already active")]
    AlreadyTracking,

    /// Pause, resume or stop while idle
    #[error("Tracking not active")]
    NotTracking,

    /// A snapshot can only be restored into an idle recorder
    #[error("Cannot restore a snapshot while tracking is active")]
    RestoreWhileActive,

    /// Finalizing a route that holds no entries
    #[error("Route has no entries to save")]
    EmptyRoute,

    /// Snapshot failed structural validation
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type alias for route capture operations.
pub type Result<T> = std::result::Result<T, RouteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouteError::InvalidSnapshot("entries is not an array".to_string());
        assert!(err.to_string().contains("entries is not an array"));
        assert_eq!(RouteError::EmptyRoute.to_string(), "Route has no entries to save");
    }
}

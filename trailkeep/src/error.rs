//! Error types for the app layer.

use thiserror::Error;
use trailcore::RouteError;

use crate::position::PositionError;
use crate::storage::BackendKind;

/// Failure of a storage backend operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Storage quota exceeded on {backend} backend")]
    QuotaExceeded { backend: BackendKind },

    #[error("Corrupt data under '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("Background storage task failed: {0}")]
    Background(String),
}

impl StoreError {
    /// Capacity failures, including SQLite's `SQLITE_FULL`.
    pub fn is_quota(&self) -> bool {
        match self {
            StoreError::QuotaExceeded { .. } => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DiskFull
            }
            _ => false,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure of a tracking-session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Positioning failed: {0}")]
    Position(#[from] PositionError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure of the external elevation lookup. Never surfaced to the user.
#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Elevation service returned HTTP {0}")]
    Status(u16),

    #[error("Max retries exceeded (429)")]
    RateLimited,
}

/// Failure loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        let full = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            Some("database or disk is full".to_string()),
        );
        assert!(StoreError::Sqlite(full).is_quota());

        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(!StoreError::Sqlite(busy).is_quota());

        assert!(StoreError::QuotaExceeded {
            backend: BackendKind::KeyValue
        }
        .is_quota());
        assert!(!StoreError::Background("join".into()).is_quota());
    }

    #[test]
    fn test_session_error_wraps_route_error() {
        let err: SessionError = RouteError::EmptyRoute.into();
        assert_eq!(err.to_string(), RouteError::EmptyRoute.to_string());
    }
}

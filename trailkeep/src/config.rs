//! Tracker configuration, stored as a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trailcore::RecorderConfig;

use crate::error::ConfigError;

/// Options passed to the positioning subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Accept a cached fix up to this old
    pub max_cached_age_ms: u64,
    /// Report a timeout if no fix arrives within this window
    pub timeout_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_cached_age_ms: 1_000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub recorder: RecorderConfig,
    /// SQLite database file (primary backend)
    pub database_path: PathBuf,
    /// Directory of the key/value fallback backend
    pub fallback_dir: PathBuf,
    pub fallback_quota_bytes: u64,
    /// Optional cap on the SQLite file size, in pages
    pub primary_max_page_count: Option<u32>,
    /// Periodic snapshot cadence while tracking
    pub backup_interval_secs: u64,
    /// Snapshots older than this are discarded at startup
    pub max_backup_age_hours: u64,
    pub position: PositionOptions,
    /// Elevation service endpoint; `None` disables external lookups
    pub elevation_url: Option<String>,
    /// Tag written into every snapshot
    pub device_info: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig::default(),
            database_path: PathBuf::from("trailkeep.db"),
            fallback_dir: PathBuf::from("trailkeep-fallback"),
            fallback_quota_bytes: 5 * 1024 * 1024,
            primary_max_page_count: None,
            backup_interval_secs: 30,
            max_backup_age_hours: 24,
            position: PositionOptions::default(),
            elevation_url: None,
            device_info: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl TrackerConfig {
    /// Defaults with both storage locations under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            database_path: dir.join("trailkeep.db"),
            fallback_dir: dir.join("fallback"),
            ..Self::default()
        }
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                "[TrackerConfig] {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write as pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn max_backup_age_ms(&self) -> i64 {
        self.max_backup_age_hours as i64 * 60 * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.backup_interval_secs, 30);
        assert_eq!(config.max_backup_age_ms(), 86_400_000);
        assert_eq!(config.recorder.max_accuracy_m, 100.0);
        assert_eq!(config.recorder.min_movement_m, 3.0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.fallback_quota_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/tracker.json");

        let mut config = TrackerConfig::in_dir(dir.path());
        config.elevation_url = Some("https://example.invalid/lookup".into());
        config.recorder.min_movement_m = 5.0;
        config.save(&path).unwrap();

        let loaded = TrackerConfig::load(&path).unwrap();
        assert_eq!(loaded.elevation_url, config.elevation_url);
        assert_eq!(loaded.recorder.min_movement_m, 5.0);
        assert_eq!(loaded.database_path, dir.path().join("trailkeep.db"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.json");
        std::fs::write(&path, r#"{ "backup_interval_secs": 10 }"#).unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.backup_interval_secs, 10);
        assert_eq!(config.max_backup_age_hours, 24);
    }
}

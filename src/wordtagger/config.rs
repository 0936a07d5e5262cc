//! # Configuration
//!
//! Application settings live in `settings.json` inside the wordtagger config
//! directory (see [`crate::init`]). They are per-user, not per-root: which root
//! was last granted, and the timing knobs of the sync engine.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `root_bookmark` | none | Grant for the last selected root |
//! | `last_root_path` | none | Path of the last root, used read-only when the grant is lost |
//! | `debounce_ms` | `800` | Quiet time after the last change before saving |
//! | `flush_timeout_ms` | `1000` | Longest wait for a pending save before a root switch |
//! | `max_search_results` | `50` | Cap on ranked search results |
//! | `backup_retention` | `10` | Backups kept per root |
//!
//! A missing file yields the defaults; missing keys fall back individually.

use crate::error::Result;
use crate::search::DEFAULT_MAX_RESULTS;
use crate::store::access::Bookmark;
use crate::store::DEFAULT_BACKUP_RETENTION;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILENAME: &str = "settings.json";
const DEFAULT_DEBOUNCE_MS: u64 = 800;
const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub root_bookmark: Option<Bookmark>,
    pub last_root_path: Option<PathBuf>,
    pub debounce_ms: u64,
    pub flush_timeout_ms: u64,
    pub max_search_results: usize,
    pub backup_retention: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            root_bookmark: None,
            last_root_path: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
            max_search_results: DEFAULT_MAX_RESULTS,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}

impl AppSettings {
    /// Load settings from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let path = config_dir.as_ref().join(SETTINGS_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(SETTINGS_FILENAME), content)?;
        Ok(())
    }

    /// Remembers a newly granted root.
    pub fn remember_root(&mut self, bookmark: Option<Bookmark>, path: Option<PathBuf>) {
        self.root_bookmark = bookmark;
        self.last_root_path = path;
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
        }
    }
}

/// Timing of the sync scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub debounce: Duration,
    pub flush_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        AppSettings::default().sync_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WordTaggerError;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.debounce_ms, 800);
        assert_eq!(settings.backup_retention, 10);
        assert_eq!(settings.max_search_results, 50);
        assert_eq!(SyncConfig::default().debounce, Duration::from_millis(800));
    }

    #[test]
    fn test_load_missing_settings() {
        let dir = TempDir::new().unwrap();
        let settings = AppSettings::load(dir.path().join("nope")).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILENAME), r#"{"debounce_ms": 5}"#).unwrap();
        let settings = AppSettings::load(dir.path()).unwrap();
        assert_eq!(settings.debounce_ms, 5);
        assert_eq!(settings.flush_timeout_ms, 1000);
    }

    #[test]
    fn test_malformed_settings_are_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILENAME), "{ debounce_ms: ").unwrap();
        let err = AppSettings::load(dir.path()).unwrap_err();
        assert!(matches!(err, WordTaggerError::Serialization(_)));
        assert_eq!(err.reason(), "serialization failure");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut settings = AppSettings::default();
        settings.remember_root(
            Some(Bookmark::new("/data/words")),
            Some(PathBuf::from("/data/words")),
        );
        settings.save(dir.path().join("nested")).unwrap();

        let loaded = AppSettings::load(dir.path().join("nested")).unwrap();
        assert_eq!(loaded, settings);
    }
}

//! # Startup
//!
//! Builds the production store from the user's settings.
//!
//! ## Config Directory
//!
//! Settings live in the OS-appropriate config directory (via the
//! `directories` crate, `com/wordtagger/wordtagger`). Setting
//! `WORDTAGGER_HOME` overrides it, which is what the integration tests do.
//!
//! ## Root Resolution
//!
//! The root chosen in a previous run is restored from its bookmark. If the
//! bookmark is gone or unusable but the last path still exists, that path is
//! opened read-only: its data can be browsed, but nothing is written until
//! the user selects the root again.

use crate::api::WordTagger;
use crate::config::AppSettings;
use crate::error::{Result, WordTaggerError};
use crate::store::fs_gateway::FsGateway;
use crate::store::Persistence;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "WORDTAGGER_HOME";

pub struct AppContext {
    pub api: WordTagger<FsGateway>,
    pub settings: AppSettings,
    pub config_dir: PathBuf,
    /// Why the previous root could not be opened, if it could not.
    pub startup_error: Option<WordTaggerError>,
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    ProjectDirs::from("com", "wordtagger", "wordtagger")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| {
            WordTaggerError::InvalidPath("could not determine a config directory".to_string())
        })
}

pub fn initialize(config_dir: &Path) -> Result<AppContext> {
    let settings = AppSettings::load(config_dir).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable settings: {}", e);
        AppSettings::default()
    });

    let mut gateway = FsGateway::default().with_backup_retention(settings.backup_retention);
    let mut startup_error = None;
    let has_root = if settings.root_bookmark.is_some() || settings.last_root_path.is_some() {
        match gateway.resolve_root(
            settings.root_bookmark.as_ref(),
            settings.last_root_path.as_deref(),
        ) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Previous storage root unavailable: {}", e);
                startup_error = Some(e);
                false
            }
        }
    } else {
        false
    };

    let api = WordTagger::new(gateway, settings.sync_config())?
        .with_max_results(settings.max_search_results);
    if has_root {
        if let Err(e) = api.force_reload() {
            startup_error = Some(e);
        }
    }

    Ok(AppContext {
        api,
        settings,
        config_dir: config_dir.to_path_buf(),
        startup_error,
    })
}

impl AppContext {
    /// Stores the current root and its grant for the next run.
    pub fn remember_root(&mut self) -> Result<()> {
        let (bookmark, path) = {
            let gateway = self.api.gateway().lock();
            (gateway.bookmark(), gateway.current_root())
        };
        self.settings.remember_root(bookmark, path);
        self.settings.save(&self.config_dir)
    }
}

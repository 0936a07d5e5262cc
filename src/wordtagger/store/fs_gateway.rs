use super::access::{
    is_sensitive_path, normalize_path, with_access, AccessGrantor, AccessMode, AccessToken,
    Bookmark, PathGrantor, PathToken,
};
use super::{
    to_sorted_json, LoadedData, Persistence, SaveReport, BACKUP_DIR, CONFIG_FILENAME,
    DEFAULT_BACKUP_RETENTION, LAYERS_FILE, LAYOUT_DIRS, METADATA_FILE, NODES_FILE,
    TAG_MAPPINGS_FILE,
};
use crate::error::{Result, WordTaggerError};
use crate::model::{BackupEnvelope, DataConfig, Layer, Node, Snapshot, TagMapping};
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

const ACCESS_SENTINEL: &str = ".wordtagger-access-check";

struct ActiveRoot {
    token: Arc<dyn AccessToken>,
    mode: AccessMode,
}

/// File-backed persistence under a user-chosen root directory.
pub struct FsGateway {
    grantor: Arc<dyn AccessGrantor>,
    root: Option<ActiveRoot>,
    backup_retention: usize,
}

impl Default for FsGateway {
    fn default() -> Self {
        Self::new(Arc::new(PathGrantor))
    }
}

impl FsGateway {
    pub fn new(grantor: Arc<dyn AccessGrantor>) -> Self {
        Self {
            grantor,
            root: None,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }

    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup_retention = retention.max(1);
        self
    }

    /// Bookmark of the current root, for persisting between runs.
    /// Read-only roots have nothing worth keeping.
    pub fn bookmark(&self) -> Option<Bookmark> {
        self.root
            .as_ref()
            .filter(|r| r.mode == AccessMode::ReadWrite)
            .map(|r| r.token.bookmark())
    }

    /// Restores a root from a previous run.
    ///
    /// The bookmark is tried first and renewed if stale. Without a usable
    /// bookmark, `last_path` is accepted in read-only mode.
    pub fn resolve_root(
        &mut self,
        bookmark: Option<&Bookmark>,
        last_path: Option<&Path>,
    ) -> Result<PathBuf> {
        if let Some(bookmark) = bookmark {
            match self.resolve_bookmark(bookmark) {
                Ok(token) => {
                    let path = token.path().to_path_buf();
                    tracing::info!("Resolved storage root {}", path.display());
                    self.root = Some(ActiveRoot {
                        token,
                        mode: AccessMode::ReadWrite,
                    });
                    return Ok(path);
                }
                Err(e) => tracing::warn!(
                    "Bookmark for {} is unusable: {}",
                    bookmark.path.display(),
                    e
                ),
            }
        }

        let Some(path) = last_path else {
            return Err(WordTaggerError::NoRootSelected);
        };
        let path = normalize_path(path);
        refuse_protected(&path)?;
        if !path.is_dir() {
            return Err(WordTaggerError::InvalidPath(format!(
                "{} no longer exists",
                path.display()
            )));
        }
        tracing::warn!(
            "Using {} read-only until it is selected again",
            path.display()
        );
        self.root = Some(ActiveRoot {
            token: Arc::new(PathToken::new(Bookmark::new(&path))),
            mode: AccessMode::ReadOnly,
        });
        Ok(path)
    }

    fn resolve_bookmark(&self, bookmark: &Bookmark) -> Result<Arc<dyn AccessToken>> {
        refuse_protected(&bookmark.path)?;
        let mut token = self.grantor.resolve(bookmark)?;
        if token.is_stale() {
            token = self.grantor.renew(token.as_ref())?;
        }
        self.verify_access(token)
    }

    /// Grants `path` as a root: never for protected locations, otherwise only
    /// if a trial write succeeds.
    pub fn ensure_access(&self, path: &Path) -> Result<Arc<dyn AccessToken>> {
        refuse_protected(path)?;
        let token = self.grantor.grant(path)?;
        self.verify_access(token)
    }

    /// The checks every token passes before it becomes the root.
    fn verify_access(&self, mut token: Arc<dyn AccessToken>) -> Result<Arc<dyn AccessToken>> {
        refuse_protected(token.path())?;
        if !self.probe_with_retry(&mut token) {
            return Err(WordTaggerError::AccessDenied(format!(
                "cannot write to {}",
                token.path().display()
            )));
        }
        Ok(token)
    }

    /// Trial write, retried once with a renewed token.
    fn probe_with_retry(&self, token: &mut Arc<dyn AccessToken>) -> bool {
        if probe(token.as_ref()) {
            return true;
        }
        match self.grantor.renew(token.as_ref()) {
            Ok(renewed) if probe(renewed.as_ref()) => {
                tracing::debug!("Renewed access to {}", renewed.path().display());
                *token = renewed;
                true
            }
            _ => false,
        }
    }

    /// Creates the directory structure and config file. Safe to call repeatedly.
    pub fn initialize_layout(root: &Path) -> Result<()> {
        for dir in LAYOUT_DIRS {
            fs::create_dir_all(root.join(dir))?;
        }
        let config_path = root.join(CONFIG_FILENAME);
        if !config_path.exists() {
            write_json_atomic(&config_path, &DataConfig::default())?;
            tracing::debug!("Created {}", config_path.display());
        }
        Ok(())
    }

    /// Backup files under the current root, newest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let token = self.readable_token()?;
        with_access(token.as_ref(), |root| {
            Ok(list_backups(&root.join(BACKUP_DIR))?
                .into_iter()
                .map(|(path, _)| path)
                .collect())
        })
    }

    fn readable_token(&self) -> Result<Arc<dyn AccessToken>> {
        let active = self.root.as_ref().ok_or(WordTaggerError::NoRootSelected)?;
        refuse_protected(active.token.path())?;
        Ok(Arc::clone(&active.token))
    }

    /// Token for a write, renewed in place when it went stale.
    fn writable_token(&mut self) -> Result<Arc<dyn AccessToken>> {
        let token = self.readable_token()?;
        let active = self.root.as_mut().ok_or(WordTaggerError::NoRootSelected)?;
        if active.mode == AccessMode::ReadOnly {
            return Err(WordTaggerError::AccessDenied(format!(
                "{} is read-only until selected again",
                token.path().display()
            )));
        }
        if token.is_stale() {
            let renewed = self.grantor.renew(token.as_ref())?;
            if renewed.is_stale() {
                return Err(WordTaggerError::AccessDenied(format!(
                    "access to {} has expired",
                    token.path().display()
                )));
            }
            active.token = Arc::clone(&renewed);
            return Ok(renewed);
        }
        Ok(token)
    }

    fn write_backup(&self, root: &Path, envelope: &BackupEnvelope) -> Result<PathBuf> {
        let dir = root.join(BACKUP_DIR);
        fs::create_dir_all(&dir)?;

        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut path = dir.join(format!("backup_{}.json", stamp));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("backup_{}_{:03}.json", stamp, n));
            n += 1;
        }
        write_json_atomic(&path, envelope)?;
        Ok(path)
    }

    fn prune_backups(&self, root: &Path) -> Result<usize> {
        let backups = list_backups(&root.join(BACKUP_DIR))?;
        let mut pruned = 0;
        for (path, _) in backups.into_iter().skip(self.backup_retention) {
            match fs::remove_file(&path) {
                Ok(()) => pruned += 1,
                Err(e) => tracing::warn!("Could not prune {}: {}", path.display(), e),
            }
        }
        Ok(pruned)
    }
}

impl Persistence for FsGateway {
    fn current_root(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.token.path().to_path_buf())
    }

    fn access_mode(&self) -> Option<AccessMode> {
        self.root.as_ref().map(|r| r.mode)
    }

    fn select_root(&mut self, path: &Path) -> Result<()> {
        let token = self.ensure_access(path).inspect_err(|e| {
            tracing::warn!("Access to {} refused: {}", path.display(), e);
        })?;
        with_access(token.as_ref(), Self::initialize_layout)?;

        tracing::info!("Selected storage root {}", token.path().display());
        self.root = Some(ActiveRoot {
            token,
            mode: AccessMode::ReadWrite,
        });
        Ok(())
    }

    fn clear_root(&mut self) {
        if let Some(active) = self.root.take() {
            tracing::info!("Cleared storage root {}", active.token.path().display());
        }
    }

    fn mark_read_only(&mut self) {
        if let Some(active) = self.root.as_mut() {
            tracing::warn!(
                "{} is read-only until selected again",
                active.token.path().display()
            );
            active.mode = AccessMode::ReadOnly;
        }
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<SaveReport> {
        let token = self.writable_token()?;
        let saved_at = Utc::now();

        let (backup, pruned) = with_access(token.as_ref(), |root| {
            Self::initialize_layout(root)?;

            let config_path = root.join(CONFIG_FILENAME);
            let mut config = match read_json::<DataConfig>(&config_path) {
                Ok(Some(config)) => config,
                Ok(None) => DataConfig::default(),
                Err(e) => {
                    tracing::warn!("Replacing unreadable config: {}", e);
                    DataConfig::default()
                }
            };
            config.updated_at = saved_at;

            let metadata = snapshot.metadata(Some(saved_at));
            let envelope = BackupEnvelope {
                config: config.clone(),
                layers: snapshot.layers.clone(),
                nodes: snapshot.nodes.clone(),
                metadata: metadata.clone(),
                tag_mappings: snapshot.tag_mappings.clone(),
            };

            // Backup and prune first so a failed live write stays recoverable.
            let backup = self.write_backup(root, &envelope)?;
            let pruned = self.prune_backups(root)?;

            write_json_atomic(&root.join(LAYERS_FILE), &snapshot.layers)?;
            write_json_atomic(&root.join(NODES_FILE), &snapshot.nodes)?;
            write_json_atomic(&root.join(TAG_MAPPINGS_FILE), &snapshot.tag_mappings)?;
            write_json_atomic(&root.join(METADATA_FILE), &metadata)?;
            write_json_atomic(&config_path, &config)?;
            Ok((backup, pruned))
        })?;

        tracing::info!(
            "Saved {} layers, {} nodes to {}",
            snapshot.layers.len(),
            snapshot.nodes.len(),
            token.path().display()
        );
        if pruned > 0 {
            tracing::debug!("Pruned {} old backups", pruned);
        }

        Ok(SaveReport {
            root: token.path().to_path_buf(),
            backup: Some(backup),
            pruned_backups: pruned,
            saved_at,
        })
    }

    fn load(&mut self) -> Result<LoadedData> {
        let token = self.readable_token()?;
        let data = with_access(token.as_ref(), |root| {
            Ok(LoadedData {
                layers: read_json::<Vec<Layer>>(&root.join(LAYERS_FILE))?.unwrap_or_default(),
                nodes: read_json::<Vec<Node>>(&root.join(NODES_FILE))?.unwrap_or_default(),
                tag_mappings: read_json::<Vec<TagMapping>>(&root.join(TAG_MAPPINGS_FILE))?,
            })
        })?;
        tracing::info!(
            "Loaded {} layers, {} nodes from {}",
            data.layers.len(),
            data.nodes.len(),
            token.path().display()
        );
        Ok(data)
    }

    fn clear_data(&mut self) -> Result<()> {
        let token = self.writable_token()?;
        with_access(token.as_ref(), |root| {
            for file in [LAYERS_FILE, NODES_FILE, TAG_MAPPINGS_FILE, METADATA_FILE] {
                let path = root.join(file);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            let backups = root.join(BACKUP_DIR);
            if backups.exists() {
                fs::remove_dir_all(&backups)?;
            }
            Self::initialize_layout(root)
        })?;
        tracing::info!("Cleared all data under {}", token.path().display());
        Ok(())
    }
}

fn refuse_protected(path: &Path) -> Result<()> {
    if is_sensitive_path(path) {
        return Err(WordTaggerError::AccessDenied(format!(
            "{} is a protected system location",
            path.display()
        )));
    }
    Ok(())
}

/// Creates and removes a sentinel file inside an access window.
fn probe(token: &dyn AccessToken) -> bool {
    let outcome = with_access(token, |root| {
        let sentinel = root.join(ACCESS_SENTINEL);
        fs::write(&sentinel, b"ok")?;
        fs::remove_file(&sentinel)?;
        Ok(())
    });
    if let Err(e) = &outcome {
        tracing::debug!("Trial write to {} failed: {}", token.path().display(), e);
    }
    outcome.is_ok()
}

/// `None` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|source| {
        WordTaggerError::CorruptedData {
            file: path.to_path_buf(),
            source,
        }
    })?;
    Ok(Some(value))
}

/// Writes to `.<stem>-<uuid>.tmp` beside the target, then renames over it.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| WordTaggerError::InvalidPath(path.display().to_string()))?;
    fs::create_dir_all(dir)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data");
    let content = to_sorted_json(value)?;
    let tmp = dir.join(format!(".{}-{}.tmp", stem, Uuid::new_v4()));
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// `*.json` files in `dir`, newest first by creation time (file name breaks ties).
fn list_backups(dir: &Path) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let meta = fs::metadata(&path)?;
        let created: DateTime<Utc> = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        backups.push((path, created));
    }
    backups.sort_by(|(a_path, a_time), (b_path, b_time)| {
        b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
    });
    Ok(backups)
}

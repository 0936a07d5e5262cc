//! # Storage Layer
//!
//! This module defines the persistence seam for wordtagger. The in-memory
//! store is authoritative; a [`Persistence`] implementation only serializes
//! snapshots it is handed and hands back what it finds on disk. It never
//! mutates entities.
//!
//! ## Implementations
//!
//! - [`fs_gateway::FsGateway`]: production, file-backed storage under a
//!   user-chosen root directory, guarded by an access token.
//! - [`mem_backend::MemBackend`]: in-memory storage for testing. Records every
//!   operation so ordering guarantees can be asserted.
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! ├── wordtagger-config.json
//! ├── data/
//! │   ├── layers/layers.json          # array<Layer>
//! │   ├── nodes/nodes.json            # array<Node>
//! │   ├── tags/tag-mappings.json      # array<TagMapping>
//! │   └── metadata/metadata.json      # aggregate counts
//! └── backups/
//!     └── backup_<YYYY-MM-DD_HH-mm-ss>.json
//! ```
//!
//! Every save overwrites the live files wholesale. Before they are replaced a
//! full backup envelope is written and the backup directory is pruned, so a
//! failed live write still leaves a recoverable copy.
//!
//! ## Concurrency
//!
//! Implementations are driven from behind a mutex by the sync scheduler and
//! the store; `save` and `load` never overlap for one root.

use crate::error::Result;
use crate::model::{Layer, Node, Snapshot, TagMapping};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub mod access;
pub mod fs_gateway;
pub mod mem_backend;

pub use access::AccessMode;

pub const CONFIG_FILENAME: &str = "wordtagger-config.json";
pub const LAYERS_FILE: &str = "data/layers/layers.json";
pub const NODES_FILE: &str = "data/nodes/nodes.json";
pub const TAG_MAPPINGS_FILE: &str = "data/tags/tag-mappings.json";
pub const METADATA_FILE: &str = "data/metadata/metadata.json";
pub const BACKUP_DIR: &str = "backups";
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

/// Subdirectories created under every root.
pub const LAYOUT_DIRS: [&str; 5] = [
    "data/layers",
    "data/nodes",
    "data/tags",
    "data/metadata",
    BACKUP_DIR,
];

/// What a load found on disk. Missing files come back empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedData {
    pub layers: Vec<Layer>,
    pub nodes: Vec<Node>,
    /// `None` when no mapping file exists yet.
    pub tag_mappings: Option<Vec<TagMapping>>,
}

impl LoadedData {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub root: PathBuf,
    pub backup: Option<PathBuf>,
    pub pruned_backups: usize,
    pub saved_at: DateTime<Utc>,
}

/// Abstract interface for external storage.
pub trait Persistence: Send {
    /// Root currently in use, if any.
    fn current_root(&self) -> Option<PathBuf>;

    /// `None` when no root is selected.
    fn access_mode(&self) -> Option<AccessMode>;

    /// Grants access to `path`, verifies it and prepares the directory layout.
    fn select_root(&mut self, path: &Path) -> Result<()>;

    /// Forgets the current root. Later saves fail with `NoRootSelected`.
    fn clear_root(&mut self);

    /// Refuses writes to the current root until it is selected again.
    fn mark_read_only(&mut self);

    /// Writes `snapshot` to the current root.
    fn save(&mut self, snapshot: &Snapshot) -> Result<SaveReport>;

    /// Reads the current root.
    fn load(&mut self) -> Result<LoadedData>;

    /// Removes all live data and backups under the current root.
    fn clear_data(&mut self) -> Result<()>;
}

/// Pretty JSON with object keys in sorted order, for stable diffs.
pub fn to_sorted_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&value)
}

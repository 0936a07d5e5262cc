use super::access::{is_sensitive_path, AccessMode};
use super::{LoadedData, Persistence, SaveReport};
use crate::error::{Result, WordTaggerError};
use crate::model::Snapshot;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One call made against a [`MemBackend`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemOp {
    SelectRoot(PathBuf),
    ClearRoot,
    Save { root: PathBuf, nodes: usize },
    Load(PathBuf),
    ClearData(PathBuf),
}

/// In-memory persistence for testing.
///
/// Keeps one snapshot per root and records every operation so tests can
/// assert on ordering, e.g. that the old root was saved before the new one
/// was read. It is driven from behind the store's mutex, so plain fields
/// are enough.
#[derive(Debug, Default)]
pub struct MemBackend {
    roots: HashMap<PathBuf, Snapshot>,
    current: Option<PathBuf>,
    read_only: bool,
    ops: Vec<MemOp>,
    save_delay: Option<Duration>,
    simulate_write_error: bool,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save take at least `delay`, to hold a save in flight.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    /// Pre-populates `root` as if it had been saved earlier.
    pub fn with_data(mut self, root: impl Into<PathBuf>, snapshot: Snapshot) -> Self {
        self.roots.insert(root.into(), snapshot);
        self
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&mut self, simulate: bool) {
        self.simulate_write_error = simulate;
    }

    pub fn ops(&self) -> &[MemOp] {
        &self.ops
    }

    pub fn save_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, MemOp::Save { .. }))
            .count()
    }

    pub fn stored(&self, root: &Path) -> Option<&Snapshot> {
        self.roots.get(root)
    }

    fn root(&self) -> Result<PathBuf> {
        self.current.clone().ok_or(WordTaggerError::NoRootSelected)
    }
}

impl Persistence for MemBackend {
    fn current_root(&self) -> Option<PathBuf> {
        self.current.clone()
    }

    fn access_mode(&self) -> Option<AccessMode> {
        self.current.as_ref().map(|_| {
            if self.read_only {
                AccessMode::ReadOnly
            } else {
                AccessMode::ReadWrite
            }
        })
    }

    fn select_root(&mut self, path: &Path) -> Result<()> {
        if is_sensitive_path(path) {
            return Err(WordTaggerError::AccessDenied(path.display().to_string()));
        }
        self.ops.push(MemOp::SelectRoot(path.to_path_buf()));
        self.current = Some(path.to_path_buf());
        self.read_only = false;
        Ok(())
    }

    fn clear_root(&mut self) {
        self.ops.push(MemOp::ClearRoot);
        self.current = None;
    }

    fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<SaveReport> {
        let root = self.root()?;
        if self.read_only {
            return Err(WordTaggerError::AccessDenied(root.display().to_string()));
        }
        if self.simulate_write_error {
            return Err(WordTaggerError::Io(std::io::Error::other(
                "Simulated write error",
            )));
        }
        if let Some(delay) = self.save_delay {
            std::thread::sleep(delay);
        }
        self.ops.push(MemOp::Save {
            root: root.clone(),
            nodes: snapshot.nodes.len(),
        });
        self.roots.insert(root.clone(), snapshot.clone());
        Ok(SaveReport {
            root,
            backup: None,
            pruned_backups: 0,
            saved_at: Utc::now(),
        })
    }

    fn load(&mut self) -> Result<LoadedData> {
        let root = self.root()?;
        self.ops.push(MemOp::Load(root.clone()));
        Ok(match self.roots.get(&root) {
            Some(snapshot) => LoadedData {
                layers: snapshot.layers.clone(),
                nodes: snapshot.nodes.clone(),
                tag_mappings: Some(snapshot.tag_mappings.clone()),
            },
            None => LoadedData::default(),
        })
    }

    fn clear_data(&mut self) -> Result<()> {
        let root = self.root()?;
        if self.read_only {
            return Err(WordTaggerError::AccessDenied(root.display().to_string()));
        }
        self.ops.push(MemOp::ClearData(root.clone()));
        self.roots.remove(&root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, Node};

    #[test]
    fn saves_are_kept_per_root() {
        let mut backend = MemBackend::new();
        backend.select_root(Path::new("/data/a")).unwrap();
        backend
            .save(&Snapshot {
                layers: vec![Layer::seed()],
                nodes: vec![Node::new("cat")],
                tag_mappings: vec![],
            })
            .unwrap();
        backend.select_root(Path::new("/data/b")).unwrap();
        assert!(backend.load().unwrap().is_empty());

        assert_eq!(backend.stored(Path::new("/data/a")).unwrap().nodes.len(), 1);
        assert_eq!(backend.save_count(), 1);
        assert_eq!(
            backend.ops().last(),
            Some(&MemOp::Load(PathBuf::from("/data/b")))
        );
    }

    #[test]
    fn simulated_errors_leave_nothing_behind() {
        let mut backend = MemBackend::new();
        backend.select_root(Path::new("/data/a")).unwrap();
        backend.set_simulate_write_error(true);
        assert!(backend.save(&Snapshot::default()).is_err());
        assert_eq!(backend.save_count(), 0);
        assert!(backend.stored(Path::new("/data/a")).is_none());
    }

    #[test]
    fn read_only_lasts_until_reselected() {
        let mut backend = MemBackend::new();
        backend.select_root(Path::new("/data/a")).unwrap();
        backend.mark_read_only();
        assert_eq!(backend.access_mode(), Some(AccessMode::ReadOnly));
        assert!(matches!(
            backend.save(&Snapshot::default()),
            Err(WordTaggerError::AccessDenied(_))
        ));

        backend.select_root(Path::new("/data/a")).unwrap();
        assert!(backend.save(&Snapshot::default()).is_ok());
    }

    #[test]
    fn refuses_protected_roots() {
        let mut backend = MemBackend::new();
        assert!(backend.select_root(Path::new("/System/Library")).is_err());
        assert!(backend.current_root().is_none());
    }
}

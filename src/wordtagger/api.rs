//! # API Facade
//!
//! [`WordTagger`] is the store: the single owner of the in-memory [`Library`]
//! and the entry point for every operation, whatever UI drives it.
//!
//! ## Role and Responsibilities
//!
//! The facade:
//! - **Serializes mutations**: each one runs under the library's write lock,
//!   dispatching to `commands/*.rs`
//! - **Publishes events**: a mutation that changed something emits
//!   [`StoreEvent::Changed`] before the lock is released, so subscribers see
//!   changes in the order they happened
//! - **Owns the sync engine**: a [`SyncScheduler`] subscribed to those events
//!   persists them, debounced, through the [`Persistence`] gateway
//! - **Coordinates roots**: switching roots drains pending writes to the old
//!   root before anything is read from the new one
//!
//! ## Failure Model
//!
//! In-memory mutations succeed or fail on their own merits. Persistence
//! failures never surface from them; they are recorded in the sync state
//! (`last_error`, `SyncStatus::Failed`) and the next change retries. Only the
//! explicit root and force operations return persistence errors directly.
//!
//! ## Generic Over Persistence
//!
//! `WordTagger<P: Persistence>` is generic over the storage backend:
//! - Production: `WordTagger<FsGateway>`
//! - Testing: `WordTagger<MemBackend>`

use crate::commands::nodes::{NewNode, NodeUpdate};
use crate::commands::{self, CmdResult, Library};
use crate::config::SyncConfig;
use crate::error::{Result, WordTaggerError};
use crate::events::{ChangeKind, EventBus, StoreEvent, SubscriptionId};
use crate::model::{Layer, Node, Snapshot, Tag, TagKind};
use crate::search::{self, SearchHit, DEFAULT_MAX_RESULTS};
use crate::store::{AccessMode, Persistence, SaveReport};
use crate::sync::{SyncScheduler, SyncState, SyncStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// Read-only view of the store's sync situation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub current_root: Option<PathBuf>,
    pub access_mode: Option<AccessMode>,
    pub is_syncing: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub layers: usize,
    pub nodes: usize,
}

pub struct WordTagger<P: Persistence + 'static> {
    library: Arc<RwLock<Library>>,
    bus: EventBus,
    gateway: Arc<Mutex<P>>,
    scheduler: SyncScheduler,
    sync_state: Arc<Mutex<SyncState>>,
    loading: AtomicBool,
    config: SyncConfig,
    max_results: usize,
}

impl<P: Persistence + 'static> WordTagger<P> {
    /// Builds a store over `gateway`, starting from the default data.
    ///
    /// Nothing is read from the gateway yet; call [`Self::force_reload`] when
    /// it already points at a root.
    pub fn new(gateway: P, config: SyncConfig) -> Result<Self> {
        let mut library = Library::default();
        library.seed_defaults();
        let library = Arc::new(RwLock::new(library));

        let bus = EventBus::new();
        let gateway = Arc::new(Mutex::new(gateway));
        let sync_state = Arc::new(Mutex::new(SyncState::default()));

        let source = Arc::clone(&library);
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&gateway),
            move || source.read().snapshot(),
            &bus,
            config,
            Arc::clone(&sync_state),
        )?;

        Ok(Self {
            library,
            bus,
            gateway,
            scheduler,
            sync_state,
            loading: AtomicBool::new(false),
            config,
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn gateway(&self) -> &Arc<Mutex<P>> {
        &self.gateway
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    pub fn observe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        self.bus.observe(callback)
    }

    fn mutate<F>(&self, op: F) -> Result<CmdResult>
    where
        F: FnOnce(&mut Library) -> Result<CmdResult>,
    {
        let mut library = self.library.write();
        let result = op(&mut library)?;
        if let Some(kind) = result.changed {
            self.bus.publish(StoreEvent::Changed(kind));
        }
        Ok(result)
    }

    fn query<R>(&self, op: impl FnOnce(&Library) -> R) -> R {
        op(&self.library.read())
    }

    // --- nodes ---

    pub fn add_node(&self, new: NewNode) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::add(lib, new))
    }

    pub fn update_node(&self, id: Uuid, changes: NodeUpdate) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::update(lib, id, changes))
    }

    pub fn delete_node(&self, id: Uuid) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::delete(lib, id))
    }

    pub fn add_tag(&self, id: Uuid, tag: Tag) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::add_tag(lib, id, tag))
    }

    pub fn remove_tag(&self, id: Uuid, kind: &TagKind, value: &str) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::remove_tag(lib, id, kind, value))
    }

    pub fn set_tags(&self, id: Uuid, tags: Vec<Tag>) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::set_tags(lib, id, tags))
    }

    pub fn move_node_to_layer(&self, id: Uuid, layer_id: Uuid) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::move_to_layer(lib, id, layer_id))
    }

    pub fn apply_tag_line(&self, id: Uuid, line: &str) -> Result<CmdResult> {
        self.mutate(|lib| commands::nodes::apply_tag_line(lib, id, line))
    }

    /// Applies a tag line to whichever entry its leading tokens name.
    pub fn apply_tag_line_by_text(&self, line: &str) -> Result<CmdResult> {
        self.mutate(|lib| {
            let id = commands::nodes::find_line_target(lib, line).ok_or_else(|| {
                WordTaggerError::InvalidInput(format!("no entry matches '{}'", line.trim()))
            })?;
            commands::nodes::apply_tag_line(lib, id, line)
        })
    }

    pub fn list_nodes(&self, layer_id: Option<Uuid>) -> Result<CmdResult> {
        self.query(|lib| commands::nodes::list(lib, layer_id))
    }

    pub fn node(&self, id: Uuid) -> Result<Node> {
        self.query(|lib| lib.node(id).cloned())
    }

    pub fn find_node(&self, text: &str) -> Option<Node> {
        self.query(|lib| lib.node_by_text(text).cloned())
    }

    // --- layers ---

    pub fn add_layer(
        &self,
        name: &str,
        display_name: Option<&str>,
        color: Option<&str>,
    ) -> Result<CmdResult> {
        self.mutate(|lib| commands::layers::add(lib, name, display_name, color))
    }

    pub fn rename_layer(&self, id: Uuid, display_name: &str) -> Result<CmdResult> {
        self.mutate(|lib| commands::layers::rename(lib, id, display_name))
    }

    pub fn activate_layer(&self, id: Uuid) -> Result<CmdResult> {
        self.mutate(|lib| commands::layers::activate(lib, id))
    }

    pub fn delete_layer(&self, id: Uuid) -> Result<CmdResult> {
        self.mutate(|lib| commands::layers::delete(lib, id))
    }

    pub fn repair_orphans(&self) -> Result<CmdResult> {
        self.mutate(commands::layers::repair_orphans)
    }

    pub fn list_layers(&self) -> Result<CmdResult> {
        self.query(commands::layers::list)
    }

    pub fn find_layer(&self, key: &str) -> Result<Layer> {
        self.query(|lib| lib.find_layer(key).cloned())
    }

    pub fn active_layer(&self) -> Option<Layer> {
        self.query(|lib| lib.active_layer().cloned())
    }

    // --- tag mappings ---

    pub fn add_mapping(&self, key: &str, display_name: &str) -> Result<CmdResult> {
        self.mutate(|lib| commands::mappings::add(lib, key, display_name))
    }

    pub fn remove_mapping(&self, key: &str) -> Result<CmdResult> {
        self.mutate(|lib| commands::mappings::remove(lib, key))
    }

    pub fn reset_mappings(&self) -> Result<CmdResult> {
        self.mutate(commands::mappings::reset)
    }

    pub fn list_mappings(&self) -> Result<CmdResult> {
        self.query(commands::mappings::list)
    }

    pub fn display_name(&self, kind: &TagKind) -> String {
        self.query(|lib| lib.registry.display_name(kind))
    }

    /// Builds one tag from a kind token and its whole value, without touching
    /// any entry. Words in the value are never read as kind tokens.
    pub fn build_tag(&self, kind_token: &str, value: &str) -> Result<Tag> {
        self.query(|lib| {
            let kind = lib.registry.resolve(kind_token.trim()).ok_or_else(|| {
                WordTaggerError::InvalidInput(format!("unknown tag kind '{}'", kind_token.trim()))
            })?;
            crate::tag_line::build_tag(kind, value, &lib.known_locations()).ok_or_else(|| {
                WordTaggerError::InvalidInput(format!("tag '{}' has no value", kind_token.trim()))
            })
        })
    }

    /// Resolves a kind token (key or alias) against the registry.
    pub fn resolve_kind(&self, token: &str) -> Option<TagKind> {
        self.query(|lib| lib.registry.resolve(token.trim()))
    }

    // --- search ---

    /// Ranked matches for `query`, capped at the configured maximum.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let mut hits = self.query(|lib| search::rank(&lib.nodes, query));
        hits.truncate(self.max_results);
        hits
    }

    /// Ranks on a worker thread over a copy of the current nodes.
    pub fn spawn_search(&self, query: &str) -> JoinHandle<Vec<SearchHit>> {
        let nodes = self.query(|lib| lib.nodes.clone());
        let query = query.to_string();
        let max_results = self.max_results;
        std::thread::spawn(move || {
            let mut hits = search::rank(&nodes, &query);
            hits.truncate(max_results);
            hits
        })
    }

    /// Tags worth suggesting for `query`, scoped to the active layer if any.
    pub fn relevant_tags(&self, query: &str) -> Vec<Tag> {
        self.query(|lib| {
            let layer = lib.active_layer().map(|l| l.id);
            search::relevant_tags(&lib.nodes, query, layer)
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.query(Library::snapshot)
    }

    // --- roots and persistence ---

    pub fn select_root(&self, path: &Path) -> Result<()> {
        self.change_root(Some(path))
    }

    /// Detaches from the current root. The in-memory data stays.
    pub fn clear_root(&self) -> Result<()> {
        self.change_root(None)
    }

    /// Switches to `to`: pending changes go to the old root first, then the
    /// new root is loaded.
    ///
    /// Every wait is bounded by the flush timeout. When the gateway is still
    /// busy after that, the switch is refused and the old root stays current.
    pub fn change_root(&self, to: Option<&Path>) -> Result<()> {
        let from = match self.lock_gateway_within(self.config.flush_timeout) {
            Ok(gateway) => gateway.current_root(),
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };
        tracing::info!("Switching storage root {:?} -> {:?}", from, to);
        self.bus.publish(StoreEvent::RootWillChange {
            from: from.clone(),
            to: to.map(Path::to_path_buf),
        });

        if from.is_some() {
            if let Err(e) = self.scheduler.flush(self.config.flush_timeout) {
                tracing::warn!("Pending save to the old root was abandoned: {}", e);
                self.record_failure(&e);
            }
        }

        let mut gateway = match self.lock_gateway_within(self.config.flush_timeout) {
            Ok(gateway) => gateway,
            Err(e) => {
                tracing::warn!("Keeping {:?}: {}", from, e);
                self.record_failure(&e);
                return Err(e);
            }
        };

        let Some(path) = to else {
            gateway.clear_root();
            drop(gateway);
            self.bus.publish(StoreEvent::RootChanged(None));
            return Ok(());
        };

        let selected = gateway.select_root(path).map(|_| gateway.current_root());
        drop(gateway);
        let root = match selected {
            Ok(root) => root,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };
        self.bus.publish(StoreEvent::RootChanged(root));
        self.force_reload()
    }

    /// Saves the current state immediately, bypassing the debounce.
    pub fn force_save(&self) -> Result<SaveReport> {
        let mut gateway = self.gateway.lock();
        let snapshot = self.snapshot();
        self.sync_state.lock().begin();
        let outcome = gateway.save(&snapshot);
        drop(gateway);
        self.sync_state.lock().finish(&outcome);
        outcome
    }

    /// Replaces the in-memory state with what the current root holds.
    /// An empty root is seeded with the default layer, which is then saved.
    ///
    /// If the root cannot be read, memory keeps its previous contents and the
    /// root is demoted to read-only so they are never written over its files.
    pub fn force_reload(&self) -> Result<()> {
        self.loading.store(true, Ordering::SeqCst);
        self.bus.publish(StoreEvent::LoadingStarted);

        self.sync_state.lock().begin();
        let outcome = self.gateway.lock().load();
        self.sync_state.lock().finish(&outcome);

        let seeded = outcome.map(|data| {
            let mut library = self.library.write();
            *library = Library::from_loaded(data);
            library.seed_defaults()
        });

        self.loading.store(false, Ordering::SeqCst);
        self.bus.publish(StoreEvent::LoadingFinished);

        match seeded {
            Ok(true) => {
                tracing::info!("Seeded default layer");
                self.bus.publish(StoreEvent::Changed(ChangeKind::Seeded));
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                tracing::error!("Reload failed: {}", e);
                let mut gateway = self.gateway.lock();
                if gateway.current_root().is_some() {
                    gateway.mark_read_only();
                }
                Err(e)
            }
        }
    }

    /// Wipes memory and the current root (live files and backups), then
    /// reseeds the defaults.
    pub fn clear_all_data(&self) -> Result<()> {
        self.loading.store(true, Ordering::SeqCst);
        self.bus.publish(StoreEvent::LoadingStarted);

        let cleared = {
            let mut gateway = self.gateway.lock();
            match gateway.current_root() {
                Some(_) => gateway.clear_data(),
                None => Ok(()),
            }
        };
        if cleared.is_ok() {
            let mut library = self.library.write();
            *library = Library::default();
            library.seed_defaults();
        }

        self.loading.store(false, Ordering::SeqCst);
        self.bus.publish(StoreEvent::LoadingFinished);

        match cleared {
            Ok(()) => {
                tracing::info!("Cleared all data");
                self.bus.publish(StoreEvent::Changed(ChangeKind::Cleared));
                Ok(())
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    pub fn status(&self) -> StoreStatus {
        let (current_root, access_mode) = {
            let gateway = self.gateway.lock();
            (gateway.current_root(), gateway.access_mode())
        };
        let state = self.sync_state.lock().clone();
        let (layers, nodes) = self.query(|lib| (lib.layers.len(), lib.nodes.len()));
        StoreStatus {
            current_root,
            access_mode,
            is_syncing: state.is_syncing,
            is_loading: self.loading.load(Ordering::SeqCst),
            last_error: state.last_error,
            last_sync_time: state.last_sync_time,
            sync_status: state.status,
            layers,
            nodes,
        }
    }

    /// Flushes pending changes and stops the sync worker. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }

    fn lock_gateway_within(&self, timeout: Duration) -> Result<MutexGuard<'_, P>> {
        self.gateway.try_lock_for(timeout).ok_or_else(|| {
            WordTaggerError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "storage is busy with a pending save",
            ))
        })
    }

    fn record_failure(&self, error: &WordTaggerError) {
        let mut state = self.sync_state.lock();
        state.status = SyncStatus::Failed(error.reason());
        state.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem_backend::{MemBackend, MemOp};

    fn config() -> SyncConfig {
        SyncConfig {
            debounce: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(1),
        }
    }

    fn store() -> WordTagger<MemBackend> {
        WordTagger::new(MemBackend::new(), config()).unwrap()
    }

    #[test]
    fn test_new_store_has_default_layer() {
        let store = store();
        let layer = store.active_layer().unwrap();
        assert_eq!(layer.name, "default");
        assert_eq!(store.status().current_root, None);
    }

    #[test]
    fn test_mutations_publish_in_order() {
        let store = store();
        let rx = store.subscribe();
        store.add_node(NewNode::new("cat")).unwrap();
        store.add_layer("extra", None, None).unwrap();
        assert!(store.add_node(NewNode::new("cat")).is_err());

        let events: Vec<StoreEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                StoreEvent::Changed(ChangeKind::Nodes),
                StoreEvent::Changed(ChangeKind::Layers),
            ]
        );
    }

    #[test]
    fn test_select_root_loads_and_seeds() {
        let store = store();
        let rx = store.subscribe();
        store.select_root(Path::new("/roots/a")).unwrap();

        let events: Vec<StoreEvent> = rx.try_iter().collect();
        assert!(events.contains(&StoreEvent::LoadingStarted));
        assert_eq!(
            events.last(),
            Some(&StoreEvent::Changed(ChangeKind::Seeded))
        );
        assert_eq!(store.status().current_root, Some(PathBuf::from("/roots/a")));
    }

    #[test]
    fn test_force_save_and_reload_round_trip() {
        let store = store();
        store.select_root(Path::new("/roots/a")).unwrap();
        store.add_node(NewNode::new("cat")).unwrap();
        store.force_save().unwrap();

        store.add_node(NewNode::new("unsaved")).unwrap();
        store.force_reload().unwrap();
        assert!(store.find_node("cat").is_some());
        assert!(store.find_node("unsaved").is_none());
        assert_eq!(store.status().sync_status, SyncStatus::Success);
    }

    #[test]
    fn test_search_is_capped() {
        let store = store().with_max_results(2);
        for word in ["spectacle", "spectator", "spectrum"] {
            store.add_node(NewNode::new(word)).unwrap();
        }
        assert_eq!(store.search("spect").len(), 2);
        assert_eq!(store.spawn_search("spect").join().unwrap().len(), 2);
    }

    #[test]
    fn test_save_failures_do_not_break_mutations() {
        let store = store();
        store.select_root(Path::new("/roots/a")).unwrap();
        store.gateway().lock().set_simulate_write_error(true);

        assert!(store.add_node(NewNode::new("cat")).is_ok());
        assert!(store.force_save().is_err());
        let status = store.status();
        assert!(matches!(status.sync_status, SyncStatus::Failed(_)));
        assert!(status.last_error.is_some());
        assert_eq!(status.nodes, 1);
    }

    #[test]
    fn test_root_switch_saves_old_root_before_reading_new() {
        let store = store();
        store.select_root(Path::new("/roots/a")).unwrap();
        store.add_node(NewNode::new("pending")).unwrap();
        store.select_root(Path::new("/roots/b")).unwrap();

        let gateway = store.gateway().lock();
        let ops = gateway.ops();
        let saved_a = ops
            .iter()
            .position(|op| {
                op == &MemOp::Save {
                    root: PathBuf::from("/roots/a"),
                    nodes: 1,
                }
            })
            .unwrap();
        let loaded_b = ops
            .iter()
            .position(|op| op == &MemOp::Load(PathBuf::from("/roots/b")))
            .unwrap();
        assert!(saved_a < loaded_b);
    }

    #[test]
    fn test_clear_root_keeps_memory() {
        let store = store();
        store.select_root(Path::new("/roots/a")).unwrap();
        store.add_node(NewNode::new("cat")).unwrap();
        store.clear_root().unwrap();

        assert!(store.find_node("cat").is_some());
        assert!(matches!(
            store.force_save(),
            Err(WordTaggerError::NoRootSelected)
        ));
        assert_eq!(
            store.gateway().lock().stored(Path::new("/roots/a")).unwrap().nodes.len(),
            1
        );
    }

    #[test]
    fn test_clear_all_data_reseeds() {
        let store = store();
        store.select_root(Path::new("/roots/a")).unwrap();
        store.add_node(NewNode::new("cat")).unwrap();
        store.add_mapping("pun", "Pun").unwrap();
        store.clear_all_data().unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.nodes.is_empty());
        assert_eq!(snapshot.layers.len(), 1);
        assert_eq!(snapshot.tag_mappings, crate::tags::default_mappings());
        assert!(store
            .gateway()
            .lock()
            .ops()
            .contains(&MemOp::ClearData(PathBuf::from("/roots/a"))));
    }

    #[test]
    fn test_tag_line_by_text() {
        let store = store();
        store.add_node(NewNode::new("ice cream")).unwrap();
        store
            .apply_tag_line_by_text("ice cream root crem memory cold")
            .unwrap();
        assert_eq!(store.find_node("ice cream").unwrap().tags.len(), 2);
        assert!(store.apply_tag_line_by_text("sorbet root x").is_err());
    }

    #[test]
    fn test_build_tag_keeps_whole_value() {
        let store = store();
        let tag = store.build_tag("mem", "sounds like root beer").unwrap();
        assert_eq!(tag.kind, TagKind::from_key("memory"));
        assert_eq!(tag.value, "sounds like root beer");

        let place = store.build_tag("loc", "Madrid@40.41,-3.70").unwrap();
        assert_eq!(place.value, "Madrid");
        assert!(place.coordinates.is_some());

        assert!(matches!(
            store.build_tag("nope", "x"),
            Err(WordTaggerError::InvalidInput(_))
        ));
        assert!(matches!(
            store.build_tag("root", "   "),
            Err(WordTaggerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_relevant_tags_follow_active_layer() {
        let store = store();
        store
            .add_node(NewNode::new("spectator").with_tags(vec![Tag::new(
                TagKind::from_key("root"),
                "spect",
            )]))
            .unwrap();
        let extra = store.add_layer("extra", None, None).unwrap().listed_layers[0].id;
        store.activate_layer(extra).unwrap();
        assert!(store.relevant_tags("spect").is_empty());
    }
}

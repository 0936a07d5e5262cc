//! # Command Layer
//!
//! This module contains the **core business logic** of wordtagger. Each group of
//! commands lives in its own submodule and operates on the in-memory
//! [`Library`], the authoritative copy of every layer, node and tag mapping.
//!
//! ## Role and Responsibilities
//!
//! Commands are where the real work happens:
//! - Enforce the entity invariants (unique texts, unique tags per node, one
//!   active layer, coordinates only on location tags)
//! - Implement insertion, merging, cascading deletes and repair
//! - Return a structured [`CmdResult`] with affected entities and messages
//!
//! ## What Commands Do NOT Do
//!
//! - **Any I/O**: persistence is the sync scheduler's job, output the CLI's
//! - **Locking**: the API hands commands an exclusive `&mut Library`
//! - **Notifications**: a command reports *what* changed through
//!   [`CmdResult::changed`]; the API publishes the event
//!
//! A command either fully applies or returns `Err` without touching the
//! library.
//!
//! ## Command Modules
//!
//! - [`nodes`]: add (with duplicate merging), update, delete, tag edits
//! - [`layers`]: layer lifecycle, cascading delete, orphan repair
//! - [`mappings`]: custom tag kind registry edits

use crate::error::{Result, WordTaggerError};
use crate::events::ChangeKind;
use crate::model::{Layer, Node, Snapshot, Tag};
use crate::store::LoadedData;
use crate::tags::TagRegistry;
use serde::Serialize;
use uuid::Uuid;

pub mod layers;
pub mod mappings;
pub mod nodes;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CmdResult {
    pub affected_nodes: Vec<Node>,
    pub listed_nodes: Vec<Node>,
    pub listed_layers: Vec<Layer>,
    pub messages: Vec<CmdMessage>,
    /// Set when the library was mutated.
    pub changed: Option<ChangeKind>,
}

impl CmdResult {
    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_affected_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.affected_nodes = nodes;
        self
    }

    pub fn with_listed_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.listed_nodes = nodes;
        self
    }

    pub fn with_listed_layers(mut self, layers: Vec<Layer>) -> Self {
        self.listed_layers = layers;
        self
    }

    pub fn changed(mut self, kind: ChangeKind) -> Self {
        self.changed = Some(kind);
        self
    }
}

/// In-memory state owned by the store.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub layers: Vec<Layer>,
    pub nodes: Vec<Node>,
    pub registry: TagRegistry,
}

impl Library {
    pub fn from_loaded(data: LoadedData) -> Self {
        let registry = match data.tag_mappings {
            Some(mappings) => TagRegistry::from_mappings(mappings),
            None => TagRegistry::default(),
        };
        let mut library = Self {
            layers: data.layers,
            nodes: data.nodes,
            registry,
        };
        library.normalize_active();
        library
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            layers: self.layers.clone(),
            nodes: self.nodes.clone(),
            tag_mappings: self.registry.mappings().to_vec(),
        }
    }

    /// Adds the default layer when there are none. Returns whether it did.
    pub fn seed_defaults(&mut self) -> bool {
        if !self.layers.is_empty() {
            return false;
        }
        self.layers.push(Layer::seed());
        true
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.is_active)
    }

    /// The active layer, else the first one.
    pub fn current_layer_id(&self) -> Option<Uuid> {
        self.active_layer()
            .or_else(|| self.layers.first())
            .map(|l| l.id)
    }

    pub fn node(&self, id: Uuid) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or(WordTaggerError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: Uuid) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(WordTaggerError::NodeNotFound(id))
    }

    pub fn node_by_text(&self, text: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.has_text(text))
    }

    pub fn layer(&self, id: Uuid) -> Result<&Layer> {
        self.layers
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| WordTaggerError::LayerNotFound(id.to_string()))
    }

    /// Finds a layer by machine name (case-insensitive) or id.
    pub fn find_layer(&self, key: &str) -> Result<&Layer> {
        let key = key.trim();
        let by_id = Uuid::parse_str(key).ok();
        self.layers
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(key) || Some(l.id) == by_id)
            .ok_or_else(|| WordTaggerError::LayerNotFound(key.to_string()))
    }

    /// Location tags that carry coordinates, across all nodes.
    pub fn known_locations(&self) -> Vec<Tag> {
        self.nodes
            .iter()
            .flat_map(|n| n.tags.iter())
            .filter(|t| t.kind.is_location() && t.coordinates.is_some())
            .cloned()
            .collect()
    }

    /// Keeps at most one layer active. Data written by older or foreign tools
    /// may have several.
    fn normalize_active(&mut self) {
        let mut seen = false;
        for layer in &mut self.layers {
            if layer.is_active {
                if seen {
                    tracing::warn!("Deactivating extra active layer '{}'", layer.name);
                    layer.is_active = false;
                }
                seen = true;
            }
        }
    }
}

pub(crate) fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else if let Some(stem) = word.strip_suffix('y') {
        format!("{} {}ies", count, stem)
    } else {
        format!("{} {}s", count, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LoadedData;

    #[test]
    fn seeding_only_happens_on_empty_libraries() {
        let mut lib = Library::default();
        assert!(lib.seed_defaults());
        assert!(!lib.seed_defaults());
        assert_eq!(lib.layers.len(), 1);
        assert_eq!(lib.current_layer_id(), Some(lib.layers[0].id));
    }

    #[test]
    fn loading_keeps_a_single_active_layer() {
        let mut a = Layer::new("a", "A", "#fff");
        let mut b = Layer::new("b", "B", "#000");
        a.is_active = true;
        b.is_active = true;
        let lib = Library::from_loaded(LoadedData {
            layers: vec![a.clone(), b],
            nodes: vec![],
            tag_mappings: None,
        });
        assert_eq!(lib.layers.iter().filter(|l| l.is_active).count(), 1);
        assert_eq!(lib.active_layer().unwrap().id, a.id);
        assert_eq!(lib.registry, TagRegistry::default());
    }

    #[test]
    fn layers_resolve_by_name_or_id() {
        let mut lib = Library::default();
        lib.seed_defaults();
        let id = lib.layers[0].id;
        assert_eq!(lib.find_layer("DEFAULT").unwrap().id, id);
        assert_eq!(lib.find_layer(&id.to_string()).unwrap().id, id);
        assert!(lib.find_layer("nope").is_err());
    }
}

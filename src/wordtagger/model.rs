//! # Domain Model
//!
//! The value types every other layer passes around: [`Node`], [`Tag`], [`Layer`],
//! [`TagMapping`] and the small persisted envelopes ([`DataConfig`],
//! [`DataMetadata`]).
//!
//! ## Identity and Equality
//!
//! Every entity carries a stable `Uuid`. Tags are the exception to "equality is
//! identity": two tags are the *same tag* when their kind matches and their
//! values match case-insensitively. That is what duplicate detection, merging,
//! and the `Node` invariant (no two tags with identical `(kind, value)`) rely on.
//!
//! ## Tag Kinds
//!
//! A [`TagKind`] is either one of the fixed [`PredefinedKind`]s or a
//! `Custom(key)` whose display name lives in the tag registry
//! (see [`crate::tags::TagRegistry`]). On disk a kind is just its key string,
//! so `"root"` and `"etymology"` read the same way in the JSON.
//!
//! ## Serialization
//!
//! All structs serialize with camelCase keys and ISO-8601 timestamps. Key
//! ordering is made stable at write time by the store layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredefinedKind {
    Memory,
    Location,
    Root,
    Shape,
    Sound,
}

impl PredefinedKind {
    pub const ALL: [PredefinedKind; 5] = [
        PredefinedKind::Memory,
        PredefinedKind::Location,
        PredefinedKind::Root,
        PredefinedKind::Shape,
        PredefinedKind::Sound,
    ];

    /// Canonical key, as written to disk.
    pub fn key(&self) -> &'static str {
        match self {
            PredefinedKind::Memory => "memory",
            PredefinedKind::Location => "location",
            PredefinedKind::Root => "root",
            PredefinedKind::Shape => "shape",
            PredefinedKind::Sound => "sound",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PredefinedKind::Memory => "Memory aid",
            PredefinedKind::Location => "Location",
            PredefinedKind::Root => "Word root",
            PredefinedKind::Shape => "Shape",
            PredefinedKind::Sound => "Sound",
        }
    }

    /// Tokens accepted on a tag line for this kind. The canonical key comes first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            PredefinedKind::Memory => &["memory", "mem", "mnemonic"],
            PredefinedKind::Location => &["location", "loc", "place"],
            PredefinedKind::Root => &["root"],
            PredefinedKind::Shape => &["shape", "form"],
            PredefinedKind::Sound => &["sound", "phon"],
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TagKind {
    Predefined(PredefinedKind),
    Custom(String),
}

impl TagKind {
    /// Builds a kind from a stored key. Predefined keys win; anything else is custom.
    /// Custom keys are normalized to lowercase.
    pub fn from_key(key: &str) -> Self {
        let normalized = key.trim().to_lowercase();
        match PredefinedKind::from_key(&normalized) {
            Some(kind) => TagKind::Predefined(kind),
            None => TagKind::Custom(normalized),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TagKind::Predefined(kind) => kind.key(),
            TagKind::Custom(key) => key,
        }
    }

    pub fn is_location(&self) -> bool {
        matches!(self, TagKind::Predefined(PredefinedKind::Location))
    }
}

impl From<TagKind> for String {
    fn from(kind: TagKind) -> Self {
        kind.key().to_string()
    }
}

impl From<String> for TagKind {
    fn from(key: String) -> Self {
        TagKind::from_key(&key)
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A typed annotation on a node.
///
/// `PartialEq`/`Hash` follow tag identity: kind plus case-insensitive value.
/// The `id` and `coordinates` do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub kind: TagKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Tag {
    pub fn new(kind: TagKind, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            value: value.into().trim().to_string(),
            coordinates: None,
        }
    }

    /// Attaches coordinates. Ignored unless the kind is a location kind.
    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        if self.kind.is_location() {
            self.coordinates = Some(coordinates);
        }
        self
    }

    pub fn same_as(&self, other: &Tag) -> bool {
        self.kind == other.kind && self.value.to_lowercase() == other.value.to_lowercase()
    }

    /// `kind:value` form used in notices and CLI output.
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind, self.value)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.value.to_lowercase().hash(state);
    }
}

/// The primary content entity: a tagged text entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub phonetic: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub layer_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            text: text.into().trim().to_string(),
            phonetic: None,
            meaning: None,
            layer_id: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_text(&self, text: &str) -> bool {
        self.text.to_lowercase() == text.trim().to_lowercase()
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.iter().any(|t| t.same_as(tag))
    }

    /// Appends a tag unless an equal one is already present. Returns whether it was added.
    pub fn push_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Replaces all tags, dropping later duplicates.
    pub fn replace_tags(&mut self, tags: Vec<Tag>) {
        self.tags.clear();
        for tag in tags {
            self.push_tag(tag);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: Uuid,
    /// Machine key, unique case-insensitively.
    pub name: String,
    pub display_name: String,
    pub color: String,
    #[serde(default)]
    pub is_active: bool,
}

pub const DEFAULT_LAYER_NAME: &str = "default";
pub const DEFAULT_LAYER_COLOR: &str = "#4A90D9";

impl Layer {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: display_name.into(),
            color: color.into(),
            is_active: false,
        }
    }

    /// The layer seeded into an empty store.
    pub fn seed() -> Self {
        let mut layer = Self::new(DEFAULT_LAYER_NAME, "Default", DEFAULT_LAYER_COLOR);
        layer.is_active = true;
        layer
    }
}

/// Registry entry resolving a custom tag key to a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMapping {
    pub key: String,
    pub display_name: String,
}

impl TagMapping {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }
}

/// Persisted as `wordtagger-config.json` at the storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    pub version: String,
    pub app_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_directory: String,
    pub backup_directory: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: SCHEMA_VERSION.to_string(),
            app_name: "WordTagger".to_string(),
            created_at: now,
            updated_at: now,
            data_directory: "data".to_string(),
            backup_directory: "backups".to_string(),
        }
    }
}

/// Aggregate counts, regenerated on every full save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMetadata {
    pub total_layers: usize,
    pub total_nodes: usize,
    pub total_tags: usize,
    pub last_backup: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
}

/// An immutable copy of everything the store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub layers: Vec<Layer>,
    pub nodes: Vec<Node>,
    pub tag_mappings: Vec<TagMapping>,
}

impl Snapshot {
    pub fn metadata(&self, last_backup: Option<DateTime<Utc>>) -> DataMetadata {
        DataMetadata {
            total_layers: self.layers.len(),
            total_nodes: self.nodes.len(),
            total_tags: self.nodes.iter().map(|n| n.tags.len()).sum(),
            last_backup,
            sync_enabled: true,
        }
    }
}

/// Full contents of one `backups/backup_*.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub config: DataConfig,
    pub layers: Vec<Layer>,
    pub nodes: Vec<Node>,
    pub metadata: DataMetadata,
    pub tag_mappings: Vec<TagMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_equality_ignores_value_case_and_id() {
        let a = Tag::new(TagKind::Predefined(PredefinedKind::Root), "Spect");
        let b = Tag::new(TagKind::Predefined(PredefinedKind::Root), "spect");
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn tag_equality_respects_kind() {
        let a = Tag::new(TagKind::Predefined(PredefinedKind::Root), "spect");
        let b = Tag::new(TagKind::Predefined(PredefinedKind::Memory), "spect");
        assert_ne!(a, b);
    }

    #[test]
    fn coordinates_only_attach_to_locations() {
        let here = Coordinates::new(48.85, 2.29);
        let root = Tag::new(TagKind::Predefined(PredefinedKind::Root), "x").with_coordinates(here);
        assert!(root.coordinates.is_none());

        let loc =
            Tag::new(TagKind::Predefined(PredefinedKind::Location), "tower").with_coordinates(here);
        assert_eq!(loc.coordinates, Some(here));
    }

    #[test]
    fn tag_kind_serializes_as_key() {
        let tag = Tag::new(TagKind::Custom("etymology".into()), "latin");
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["kind"], "etymology");

        let tag = Tag::new(TagKind::Predefined(PredefinedKind::Location), "paris");
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["kind"], "location");
        assert!(json.get("coordinates").is_none());

        let back: Tag = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, TagKind::Predefined(PredefinedKind::Location));
    }

    #[test]
    fn custom_keys_are_lowercased() {
        assert_eq!(TagKind::from_key(" Syn "), TagKind::Custom("syn".into()));
        assert_eq!(
            TagKind::from_key("ROOT"),
            TagKind::Predefined(PredefinedKind::Root)
        );
    }

    #[test]
    fn push_tag_rejects_duplicates() {
        let mut node = Node::new("cat");
        assert!(node.push_tag(Tag::new(TagKind::from_key("root"), "cat")));
        assert!(!node.push_tag(Tag::new(TagKind::from_key("root"), "CAT")));
        assert_eq!(node.tags.len(), 1);
    }

    #[test]
    fn node_uses_camel_case_keys() {
        let node = Node::new("cat");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("layerId").is_some());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn snapshot_metadata_counts_tags() {
        let mut node = Node::new("cat");
        node.push_tag(Tag::new(TagKind::from_key("root"), "c"));
        node.push_tag(Tag::new(TagKind::from_key("memory"), "meow"));
        let snapshot = Snapshot {
            layers: vec![Layer::seed()],
            nodes: vec![node],
            tag_mappings: vec![],
        };
        let meta = snapshot.metadata(None);
        assert_eq!(meta.total_layers, 1);
        assert_eq!(meta.total_nodes, 1);
        assert_eq!(meta.total_tags, 2);
    }
}

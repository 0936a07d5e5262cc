//! Node commands.
//!
//! ## Insertion
//!
//! Adding a node first looks for an existing node with the same text,
//! compared case-insensitively across the whole library:
//!
//! - **No match**: the node is inserted, into the current layer unless one
//!   was given.
//! - **Match, with new tags**: only the incoming tags the existing node lacks
//!   are appended to it. Nothing else about the existing node changes.
//! - **Match, nothing new**: the addition is rejected as a duplicate and the
//!   library is left untouched.
//!
//! [`plan_insertion`] makes that decision without mutating anything; [`add`]
//! applies it.

use super::{plural, CmdMessage, CmdResult, Library};
use crate::error::{Result, WordTaggerError};
use crate::events::ChangeKind;
use crate::model::{Node, Tag, TagKind};
use crate::tag_line::parse_tag_line;
use uuid::Uuid;

/// Input for [`add`].
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub text: String,
    pub phonetic: Option<String>,
    pub meaning: Option<String>,
    pub layer_id: Option<Uuid>,
    pub tags: Vec<Tag>,
}

impl NewNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Inserted,
    MergedIntoExisting { id: Uuid, new_tags: Vec<Tag> },
    RejectedDuplicate { id: Uuid, conflicting: Vec<Tag> },
}

/// Decides what adding a node with `text` and `tags` would do.
pub fn plan_insertion(nodes: &[Node], text: &str, tags: &[Tag]) -> Insertion {
    let Some(existing) = nodes.iter().find(|n| n.has_text(text)) else {
        return Insertion::Inserted;
    };

    let mut new_tags: Vec<Tag> = Vec::new();
    let mut conflicting: Vec<Tag> = Vec::new();
    for tag in tags {
        if existing.has_tag(tag) {
            if !conflicting.iter().any(|t| t.same_as(tag)) {
                conflicting.push(tag.clone());
            }
        } else if !new_tags.iter().any(|t| t.same_as(tag)) {
            new_tags.push(tag.clone());
        }
    }

    if new_tags.is_empty() {
        Insertion::RejectedDuplicate {
            id: existing.id,
            conflicting,
        }
    } else {
        Insertion::MergedIntoExisting {
            id: existing.id,
            new_tags,
        }
    }
}

/// Adds a node, merging into or rejecting against an existing one with the same text.
pub fn add(lib: &mut Library, new: NewNode) -> Result<CmdResult> {
    let text = new.text.trim().to_string();
    if text.is_empty() {
        return Err(WordTaggerError::InvalidInput(
            "entry text cannot be empty".to_string(),
        ));
    }
    if let Some(layer_id) = new.layer_id {
        lib.layer(layer_id)?;
    }
    let tags: Vec<Tag> = new.tags.into_iter().map(sanitize_tag).collect();

    let mut result = CmdResult::default();
    match plan_insertion(&lib.nodes, &text, &tags) {
        Insertion::Inserted => {
            let mut node = Node::new(text);
            node.phonetic = non_empty(new.phonetic);
            node.meaning = non_empty(new.meaning);
            node.layer_id = new.layer_id.or_else(|| lib.current_layer_id());
            node.replace_tags(tags);

            tracing::debug!("Inserted node '{}'", node.text);
            result.add_message(CmdMessage::success(format!("Added '{}'", node.text)));
            lib.nodes.push(node.clone());
            Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
        }
        Insertion::MergedIntoExisting { id, new_tags } => {
            let count = new_tags.len();
            let node = lib.node_mut(id)?;
            for tag in new_tags {
                node.push_tag(tag);
            }
            node.touch();

            tracing::debug!("Merged {} tags into '{}'", count, node.text);
            result.add_message(CmdMessage::info(format!(
                "'{}' already exists; merged {}",
                node.text,
                plural(count, "new tag")
            )));
            let node = node.clone();
            Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
        }
        Insertion::RejectedDuplicate { id, conflicting } => {
            let existing = lib.node(id)?;
            Err(WordTaggerError::Duplicate {
                text: existing.text.clone(),
                conflicting: conflicting.iter().map(Tag::label).collect(),
            })
        }
    }
}

/// Field edits for [`update`]. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub text: Option<String>,
    pub phonetic: Option<Option<String>>,
    pub meaning: Option<Option<String>>,
}

pub fn update(lib: &mut Library, id: Uuid, changes: NodeUpdate) -> Result<CmdResult> {
    if let Some(text) = &changes.text {
        let text = text.trim();
        if text.is_empty() {
            return Err(WordTaggerError::InvalidInput(
                "entry text cannot be empty".to_string(),
            ));
        }
        if let Some(other) = lib.nodes.iter().find(|n| n.id != id && n.has_text(text)) {
            return Err(WordTaggerError::Duplicate {
                text: other.text.clone(),
                conflicting: Vec::new(),
            });
        }
    }

    let node = lib.node_mut(id)?;
    if let Some(text) = changes.text {
        node.text = text.trim().to_string();
    }
    if let Some(phonetic) = changes.phonetic {
        node.phonetic = non_empty(phonetic);
    }
    if let Some(meaning) = changes.meaning {
        node.meaning = non_empty(meaning);
    }
    node.touch();

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!("Updated '{}'", node.text)));
    let node = node.clone();
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

pub fn delete(lib: &mut Library, id: Uuid) -> Result<CmdResult> {
    let index = lib
        .nodes
        .iter()
        .position(|n| n.id == id)
        .ok_or(WordTaggerError::NodeNotFound(id))?;
    let node = lib.nodes.remove(index);

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!("Deleted '{}'", node.text)));
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

pub fn add_tag(lib: &mut Library, id: Uuid, tag: Tag) -> Result<CmdResult> {
    let tag = sanitize_tag(tag);
    let label = tag.label();
    let node = lib.node_mut(id)?;

    let mut result = CmdResult::default();
    if !node.push_tag(tag) {
        result.add_message(CmdMessage::warning(format!(
            "'{}' is already tagged {}",
            node.text, label
        )));
        return Ok(result);
    }
    node.touch();
    result.add_message(CmdMessage::success(format!("Tagged '{}' {}", node.text, label)));
    let node = node.clone();
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

pub fn remove_tag(lib: &mut Library, id: Uuid, kind: &TagKind, value: &str) -> Result<CmdResult> {
    let probe = Tag::new(kind.clone(), value);
    let node = lib.node_mut(id)?;

    let mut result = CmdResult::default();
    let before = node.tags.len();
    node.tags.retain(|t| !t.same_as(&probe));
    if node.tags.len() == before {
        result.add_message(CmdMessage::warning(format!(
            "'{}' has no tag {}",
            node.text,
            probe.label()
        )));
        return Ok(result);
    }
    node.touch();
    result.add_message(CmdMessage::success(format!(
        "Removed {} from '{}'",
        probe.label(),
        node.text
    )));
    let node = node.clone();
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

/// Replaces every tag on the node.
pub fn set_tags(lib: &mut Library, id: Uuid, tags: Vec<Tag>) -> Result<CmdResult> {
    let node = lib.node_mut(id)?;
    node.replace_tags(tags.into_iter().map(sanitize_tag).collect());
    node.touch();

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "'{}' now has {}",
        node.text,
        plural(node.tags.len(), "tag")
    )));
    let node = node.clone();
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

pub fn move_to_layer(lib: &mut Library, id: Uuid, layer_id: Uuid) -> Result<CmdResult> {
    let layer_name = lib.layer(layer_id)?.display_name.clone();
    let node = lib.node_mut(id)?;
    node.layer_id = Some(layer_id);
    node.touch();

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Moved '{}' to {}",
        node.text, layer_name
    )));
    let node = node.clone();
    Ok(result.with_affected_nodes(vec![node]).changed(ChangeKind::Nodes))
}

/// Parses a tag line for node `id` and replaces its tags with the result.
/// A line that does not start with the node's text changes nothing.
pub fn apply_tag_line(lib: &mut Library, id: Uuid, line: &str) -> Result<CmdResult> {
    let node = lib.node(id)?;
    let tags = parse_tag_line(line, &node.text, &lib.registry, &lib.known_locations())?;
    set_tags(lib, id, tags)
}

/// The node a tag line addresses: the one whose text spells the most leading
/// tokens of the line.
pub fn find_line_target(lib: &Library, line: &str) -> Option<Uuid> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
    lib.nodes
        .iter()
        .filter(|n| {
            let words: Vec<String> = n.text.split_whitespace().map(str::to_lowercase).collect();
            !words.is_empty() && tokens.starts_with(&words)
        })
        .max_by_key(|n| n.text.split_whitespace().count())
        .map(|n| n.id)
}

/// Nodes, optionally limited to one layer, in insertion order.
pub fn list(lib: &Library, layer_id: Option<Uuid>) -> Result<CmdResult> {
    let nodes: Vec<Node> = lib
        .nodes
        .iter()
        .filter(|n| layer_id.is_none() || n.layer_id == layer_id)
        .cloned()
        .collect();

    let mut result = CmdResult::default();
    if nodes.is_empty() {
        result.add_message(CmdMessage::info("No entries"));
    }
    Ok(result.with_listed_nodes(nodes))
}

/// Coordinates only belong on location tags.
fn sanitize_tag(mut tag: Tag) -> Tag {
    if !tag.kind.is_location() {
        tag.coordinates = None;
    }
    tag.value = tag.value.trim().to_string();
    tag
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

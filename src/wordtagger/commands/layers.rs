//! Layer commands.
//!
//! At most one layer is active at a time. Deleting a layer deletes its nodes;
//! if it was the active one, the first remaining layer takes over.

use super::{plural, CmdMessage, CmdResult, Library};
use crate::error::{Result, WordTaggerError};
use crate::events::ChangeKind;
use crate::model::{Layer, DEFAULT_LAYER_COLOR};
use uuid::Uuid;

pub fn list(lib: &Library) -> Result<CmdResult> {
    let mut result = CmdResult::default();
    if lib.layers.is_empty() {
        result.add_message(CmdMessage::info("No layers"));
    }
    Ok(result.with_listed_layers(lib.layers.clone()))
}

/// Creates a layer. The first layer of a library becomes active.
pub fn add(
    lib: &mut Library,
    name: &str,
    display_name: Option<&str>,
    color: Option<&str>,
) -> Result<CmdResult> {
    let name = name.trim();
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(WordTaggerError::InvalidInput(format!(
            "invalid layer name '{}'",
            name
        )));
    }
    if lib.layers.iter().any(|l| l.name.eq_ignore_ascii_case(name)) {
        return Err(WordTaggerError::InvalidInput(format!(
            "layer '{}' already exists",
            name
        )));
    }

    let display_name = display_name
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(name);
    let mut layer = Layer::new(
        name,
        display_name,
        color.unwrap_or(DEFAULT_LAYER_COLOR),
    );
    layer.is_active = lib.layers.is_empty();
    lib.layers.push(layer.clone());

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!("Created layer '{}'", layer.name)));
    Ok(result.with_listed_layers(vec![layer]).changed(ChangeKind::Layers))
}

pub fn rename(lib: &mut Library, id: Uuid, display_name: &str) -> Result<CmdResult> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(WordTaggerError::InvalidInput(
            "display name cannot be empty".to_string(),
        ));
    }
    let layer = lib
        .layers
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or_else(|| WordTaggerError::LayerNotFound(id.to_string()))?;
    layer.display_name = display_name.to_string();

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Layer '{}' is now shown as '{}'",
        layer.name, layer.display_name
    )));
    let layer = layer.clone();
    Ok(result.with_listed_layers(vec![layer]).changed(ChangeKind::Layers))
}

/// Makes `id` the only active layer.
pub fn activate(lib: &mut Library, id: Uuid) -> Result<CmdResult> {
    lib.layer(id)?;
    for layer in &mut lib.layers {
        layer.is_active = layer.id == id;
    }
    let layer = lib.layer(id)?.clone();

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Activated layer '{}'",
        layer.name
    )));
    Ok(result.with_listed_layers(vec![layer]).changed(ChangeKind::Layers))
}

/// Deletes a layer and every node in it.
pub fn delete(lib: &mut Library, id: Uuid) -> Result<CmdResult> {
    let index = lib
        .layers
        .iter()
        .position(|l| l.id == id)
        .ok_or_else(|| WordTaggerError::LayerNotFound(id.to_string()))?;

    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut lib.nodes)
        .into_iter()
        .partition(|n| n.layer_id == Some(id));
    lib.nodes = kept;
    let layer = lib.layers.remove(index);

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Deleted layer '{}' and {}",
        layer.name,
        plural(removed.len(), "entry")
    )));

    if layer.is_active {
        if let Some(next) = lib.layers.first_mut() {
            next.is_active = true;
            result.add_message(CmdMessage::info(format!(
                "Layer '{}' is now active",
                next.name
            )));
        }
    }
    tracing::info!(
        "Deleted layer '{}' with {} nodes",
        layer.name,
        removed.len()
    );
    Ok(result.with_affected_nodes(removed).changed(ChangeKind::Layers))
}

/// Moves nodes without a valid layer into the current layer.
pub fn repair_orphans(lib: &mut Library) -> Result<CmdResult> {
    let mut result = CmdResult::default();
    let known: Vec<Uuid> = lib.layers.iter().map(|l| l.id).collect();
    let is_orphan = |layer_id: Option<Uuid>| match layer_id {
        Some(id) => !known.contains(&id),
        None => true,
    };

    let orphan_count = lib.nodes.iter().filter(|n| is_orphan(n.layer_id)).count();
    if orphan_count == 0 {
        result.add_message(CmdMessage::info("No orphaned entries"));
        return Ok(result);
    }
    let Some(target) = lib.current_layer_id() else {
        result.add_message(CmdMessage::warning(format!(
            "{} without a layer, and no layer to move them to",
            plural(orphan_count, "entry")
        )));
        return Ok(result);
    };

    let mut repaired = Vec::new();
    for node in lib.nodes.iter_mut().filter(|n| is_orphan(n.layer_id)) {
        node.layer_id = Some(target);
        node.touch();
        repaired.push(node.clone());
    }

    result.add_message(CmdMessage::success(format!(
        "Moved {} into the current layer",
        plural(repaired.len(), "orphaned entry")
    )));
    Ok(result.with_affected_nodes(repaired).changed(ChangeKind::Nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::nodes::{self, NewNode};

    fn add_node(lib: &mut Library, text: &str, layer: Uuid) {
        let mut new = NewNode::new(text);
        new.layer_id = Some(layer);
        nodes::add(lib, new).unwrap();
    }

    fn two_layers() -> (Library, Uuid, Uuid) {
        let mut lib = Library::default();
        add(&mut lib, "first", None, None).unwrap();
        add(&mut lib, "second", Some("Second"), Some("#ff0000")).unwrap();
        let a = lib.layers[0].id;
        let b = lib.layers[1].id;
        (lib, a, b)
    }

    #[test]
    fn test_first_layer_becomes_active() {
        let (lib, a, _) = two_layers();
        assert_eq!(lib.active_layer().unwrap().id, a);
        assert_eq!(lib.layers[1].display_name, "Second");
        assert_eq!(lib.layers[0].color, DEFAULT_LAYER_COLOR);
    }

    #[test]
    fn test_layer_names_are_unique() {
        let (mut lib, _, _) = two_layers();
        assert!(add(&mut lib, "FIRST", None, None).is_err());
        assert!(add(&mut lib, "two words", None, None).is_err());
    }

    #[test]
    fn test_activate_is_exclusive() {
        let (mut lib, a, b) = two_layers();
        activate(&mut lib, b).unwrap();
        assert!(!lib.layer(a).unwrap().is_active);
        assert!(lib.layer(b).unwrap().is_active);
        assert!(activate(&mut lib, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_delete_cascades_and_reactivates() {
        let (mut lib, a, b) = two_layers();
        add_node(&mut lib, "cat", a);
        add_node(&mut lib, "dog", a);
        add_node(&mut lib, "owl", b);

        let result = delete(&mut lib, a).unwrap();
        assert_eq!(result.affected_nodes.len(), 2);
        assert_eq!(lib.nodes.len(), 1);
        assert_eq!(lib.nodes[0].text, "owl");
        assert_eq!(lib.active_layer().unwrap().id, b);
    }

    #[test]
    fn test_deleting_last_layer_leaves_none_active() {
        let mut lib = Library::default();
        add(&mut lib, "only", None, None).unwrap();
        let id = lib.layers[0].id;
        delete(&mut lib, id).unwrap();
        assert!(lib.layers.is_empty());
        assert!(lib.active_layer().is_none());
    }

    #[test]
    fn test_repair_orphans() {
        let (mut lib, a, b) = two_layers();
        activate(&mut lib, b).unwrap();
        add_node(&mut lib, "kept", a);
        nodes::add(&mut lib, NewNode::new("homeless")).unwrap();
        lib.nodes[1].layer_id = None;
        nodes::add(&mut lib, NewNode::new("dangling")).unwrap();
        lib.nodes[2].layer_id = Some(Uuid::new_v4());

        let result = repair_orphans(&mut lib).unwrap();
        assert_eq!(result.affected_nodes.len(), 2);
        assert_eq!(lib.nodes[0].layer_id, Some(a));
        assert_eq!(lib.nodes[1].layer_id, Some(b));
        assert_eq!(lib.nodes[2].layer_id, Some(b));

        let result = repair_orphans(&mut lib).unwrap();
        assert!(result.changed.is_none());
    }

    #[test]
    fn test_rename_keeps_machine_name() {
        let (mut lib, a, _) = two_layers();
        rename(&mut lib, a, "Primary").unwrap();
        assert_eq!(lib.layers[0].name, "first");
        assert_eq!(lib.layers[0].display_name, "Primary");
    }
}

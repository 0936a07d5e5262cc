//! Tag mapping commands: the registry of custom tag kinds.

use super::{plural, CmdMessage, CmdResult, Library};
use crate::error::{Result, WordTaggerError};
use crate::events::ChangeKind;
use crate::model::TagKind;

pub fn list(lib: &Library) -> Result<CmdResult> {
    let mut result = CmdResult::default();
    let mappings = lib.registry.mappings();
    result.add_message(CmdMessage::info(format!(
        "{} defined",
        plural(mappings.len(), "custom kind")
    )));
    for mapping in mappings {
        result.add_message(CmdMessage::info(format!(
            "  {:<12} {}",
            mapping.key, mapping.display_name
        )));
    }
    Ok(result)
}

/// Adds a custom kind, or renames an existing one.
pub fn add(lib: &mut Library, key: &str, display_name: &str) -> Result<CmdResult> {
    let created = lib
        .registry
        .upsert(key, display_name)
        .map_err(|e| WordTaggerError::InvalidInput(e.to_string()))?;

    let key = key.trim().to_lowercase();
    let shown = lib.registry.display_name(&TagKind::Custom(key.clone()));
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(if created {
        format!("Added tag kind '{}' ({})", key, shown)
    } else {
        format!("Tag kind '{}' is now shown as {}", key, shown)
    }));
    Ok(result.changed(ChangeKind::Mappings))
}

/// Removes a custom kind. Refused while any tag still uses it.
pub fn remove(lib: &mut Library, key: &str) -> Result<CmdResult> {
    let kind = TagKind::Custom(key.trim().to_lowercase());
    let in_use = lib
        .nodes
        .iter()
        .flat_map(|n| n.tags.iter())
        .filter(|t| t.kind == kind)
        .count();
    if in_use > 0 {
        return Err(WordTaggerError::InvalidInput(format!(
            "tag kind '{}' is still used by {}",
            kind,
            plural(in_use, "tag")
        )));
    }

    let mut result = CmdResult::default();
    if !lib.registry.remove(kind.key()) {
        result.add_message(CmdMessage::warning(format!(
            "No custom tag kind '{}'",
            kind
        )));
        return Ok(result);
    }
    result.add_message(CmdMessage::success(format!("Removed tag kind '{}'", kind)));
    Ok(result.changed(ChangeKind::Mappings))
}

/// Restores the default custom kinds.
pub fn reset(lib: &mut Library) -> Result<CmdResult> {
    lib.registry.reset();
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success("Restored default tag kinds"));

    let unmapped = lib
        .nodes
        .iter()
        .flat_map(|n| n.tags.iter())
        .filter(|t| {
            matches!(t.kind, TagKind::Custom(_)) && lib.registry.resolve(t.kind.key()).is_none()
        })
        .count();
    if unmapped > 0 {
        result.add_message(CmdMessage::warning(format!(
            "{} now use an unregistered kind",
            plural(unmapped, "tag")
        )));
    }
    Ok(result.changed(ChangeKind::Mappings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::nodes::{self, NewNode};
    use crate::model::Tag;

    #[test]
    fn test_add_and_rename_mapping() {
        let mut lib = Library::default();
        add(&mut lib, "Mnem-2", "Second memory").unwrap();
        assert_eq!(
            lib.registry.resolve("mnem-2"),
            Some(TagKind::Custom("mnem-2".into()))
        );

        let result = add(&mut lib, "mnem-2", "Backup memory").unwrap();
        assert!(result.messages[0].content.contains("now shown as"));
        assert_eq!(
            lib.registry.display_name(&TagKind::Custom("mnem-2".into())),
            "Backup memory"
        );
    }

    #[test]
    fn test_invalid_and_reserved_keys() {
        let mut lib = Library::default();
        assert!(add(&mut lib, "9lives", "x").is_err());
        assert!(add(&mut lib, "loc", "x").is_err());
        assert!(add(&mut lib, "trailing-", "x").is_err());
    }

    #[test]
    fn test_remove_refused_while_in_use() {
        let mut lib = Library::default();
        lib.seed_defaults();
        nodes::add(
            &mut lib,
            NewNode::new("big").with_tags(vec![Tag::new(TagKind::from_key("syn"), "large")]),
        )
        .unwrap();

        assert!(remove(&mut lib, "syn").is_err());
        assert!(remove(&mut lib, "ant").unwrap().changed.is_some());
        assert!(remove(&mut lib, "ant").unwrap().changed.is_none());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut lib = Library::default();
        add(&mut lib, "pun", "Pun").unwrap();
        remove(&mut lib, "ety").unwrap();
        reset(&mut lib).unwrap();
        assert_eq!(lib.registry, crate::tags::TagRegistry::default());
    }
}

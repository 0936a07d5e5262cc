//! Tag kind registry.
//!
//! Predefined kinds are built in and always resolvable through their aliases
//! (`loc`, `mem`, ...). Custom kinds are user-defined keys whose display names
//! live in the [`TagRegistry`]. The registry is part of the persisted state and
//! can be reset to its defaults at any time.
//!
//! ## Resolution
//!
//! [`TagRegistry::resolve`] turns a token typed on a tag line into a
//! [`TagKind`]. Resolution is case-insensitive; predefined aliases take
//! priority and custom keys may never shadow them.

pub mod validation;

use crate::model::{PredefinedKind, TagKind, TagMapping};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub use validation::{validate_mapping_key, KeyValidationError};

static PREDEFINED_ALIASES: Lazy<HashMap<&'static str, PredefinedKind>> = Lazy::new(|| {
    PredefinedKind::ALL
        .iter()
        .flat_map(|kind| kind.aliases().iter().map(move |alias| (*alias, *kind)))
        .collect()
});

/// Custom mappings a fresh (or reset) registry starts with.
pub fn default_mappings() -> Vec<TagMapping> {
    vec![
        TagMapping::new("syn", "Synonym"),
        TagMapping::new("ant", "Antonym"),
        TagMapping::new("ety", "Etymology"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error(transparent)]
    InvalidKey(#[from] KeyValidationError),
    #[error("'{0}' is reserved for a built-in tag kind")]
    Reserved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRegistry {
    mappings: Vec<TagMapping>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self {
            mappings: default_mappings(),
        }
    }
}

impl TagRegistry {
    /// Builds a registry from persisted mappings, skipping entries that no longer validate.
    pub fn from_mappings(mappings: Vec<TagMapping>) -> Self {
        let mut registry = Self {
            mappings: Vec::new(),
        };
        for mapping in mappings {
            if let Err(e) = registry.upsert(&mapping.key, &mapping.display_name) {
                tracing::warn!("Dropping persisted tag mapping '{}': {}", mapping.key, e);
            }
        }
        registry
    }

    pub fn mappings(&self) -> &[TagMapping] {
        &self.mappings
    }

    pub fn resolve(&self, token: &str) -> Option<TagKind> {
        let lower = token.to_lowercase();
        if let Some(kind) = PREDEFINED_ALIASES.get(lower.as_str()) {
            return Some(TagKind::Predefined(*kind));
        }
        self.mappings
            .iter()
            .find(|m| m.key == lower)
            .map(|m| TagKind::Custom(m.key.clone()))
    }

    pub fn display_name(&self, kind: &TagKind) -> String {
        match kind {
            TagKind::Predefined(kind) => kind.display_name().to_string(),
            TagKind::Custom(key) => self
                .mappings
                .iter()
                .find(|m| &m.key == key)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| key.clone()),
        }
    }

    /// Adds a mapping or renames an existing one. Returns `true` when the key is new.
    pub fn upsert(&mut self, key: &str, display_name: &str) -> Result<bool, MappingError> {
        let key = key.trim().to_lowercase();
        validate_mapping_key(&key)?;
        if PREDEFINED_ALIASES.contains_key(key.as_str()) {
            return Err(MappingError::Reserved(key));
        }

        let display_name = match display_name.trim() {
            "" => key.clone(),
            name => name.to_string(),
        };

        if let Some(existing) = self.mappings.iter_mut().find(|m| m.key == key) {
            existing.display_name = display_name;
            return Ok(false);
        }
        self.mappings.push(TagMapping::new(key, display_name));
        Ok(true)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let key = key.trim().to_lowercase();
        let before = self.mappings.len();
        self.mappings.retain(|m| m.key != key);
        self.mappings.len() != before
    }

    pub fn reset(&mut self) {
        self.mappings = default_mappings();
    }
}

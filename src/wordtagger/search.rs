//! # Search
//!
//! Pure, deterministic ranking of nodes against a query string.
//!
//! ## Scoring
//!
//! Each searchable field (`text`, `meaning`, `phonetic`, tag values) is
//! tested with case-insensitive substring containment. A field that contains
//! the query has a similarity derived from the normalized edit distance
//! between the field and the query:
//!
//! ```text
//! similarity = 0.5 + 0.5 × (1 − levenshtein / max_len)
//! ```
//!
//! The node's score is the average of `weight × similarity` over the fields
//! that matched, each tag value counting as its own field:
//!
//! ```text
//! score = Σ(weight × similarity) / matched_fields
//! ```
//!
//! Fields that did not match are left out entirely, so an unrelated meaning
//! never dilutes a text match. A weaker field that does match pulls the
//! average down: an exact text match scores 1.0 alone and less when a tag
//! also contains the query.
//!
//! | Field     | Weight |
//! |-----------|--------|
//! | text      | 1.0    |
//! | meaning   | 0.8    |
//! | phonetic  | 0.6    |
//! | tag value | 0.4    |
//!
//! Results are sorted by score, descending. Equal scores keep input order.
//! Truncation is left to the caller (see [`DEFAULT_MAX_RESULTS`]).

use crate::model::{Node, Tag};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub const DEFAULT_MAX_RESULTS: usize = 50;

pub const TEXT_WEIGHT: f64 = 1.0;
pub const MEANING_WEIGHT: f64 = 0.8;
pub const PHONETIC_WEIGHT: f64 = 0.6;
pub const TAG_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Text,
    Meaning,
    Phonetic,
    Tag,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub node: Node,
    pub score: f64,
    pub matched: Vec<MatchField>,
}

/// Ranks `nodes` against `query`. Nodes without any matching field are dropped.
pub fn rank(nodes: &[Node], query: &str) -> Vec<SearchHit> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = nodes
        .iter()
        .filter_map(|node| score_node(node, &query))
        .collect();

    // sort_by is stable, so ties keep input order
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

fn score_node(node: &Node, query: &str) -> Option<SearchHit> {
    let mut contributions = Vec::new();
    let mut matched = Vec::new();

    let mut consider = |field: MatchField, weight: f64, value: &str| {
        if let Some(similarity) = field_similarity(value, query) {
            contributions.push(weight * similarity);
            if !matched.contains(&field) {
                matched.push(field);
            }
        }
    };

    consider(MatchField::Text, TEXT_WEIGHT, &node.text);
    if let Some(meaning) = &node.meaning {
        consider(MatchField::Meaning, MEANING_WEIGHT, meaning);
    }
    if let Some(phonetic) = &node.phonetic {
        consider(MatchField::Phonetic, PHONETIC_WEIGHT, phonetic);
    }
    for tag in &node.tags {
        consider(MatchField::Tag, TAG_WEIGHT, &tag.value);
    }

    if contributions.is_empty() {
        return None;
    }
    let score = contributions.iter().sum::<f64>() / contributions.len() as f64;
    Some(SearchHit {
        node: node.clone(),
        score,
        matched,
    })
}

/// `None` when `value` does not contain `query` (already lowercased).
fn field_similarity(value: &str, query: &str) -> Option<f64> {
    let value = value.to_lowercase();
    if !value.contains(query) {
        return None;
    }
    let max_len = value.chars().count().max(query.chars().count());
    if max_len == 0 {
        return Some(1.0);
    }
    let distance = levenshtein(&value, query) as f64;
    Some(0.5 + 0.5 * (1.0 - distance / max_len as f64))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Tags relevant to `query`, deduplicated by `(kind, value)` and ordered by tier:
///
/// 1. tags of nodes whose `text` contains the query
/// 2. tags of nodes whose `meaning` overlaps the query (containment or a shared word)
/// 3. tags whose own `value` contains the query
///
/// With `layer` set, only nodes in that layer are considered.
pub fn relevant_tags(nodes: &[Node], query: &str, layer: Option<Uuid>) -> Vec<Tag> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let query_words: HashSet<&str> = query.split_whitespace().collect();

    let scoped: Vec<&Node> = nodes
        .iter()
        .filter(|n| layer.is_none() || n.layer_id == layer)
        .collect();

    let mut out: Vec<Tag> = Vec::new();
    let mut push = |tag: &Tag| {
        if !out.iter().any(|t| t.same_as(tag)) {
            out.push(tag.clone());
        }
    };

    for node in &scoped {
        if node.text.to_lowercase().contains(&query) {
            node.tags.iter().for_each(&mut push);
        }
    }

    for node in &scoped {
        let Some(meaning) = &node.meaning else {
            continue;
        };
        let meaning = meaning.to_lowercase();
        let overlaps = meaning.contains(&query)
            || meaning
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| !word.is_empty() && query_words.contains(word));
        if overlaps {
            node.tags.iter().for_each(&mut push);
        }
    }

    for node in &scoped {
        node.tags
            .iter()
            .filter(|t| t.value.to_lowercase().contains(&query))
            .for_each(&mut push);
    }

    out
}

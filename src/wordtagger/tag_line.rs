//! # Tag Command Lines
//!
//! Bulk tag edits are typed as a single line:
//!
//! ```text
//! <entry text> <kind> <value...> <kind> <value...> ...
//! ```
//!
//! Tokens are whitespace separated. The leading token(s) must spell the target
//! entry's text (case-insensitive; an entry of k words takes k tokens). Every
//! later token is either a *kind token*, one that resolves through the
//! [`TagRegistry`], or a *value token*. Consecutive value tokens are joined with
//! single spaces into the value of the preceding kind. A kind with no values
//! yields no tag, and value tokens before the first kind are ignored.
//!
//! ## Location Values
//!
//! Values of location kinds are tried against three shapes, in order:
//!
//! 1. `name@lat,lon`
//! 2. `@lat,lon[name]`
//! 3. `name` alone, copying coordinates from an already known location tag
//!
//! When nothing matches the tag is still created, without coordinates.
//!
//! The parsed list *replaces* the entry's tags wholesale; it is never merged.

use crate::model::{Coordinates, Tag, TagKind};
use crate::tags::TagRegistry;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagLineError {
    #[error("tag line is empty")]
    Empty,
    #[error("tag line starts with '{found}' but the entry is '{expected}'")]
    EntryMismatch { expected: String, found: String },
}

/// Parses `line` into the replacement tag list for the entry whose text is `entry_text`.
///
/// `known_locations` supplies coordinates for bare location names.
pub fn parse_tag_line(
    line: &str,
    entry_text: &str,
    registry: &TagRegistry,
    known_locations: &[Tag],
) -> Result<Vec<Tag>, TagLineError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(TagLineError::Empty);
    }

    let entry_words: Vec<&str> = entry_text.split_whitespace().collect();
    let head_len = entry_words.len().max(1).min(tokens.len());
    let head = tokens[..head_len].join(" ");
    if head.to_lowercase() != entry_words.join(" ").to_lowercase() {
        return Err(TagLineError::EntryMismatch {
            expected: entry_text.to_string(),
            found: head,
        });
    }

    let mut tags: Vec<Tag> = Vec::new();
    let mut current: Option<(TagKind, Vec<&str>)> = None;

    for &token in &tokens[head_len..] {
        match registry.resolve(token) {
            Some(kind) => {
                if let Some((kind, values)) = current.take() {
                    push_unique(&mut tags, build_tag(kind, &values.join(" "), known_locations));
                }
                current = Some((kind, Vec::new()));
            }
            None => {
                if let Some((_, values)) = current.as_mut() {
                    values.push(token);
                }
            }
        }
    }
    if let Some((kind, values)) = current {
        push_unique(&mut tags, build_tag(kind, &values.join(" "), known_locations));
    }

    Ok(tags)
}

fn push_unique(tags: &mut Vec<Tag>, tag: Option<Tag>) {
    if let Some(tag) = tag {
        if !tags.iter().any(|t| t.same_as(&tag)) {
            tags.push(tag);
        }
    }
}

/// Builds one tag from a kind and its raw value. Location values go through
/// the same three shapes as on a tag line. `None` when the value is blank.
pub fn build_tag(kind: TagKind, raw: &str, known_locations: &[Tag]) -> Option<Tag> {
    let raw = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if raw.is_empty() {
        return None;
    }
    if !kind.is_location() {
        return Some(Tag::new(kind, raw));
    }

    if let Some((name, coordinates)) = parse_named_point(&raw).or_else(|| parse_bracketed_point(&raw))
    {
        return Some(Tag::new(kind, name).with_coordinates(coordinates));
    }

    let known = known_locations.iter().find(|t| {
        t.kind.is_location() && t.coordinates.is_some() && t.value.to_lowercase() == raw.to_lowercase()
    });
    match known.and_then(|t| t.coordinates) {
        Some(coordinates) => Some(Tag::new(kind, raw).with_coordinates(coordinates)),
        None => Some(Tag::new(kind, raw)),
    }
}

/// `name@lat,lon`
fn parse_named_point(raw: &str) -> Option<(String, Coordinates)> {
    let (name, point) = raw.rsplit_once('@')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), parse_lat_lon(point)?))
}

/// `@lat,lon[name]`
fn parse_bracketed_point(raw: &str) -> Option<(String, Coordinates)> {
    let rest = raw.trim().strip_prefix('@')?;
    let (point, name) = rest.split_once('[')?;
    let name = name.strip_suffix(']')?.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), parse_lat_lon(point)?))
}

fn parse_lat_lon(point: &str) -> Option<Coordinates> {
    let (lat, lon) = point.split_once(',')?;
    let coordinates = Coordinates::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
    coordinates.is_valid().then_some(coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PredefinedKind;

    fn root(value: &str) -> Tag {
        Tag::new(TagKind::Predefined(PredefinedKind::Root), value)
    }

    fn memory(value: &str) -> Tag {
        Tag::new(TagKind::Predefined(PredefinedKind::Memory), value)
    }

    fn parse(line: &str, entry: &str) -> Result<Vec<Tag>, TagLineError> {
        parse_tag_line(line, entry, &TagRegistry::default(), &[])
    }

    #[test]
    fn table_of_plain_lines() {
        let cases: Vec<(&str, &str, Vec<Tag>)> = vec![
            ("cat root spect memory assoc", "cat", vec![root("spect"), memory("assoc")]),
            ("cat root spect", "cat", vec![root("spect")]),
            ("cat memory sounds like a hat", "cat", vec![memory("sounds like a hat")]),
            ("CAT root spect", "cat", vec![root("spect")]),
            ("cat root memory assoc", "cat", vec![memory("assoc")]),
            ("cat", "cat", vec![]),
            ("cat stray words root x", "cat", vec![root("x")]),
            ("cat root x root X", "cat", vec![root("x")]),
            ("ice cream root crem", "ice cream", vec![root("crem")]),
        ];

        for (line, entry, expected) in cases {
            let tags = parse(line, entry).unwrap();
            assert_eq!(tags, expected, "line: {line}");
            for (tag, want) in tags.iter().zip(&expected) {
                assert_eq!(tag.value, want.value, "line: {line}");
            }
        }
    }

    #[test]
    fn mismatched_leading_token_fails() {
        assert_eq!(
            parse("dog root spect", "cat"),
            Err(TagLineError::EntryMismatch {
                expected: "cat".into(),
                found: "dog".into()
            })
        );
        assert_eq!(parse("   ", "cat"), Err(TagLineError::Empty));
    }

    #[test]
    fn custom_kinds_resolve_through_registry() {
        let tags = parse("cat ety latin cattus", "cat").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TagKind::Custom("ety".into()));
        assert_eq!(tags[0].value, "latin cattus");
    }

    #[test]
    fn named_point_location() {
        let tags = parse("paris loc tower@48.85,2.29", "paris").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].kind, TagKind::Predefined(PredefinedKind::Location));
        assert_eq!(tags[0].value, "tower");
        assert_eq!(tags[0].coordinates, Some(Coordinates::new(48.85, 2.29)));
    }

    #[test]
    fn single_value_keeps_kind_words() {
        let tag = build_tag(memory("x").kind, "sounds like root beer", &[]).unwrap();
        assert_eq!(tag.value, "sounds like root beer");

        let loc = TagKind::Predefined(PredefinedKind::Location);
        let tag = build_tag(loc.clone(), "@40.41,-3.70[Madrid]", &[]).unwrap();
        assert_eq!(tag.value, "Madrid");
        assert_eq!(tag.coordinates, Some(Coordinates::new(40.41, -3.70)));

        assert!(build_tag(loc, "   ", &[]).is_none());
    }

    #[test]
    fn bracketed_point_location() {
        let tags = parse("x loc @48.85,2.29[tower]", "x").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].value, "tower");
        assert_eq!(tags[0].coordinates, Some(Coordinates::new(48.85, 2.29)));
    }

    #[test]
    fn multi_word_location_names_and_spaced_coordinates() {
        let tags = parse("paris loc eiffel tower@48.85, 2.29", "paris").unwrap();
        assert_eq!(tags[0].value, "eiffel tower");
        assert_eq!(tags[0].coordinates, Some(Coordinates::new(48.85, 2.29)));
    }

    #[test]
    fn bare_location_copies_known_coordinates() {
        let known = vec![Tag::new(TagKind::Predefined(PredefinedKind::Location), "Tower")
            .with_coordinates(Coordinates::new(48.85, 2.29))];
        let tags =
            parse_tag_line("paris loc tower", "paris", &TagRegistry::default(), &known).unwrap();
        assert_eq!(tags[0].value, "tower");
        assert_eq!(tags[0].coordinates, Some(Coordinates::new(48.85, 2.29)));
    }

    #[test]
    fn unknown_location_degrades_to_plain_value() {
        let tags = parse("paris loc somewhere@north", "paris").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].value, "somewhere@north");
        assert!(tags[0].coordinates.is_none());

        let tags = parse("paris loc tower@123.0,2.0", "paris").unwrap();
        assert!(tags[0].coordinates.is_none());
    }
}

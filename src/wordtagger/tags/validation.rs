//! Custom tag key validation.
//!
//! A key has to survive being typed as a single token on a tag line, so:
//! - ASCII letters, digits, underscores (`_`) and hyphens (`-`) only
//! - Must start with a letter
//! - At most 32 characters
//! - Cannot end with a hyphen

use thiserror::Error;

pub const MAX_KEY_LEN: usize = 32;

/// Validates a custom tag key.
///
/// # Examples
/// ```
/// use wordtagger::tags::validation::validate_mapping_key;
///
/// assert!(validate_mapping_key("ety").is_ok());
/// assert!(validate_mapping_key("false-friend").is_ok());
///
/// assert!(validate_mapping_key("").is_err());
/// assert!(validate_mapping_key("9lives").is_err());
/// assert!(validate_mapping_key("two words").is_err());
/// assert!(validate_mapping_key("at@home").is_err());
/// ```
pub fn validate_mapping_key(key: &str) -> Result<(), KeyValidationError> {
    let Some(first) = key.chars().next() else {
        return Err(KeyValidationError::Empty);
    };
    if !first.is_ascii_alphabetic() {
        return Err(KeyValidationError::InvalidStart(first));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(KeyValidationError::TooLong(key.chars().count()));
    }
    if let Some(bad) = key
        .chars()
        .find(|&ch| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'))
    {
        return Err(KeyValidationError::InvalidCharacter(bad));
    }
    if key.ends_with('-') {
        return Err(KeyValidationError::EndsWithHyphen);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyValidationError {
    #[error("tag key cannot be empty")]
    Empty,
    #[error("tag key must start with a letter, found '{0}'")]
    InvalidStart(char),
    #[error("tag key is {0} characters long (max {MAX_KEY_LEN})")]
    TooLong(usize),
    #[error("tag key contains invalid character '{0}' (only letters, digits, underscore and hyphen allowed)")]
    InvalidCharacter(char),
    #[error("tag key cannot end with a hyphen")]
    EndsWithHyphen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_keys() {
        assert!(validate_mapping_key("syn").is_ok());
        assert!(validate_mapping_key("false_friend").is_ok());
        assert!(validate_mapping_key("l2-note").is_ok());
    }

    #[test]
    fn rejects_bad_starts() {
        assert_eq!(
            validate_mapping_key("-x"),
            Err(KeyValidationError::InvalidStart('-'))
        );
        assert_eq!(
            validate_mapping_key("1x"),
            Err(KeyValidationError::InvalidStart('1'))
        );
    }

    #[test]
    fn rejects_token_breaking_characters() {
        assert_eq!(
            validate_mapping_key("a b"),
            Err(KeyValidationError::InvalidCharacter(' '))
        );
        assert_eq!(
            validate_mapping_key("a@b"),
            Err(KeyValidationError::InvalidCharacter('@'))
        );
    }

    #[test]
    fn rejects_trailing_hyphen_and_long_keys() {
        assert_eq!(
            validate_mapping_key("note-"),
            Err(KeyValidationError::EndsWithHyphen)
        );
        let long = "a".repeat(MAX_KEY_LEN + 1);
        assert_eq!(
            validate_mapping_key(&long),
            Err(KeyValidationError::TooLong(MAX_KEY_LEN + 1))
        );
    }
}

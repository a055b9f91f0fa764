//! Identifier validation and sanitization.
//!
//! Every table and column name the loader sends to the warehouse passes through
//! [`canonicalize_identifier`] first. The warehouse folds unquoted identifiers to
//! lower case, caps their byte length and restricts their characters; names
//! that break these rules are rejected unless the configured
//! [`IdentifierPolicy`] says otherwise.
//!
//! # Security
//!
//! Canonical identifiers are additionally quoted with [`quote_identifier`] when
//! interpolated into SQL, so a permissive policy never opens an injection path.

use thiserror::Error;

/// Maximum identifier length in bytes for the reference warehouse
pub const MAX_IDENTIFIER_LENGTH: usize = 127;

/// Errors that can occur during input validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} '{value}' exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        value: String,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} '{value}' contains invalid characters: {reason}")]
    InvalidCharacters {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),

    /// A row lacks a value for one of the stream's key properties
    #[error("record {row} of stream '{stream}' is missing key property '{key}'")]
    MissingKeyValue {
        stream: String,
        key: String,
        row: usize,
    },

    /// Required configuration is absent
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// A value's runtime type matches none of its property's columns
    #[error("record {row} of stream '{stream}': value of '{property}' is a {found}, expected {expected}")]
    ValueTypeMismatch {
        stream: String,
        property: String,
        row: usize,
        found: String,
        expected: String,
    },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// How strictly identifiers are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierPolicy {
    /// Maximum length in bytes
    pub max_length: usize,
    /// Pass names with characters outside `[a-z0-9_$]` through verbatim
    pub allow_invalid_characters: bool,
    /// Replace characters outside `[a-z0-9_$]` with `_`
    pub escape_characters: bool,
    /// Truncate names longer than `max_length` instead of failing
    pub truncate: bool,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self {
            max_length: MAX_IDENTIFIER_LENGTH,
            allow_invalid_characters: false,
            escape_characters: false,
            truncate: false,
        }
    }
}

impl IdentifierPolicy {
    pub fn strict(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$'
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

/// Lower-case and validate a table or column name.
///
/// # Rules
///
/// - Must not be empty
/// - Is folded to lower case
/// - May contain only `a-z`, `0-9`, `_` and `$`, and must start with a letter
///   or underscore (unless the policy escapes or allows invalid characters)
/// - Must not exceed `policy.max_length` bytes (unless the policy truncates)
///
/// # Examples
///
/// ```
/// use target_redshift::validation::input::{IdentifierPolicy, canonicalize_identifier};
///
/// let strict = IdentifierPolicy::default();
/// assert_eq!(canonicalize_identifier("Cats", "table name", &strict).unwrap(), "cats");
/// assert!(canonicalize_identifier("cat-names", "table name", &strict).is_err());
///
/// let escaping = IdentifierPolicy { escape_characters: true, ..strict };
/// assert_eq!(canonicalize_identifier("cat-names", "table name", &escaping).unwrap(), "cat_names");
/// ```
pub fn canonicalize_identifier(
    name: &str,
    field: &'static str,
    policy: &IdentifierPolicy,
) -> ValidationResult<String> {
    if name.is_empty() {
        return Err(ValidationError::Empty(field));
    }

    let mut canonical = name.to_lowercase();

    if let Some(bad) = canonical.chars().find(|c| !is_identifier_char(*c)) {
        if policy.escape_characters {
            canonical = canonical
                .chars()
                .map(|c| if is_identifier_char(c) { c } else { '_' })
                .collect();
        } else if !policy.allow_invalid_characters {
            return Err(ValidationError::InvalidCharacters {
                field,
                value: name.to_string(),
                reason: format!("invalid character: '{}'", bad),
            });
        }
    }

    // Checked above: canonical is non-empty
    let first = canonical.chars().next().unwrap_or('_');
    if !is_identifier_start(first) {
        if policy.escape_characters {
            canonical.insert(0, '_');
        } else if !policy.allow_invalid_characters {
            return Err(ValidationError::InvalidFormat(
                field,
                format!("'{}' must start with a letter or underscore", name),
            ));
        }
    }

    if canonical.len() > policy.max_length {
        if !policy.truncate {
            return Err(ValidationError::TooLong {
                field,
                value: name.to_string(),
                max: policy.max_length,
                actual: canonical.len(),
            });
        }
        canonical = truncate_to_boundary(&canonical, policy.max_length).to_string();
    }

    Ok(canonical)
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Join a canonical base name and a suffix with `__`, keeping the result
/// within `policy.max_length`.
///
/// The suffix is never cut: when the joined name is too long and the policy
/// truncates, the base is shortened instead, so that distinct suffixes keep
/// producing distinct names.
///
/// # Examples
///
/// ```
/// use target_redshift::validation::input::{IdentifierPolicy, suffixed_identifier};
///
/// let policy = IdentifierPolicy { max_length: 10, truncate: true, ..IdentifierPolicy::default() };
/// assert_eq!(suffixed_identifier("name", "s", "column name", &policy).unwrap(), "name__s");
/// assert_eq!(suffixed_identifier("longername", "s", "column name", &policy).unwrap(), "longern__s");
/// ```
pub fn suffixed_identifier(
    base: &str,
    suffix: &str,
    field: &'static str,
    policy: &IdentifierPolicy,
) -> ValidationResult<String> {
    let joined = format!("{}__{}", base, suffix);
    if joined.len() <= policy.max_length {
        return Ok(joined);
    }

    let tail = suffix.len() + 2;
    if !policy.truncate || tail >= policy.max_length {
        return Err(ValidationError::TooLong {
            field,
            value: joined.clone(),
            max: policy.max_length,
            actual: joined.len(),
        });
    }

    let head = truncate_to_boundary(base, policy.max_length - tail);
    Ok(format!("{}__{}", head, suffix))
}

/// Quote an identifier for interpolation into SQL.
///
/// Internal double quotes are escaped by doubling them.
///
/// # Examples
///
/// ```
/// use target_redshift::validation::input::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), "\"users\"");
/// assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> IdentifierPolicy {
        IdentifierPolicy::default()
    }

    #[test]
    fn test_lowercases_valid_names() {
        assert_eq!(canonicalize_identifier("Cats", "table name", &strict()).unwrap(), "cats");
        assert_eq!(
            canonicalize_identifier("_sdc_level_0_id", "column name", &strict()).unwrap(),
            "_sdc_level_0_id"
        );
        assert_eq!(canonicalize_identifier("price$", "column name", &strict()).unwrap(), "price$");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            canonicalize_identifier("", "table name", &strict()),
            Err(ValidationError::Empty("table name"))
        );
    }

    #[test]
    fn test_rejects_invalid_characters() {
        let err = canonicalize_identifier("cat names", "table name", &strict()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCharacters { .. }));

        let err = canonicalize_identifier("1cats", "table name", &strict()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat(..)));
    }

    #[test]
    fn test_allow_invalid_characters_keeps_name() {
        let policy = IdentifierPolicy {
            allow_invalid_characters: true,
            ..strict()
        };
        assert_eq!(
            canonicalize_identifier("Cat Names!", "table name", &policy).unwrap(),
            "cat names!"
        );
        assert_eq!(canonicalize_identifier("1cats", "table name", &policy).unwrap(), "1cats");
    }

    #[test]
    fn test_escape_characters() {
        let policy = IdentifierPolicy {
            escape_characters: true,
            ..strict()
        };
        assert_eq!(
            canonicalize_identifier("Cat Names!", "table name", &policy).unwrap(),
            "cat_names_"
        );
        assert_eq!(canonicalize_identifier("1cats", "table name", &policy).unwrap(), "_1cats");
    }

    #[test]
    fn test_length_limit() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let err = canonicalize_identifier(&long, "column name", &strict()).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 127, actual: 128, .. }));

        let exact = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(canonicalize_identifier(&exact, "column name", &strict()).is_ok());

        let policy = IdentifierPolicy {
            truncate: true,
            ..strict()
        };
        let truncated = canonicalize_identifier(&long, "column name", &policy).unwrap();
        assert_eq!(truncated.len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let policy = IdentifierPolicy {
            max_length: 4,
            allow_invalid_characters: true,
            truncate: true,
            ..strict()
        };
        // 'é' is two bytes; cutting at byte 4 would split the second one
        assert_eq!(canonicalize_identifier("aéé", "column name", &policy).unwrap(), "aé");
    }

    #[test]
    fn test_suffixed_identifier_without_truncation_fails() {
        let policy = IdentifierPolicy::strict(8);
        assert_eq!(suffixed_identifier("abc", "1", "table name", &policy).unwrap(), "abc__1");
        assert!(matches!(
            suffixed_identifier("abcdef", "1", "table name", &policy),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_suffixed_identifier_keeps_suffixes_distinct() {
        let policy = IdentifierPolicy {
            max_length: 8,
            truncate: true,
            ..strict()
        };
        let a = suffixed_identifier("abcdefgh", "s", "column name", &policy).unwrap();
        let b = suffixed_identifier("abcdefgh", "i", "column name", &policy).unwrap();
        assert_eq!(a, "abcde__s");
        assert_eq!(b, "abcde__i");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("cats"), "\"cats\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}

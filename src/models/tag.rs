//! Tag identifiers and format validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum accepted tag length after normalization.
pub const MIN_TAG_LENGTH: usize = 6;

/// Maximum accepted tag length after normalization.
pub const MAX_TAG_LENGTH: usize = 14;

/// A validated RFID tag identifier.
///
/// Always uppercase hexadecimal, 6 to 14 characters, with a numeric
/// value strictly greater than zero. `TagId` is the unit of identity
/// for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Parses a candidate string into a validated tag identifier.
    ///
    /// The candidate is trimmed and upper-cased before the format rules
    /// are applied. Returns `None` if any rule fails.
    #[must_use]
    pub fn parse(candidate: &str) -> Option<Self> {
        let normalized = candidate.trim().to_uppercase();
        if is_valid_tag(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pure format predicate for candidate tags.
///
/// Rules are applied in order; the first failing rule rejects:
///
/// 1. Non-empty after trimming.
/// 2. Length between [`MIN_TAG_LENGTH`] and [`MAX_TAG_LENGTH`] inclusive.
/// 3. Every character is one of `0-9A-F` (lowercase accepted and folded).
/// 4. The base-16 value is strictly greater than zero.
///
/// No side effects and no internal state; safe to call from any thread.
#[must_use]
pub fn is_valid_tag(candidate: &str) -> bool {
    let tag = candidate.trim().to_uppercase();
    if tag.is_empty() {
        return false;
    }
    if tag.len() < MIN_TAG_LENGTH || tag.len() > MAX_TAG_LENGTH {
        return false;
    }
    if !tag.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    // 14 hex digits fit in 56 bits, so u64 cannot overflow here.
    match u64::from_str_radix(&tag, 16) {
        Ok(value) => value > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("53004114", true; "known good tag")]
    #[test_case("00000000", false; "zero value")]
    #[test_case("GG1234", false; "non-hex characters")]
    #[test_case("AB", false; "too short")]
    #[test_case("ABCDEF", true; "minimum length")]
    #[test_case("ABCDEF12345678", true; "maximum length")]
    #[test_case("ABCDEF123456789", false; "over maximum length")]
    #[test_case("", false; "empty")]
    #[test_case("   ", false; "whitespace only")]
    #[test_case("abcdef", true; "lowercase folded")]
    #[test_case("  53004114  ", true; "surrounding whitespace trimmed")]
    #[test_case("000001", true; "smallest nonzero value")]
    fn validate(candidate: &str, expected: bool) {
        assert_eq!(is_valid_tag(candidate), expected);
    }

    #[test]
    fn parse_normalizes() {
        let tag = TagId::parse("  53aa4114 ").unwrap();
        assert_eq!(tag.as_str(), "53AA4114");
        assert_eq!(tag.to_string(), "53AA4114");
    }

    #[test]
    fn parse_rejects_invalid() {
        assert!(TagId::parse("GG1234").is_none());
        assert!(TagId::parse("").is_none());
        assert!(TagId::parse("000000").is_none());
    }
}

//! Permission codes: `resource:action` strings, wildcard patterns and set algebra.
//!
//! A code is two segments matching `[a-zA-Z][a-zA-Z0-9_]*` joined by a single
//! `:`. Patterns may replace exactly one segment with `*`, or be a bare `*`
//! (everything). `*:*` and wildcard-carrying codes are rejected rather than
//! matched.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AuthzError;

pub const SEPARATOR: char = ':';
pub const WILDCARD: &str = "*";

/// Ordered so that listings and cache snapshots are deterministic.
pub type PermissionSet = BTreeSet<String>;

#[allow(clippy::expect_used)]
static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("Invalid regex pattern"));

/// A parsed permission code or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        self.resource == WILDCARD || self.action == WILDCARD
    }

    /// Whether `pattern` grants this concrete code.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionCode` when `pattern` is malformed (including `*:*`).
    pub fn is_granted_by(&self, pattern: &str) -> Result<bool, AuthzError> {
        if pattern == WILDCARD {
            return Ok(true);
        }
        let pattern = parse(pattern)?;
        Ok(if pattern.action == WILDCARD {
            pattern.resource == self.resource
        } else if pattern.resource == WILDCARD {
            pattern.action == self.action
        } else {
            pattern == *self
        })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.resource, self.action)
    }
}

#[must_use]
pub fn encode(resource: &str, action: &str) -> String {
    format!("{resource}{SEPARATOR}{action}")
}

fn split(code: &str) -> Result<(&str, &str), AuthzError> {
    let mut parts = code.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(resource), Some(action), None) => Ok((resource, action)),
        _ => Err(AuthzError::invalid_code(
            code,
            "expected exactly one ':' separator",
        )),
    }
}

fn check_segment(code: &str, segment: &str, allow_wildcard: bool) -> Result<(), AuthzError> {
    if segment.is_empty() {
        return Err(AuthzError::invalid_code(code, "empty segment"));
    }
    if segment == WILDCARD {
        return if allow_wildcard {
            Ok(())
        } else {
            Err(AuthzError::invalid_code(code, "wildcard not allowed here"))
        };
    }
    if SEGMENT.is_match(segment) {
        Ok(())
    } else {
        Err(AuthzError::invalid_code(
            code,
            format!("segment '{segment}' must match [a-zA-Z][a-zA-Z0-9_]*"),
        ))
    }
}

/// Parse a code or single-wildcard pattern into its segments.
///
/// # Errors
///
/// `InvalidPermissionCode` when the separator count is wrong, a segment is empty
/// or malformed, or both segments are wildcards.
pub fn parse(code: &str) -> Result<Permission, AuthzError> {
    let (resource, action) = split(code)?;
    check_segment(code, resource, true)?;
    check_segment(code, action, true)?;
    if resource == WILDCARD && action == WILDCARD {
        return Err(AuthzError::invalid_code(
            code,
            "double wildcard is not supported; use '*'",
        ));
    }
    Ok(Permission {
        resource: resource.to_owned(),
        action: action.to_owned(),
    })
}

/// Parse a concrete code (no wildcards).
///
/// # Errors
///
/// `InvalidPermissionCode` for malformed input or any wildcard segment.
pub fn parse_code(code: &str) -> Result<Permission, AuthzError> {
    let (resource, action) = split(code)?;
    check_segment(code, resource, false)?;
    check_segment(code, action, false)?;
    Ok(Permission {
        resource: resource.to_owned(),
        action: action.to_owned(),
    })
}

/// Validate something that may appear in a grant list: a code, a single-wildcard
/// pattern, or the bare `*`.
///
/// # Errors
///
/// `InvalidPermissionCode` for anything [`parse`] rejects.
pub fn validate_pattern(pattern: &str) -> Result<(), AuthzError> {
    if pattern == WILDCARD {
        return Ok(());
    }
    parse(pattern).map(|_| ())
}

/// # Errors
///
/// The first invalid pattern's `InvalidPermissionCode`.
pub fn validate_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<(), AuthzError> {
    patterns.into_iter().try_for_each(validate_pattern)
}

/// Match a concrete code against a pattern, rejecting undefined inputs.
///
/// # Errors
///
/// `InvalidPermissionCode` when `code` carries a wildcard or is malformed, or
/// when `pattern` is malformed (including `*:*`).
pub fn try_matches(code: &str, pattern: &str) -> Result<bool, AuthzError> {
    parse_code(code)?.is_granted_by(pattern)
}

/// Boolean form of [`try_matches`]: invalid input never matches.
#[must_use]
pub fn matches(code: &str, pattern: &str) -> bool {
    try_matches(code, pattern).unwrap_or(false)
}

/// Returns the first pattern granting `code`. An invalid `code` matches
/// nothing; invalid patterns are skipped.
pub fn find_match<'a, I>(code: &str, patterns: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let code = parse_code(code).ok()?;
    patterns
        .into_iter()
        .map(String::as_str)
        .find(|p| code.is_granted_by(p).unwrap_or(false))
}

#[must_use]
pub fn matches_any<'a, I>(code: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    find_match(code, patterns).is_some()
}

#[must_use]
pub fn union(a: &PermissionSet, b: &PermissionSet) -> PermissionSet {
    a.union(b).cloned().collect()
}

#[must_use]
pub fn subtract(a: &PermissionSet, b: &PermissionSet) -> PermissionSet {
    a.difference(b).cloned().collect()
}

#[must_use]
pub fn intersect(a: &PermissionSet, b: &PermissionSet) -> PermissionSet {
    a.intersection(b).cloned().collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> PermissionSet {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn encode_then_parse() {
        let code = encode("order", "confirm");
        assert_eq!(code, "order:confirm");
        let parsed = parse(&code).unwrap();
        assert_eq!(parsed.resource, "order");
        assert_eq!(parsed.action, "confirm");
        assert!(!parsed.is_pattern());
    }

    #[test]
    fn parse_rejects_malformed_codes() {
        for bad in ["order", "order:", ":confirm", "a:b:c", "1order:read", "order:re-ad", ""] {
            assert!(
                matches!(parse(bad), Err(AuthzError::InvalidPermissionCode { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn parse_accepts_single_wildcard_only() {
        assert!(parse("order:*").unwrap().is_pattern());
        assert!(parse("*:read").unwrap().is_pattern());
        assert!(parse("*:*").is_err());
        assert!(parse_code("order:*").is_err());
    }

    #[test]
    fn wildcard_matching() {
        for code in ["a:b", "order:confirm", "x_1:y_2"] {
            assert!(matches(code, "*"));
        }
        assert!(matches("a:b", "a:*"));
        assert!(matches("a:b", "*:b"));
        assert!(matches("a:b", "a:b"));
        assert!(!matches("a:b", "c:b"));
        assert!(!matches("a:b", "a:c"));
        assert!(!matches("a:b", "c:*"));
    }

    #[test]
    fn undefined_inputs_are_rejected_not_matched() {
        assert!(try_matches("a:b", "*:*").is_err());
        assert!(try_matches("a:*", "a:*").is_err());
        assert!(!matches("a:b", "*:*"));
        assert!(!matches("a:*", "*"));
    }

    #[test]
    fn find_match_returns_granting_pattern() {
        let grants = set(&["product:read", "order:*"]);
        assert_eq!(find_match("order:confirm", &grants), Some("order:*"));
        assert_eq!(find_match("product:delete", &grants), None);

        let mixed = set(&["*:*", "bad code", "*:confirm"]);
        assert_eq!(find_match("order:confirm", &mixed), Some("*:confirm"));
        assert_eq!(find_match("order:*", &set(&["*"])), None);
    }

    #[test]
    fn parsed_code_checks_many_patterns() {
        let code = parse_code("invoice:approve").unwrap();
        assert!(code.is_granted_by("invoice:*").unwrap());
        assert!(code.is_granted_by("*:approve").unwrap());
        assert!(!code.is_granted_by("invoice:read").unwrap());
        assert!(code.is_granted_by("*:*").is_err());
    }

    #[test]
    fn set_algebra() {
        let a = set(&["a:x", "b:y"]);
        let b = set(&["b:y", "c:z"]);
        assert_eq!(union(&a, &b), set(&["a:x", "b:y", "c:z"]));
        assert_eq!(subtract(&a, &b), set(&["a:x"]));
        assert_eq!(intersect(&a, &b), set(&["b:y"]));
    }

    #[test]
    fn validate_patterns_reports_first_bad_entry() {
        assert!(validate_patterns(["*", "order:*", "product:read"]).is_ok());
        let err = validate_patterns(["order:*", "bad code"]).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPermissionCode { code, .. } if code == "bad code"));
    }
}

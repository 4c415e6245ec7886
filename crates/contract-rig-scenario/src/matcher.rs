// crates/contract-rig-scenario/src/matcher.rs
// ============================================================================
// Module: Response Matchers
// Description: Literal, typed-wildcard and regex expectations over JSON.
// Purpose: Evaluate response assertions with subset semantics for objects.
// Dependencies: regex, serde_json
// ============================================================================

//! ## Overview
//! Expectation text parses into a [`Matcher`]:
//! - `<number>`, `<string>`, `<boolean>`, `<array>`, `<object>` check the
//!   runtime type; `<null>` and `<notnull>` check nullity.
//! - `/pattern/` matches the string coercion of the actual value.
//! - Anything that parses as JSON is a literal; JSON strings holding a
//!   wildcard or `/pattern/` become that matcher, so they nest in objects.
//! - Other text is a literal string.
//!
//! Object expectations check only the keys they name. Arrays match
//! element-wise and must have the same length. Scalar literals compare by
//! text across strings, numbers and booleans, so `"2"` and `2` agree.

use std::collections::BTreeMap;
use std::fmt;

use contract_rig_core::AssertionError;
use regex::Regex;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Runtime type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardKind {
    /// Any number.
    Number,
    /// Any string.
    String,
    /// Any boolean.
    Boolean,
    /// Any array.
    Array,
    /// Any object.
    Object,
    /// Exactly null, or absent.
    Null,
    /// Present and not null.
    NotNull,
}

impl WildcardKind {
    /// Token as written in scenarios.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Number => "<number>",
            Self::String => "<string>",
            Self::Boolean => "<boolean>",
            Self::Array => "<array>",
            Self::Object => "<object>",
            Self::Null => "<null>",
            Self::NotNull => "<notnull>",
        }
    }

    /// Parses a `<type>` token.
    fn from_token(token: &str) -> Option<Self> {
        [
            Self::Number,
            Self::String,
            Self::Boolean,
            Self::Array,
            Self::Object,
            Self::Null,
            Self::NotNull,
        ]
        .into_iter()
        .find(|kind| kind.token() == token)
    }

    /// True when `actual` has this type.
    fn accepts(self, actual: Option<&Value>) -> bool {
        match (self, actual) {
            (Self::Null, None | Some(Value::Null)) => true,
            (Self::NotNull, Some(value)) => !value.is_null(),
            (Self::Number, Some(value)) => value.is_number(),
            (Self::String, Some(value)) => value.is_string(),
            (Self::Boolean, Some(value)) => value.is_boolean(),
            (Self::Array, Some(value)) => value.is_array(),
            (Self::Object, Some(value)) => value.is_object(),
            _ => false,
        }
    }
}

/// An expectation over one JSON value.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact value.
    Literal(Value),
    /// Type or nullity check.
    Wildcard(WildcardKind),
    /// Pattern over the string coercion.
    Pattern(Regex),
    /// Subset match over named keys.
    Object(BTreeMap<String, Matcher>),
    /// Element-wise match.
    Array(Vec<Matcher>),
}

/// Expectation text that cannot be turned into a matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expectation `{text}`: {message}")]
pub struct MatcherError {
    /// Offending text.
    pub text: String,
    /// Why it was rejected.
    pub message: String,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

impl Matcher {
    /// Parses expectation text.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] when a `/pattern/` is not a valid regex.
    pub fn parse(text: &str) -> Result<Self, MatcherError> {
        let trimmed = text.trim();
        if let Some(matcher) = Self::from_token(trimmed)? {
            return Ok(matcher);
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::from_json(&value),
            Err(_) => Ok(Self::Literal(Value::String(trimmed.to_string()))),
        }
    }

    /// Builds a matcher from a JSON expectation.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] when a nested `/pattern/` is invalid.
    pub fn from_json(value: &Value) -> Result<Self, MatcherError> {
        match value {
            Value::String(text) => Ok(Self::from_token(text)?.unwrap_or_else(|| Self::Literal(value.clone()))),
            Value::Object(map) => map
                .iter()
                .map(|(key, nested)| Ok((key.clone(), Self::from_json(nested)?)))
                .collect::<Result<BTreeMap<_, _>, MatcherError>>()
                .map(Self::Object),
            Value::Array(items) => {
                items.iter().map(Self::from_json).collect::<Result<Vec<_>, _>>().map(Self::Array)
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Parses a `/regex/` token.
    fn from_token(text: &str) -> Result<Option<Self>, MatcherError> {
        if let Some(kind) = WildcardKind::from_token(text) {
            return Ok(Some(Self::Wildcard(kind)));
        }
        let Some(pattern) = text.strip_prefix('/').and_then(|rest| rest.strip_suffix('/')) else {
            return Ok(None);
        };
        Regex::new(pattern).map(|regex| Some(Self::Pattern(regex))).map_err(|err| MatcherError {
            text: text.to_string(),
            message: err.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

impl Matcher {
    /// Checks `actual` (absent when `None`) located at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AssertionError`] naming the first failing field path.
    pub fn check(&self, path: &str, actual: Option<&Value>) -> Result<(), AssertionError> {
        let mismatch = || AssertionError::new(display_path(path), self.to_string(), render_actual(actual));
        match self {
            Self::Wildcard(kind) => kind.accepts(actual).then_some(()).ok_or_else(mismatch),
            Self::Pattern(regex) => match actual {
                Some(value) if regex.is_match(&coerce(value)) => Ok(()),
                _ => Err(mismatch()),
            },
            Self::Literal(expected) => match actual {
                Some(value) if literal_equals(expected, value) => Ok(()),
                _ => Err(mismatch()),
            },
            Self::Object(fields) => {
                let Some(Value::Object(actual_map)) = actual else {
                    return Err(mismatch());
                };
                fields.iter().try_for_each(|(key, matcher)| {
                    matcher.check(&join_path(path, key), actual_map.get(key))
                })
            }
            Self::Array(items) => {
                let Some(Value::Array(actual_items)) = actual else {
                    return Err(mismatch());
                };
                if actual_items.len() != items.len() {
                    return Err(AssertionError::new(
                        display_path(path),
                        format!("array of {} items", items.len()),
                        format!("array of {} items", actual_items.len()),
                    ));
                }
                items.iter().zip(actual_items).enumerate().try_for_each(|(index, (matcher, value))| {
                    matcher.check(&join_path(path, &index.to_string()), Some(value))
                })
            }
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Wildcard(kind) => f.write_str(kind.token()),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
            Self::Object(fields) => {
                f.write_str("{")?;
                for (index, (key, matcher)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{key}\": {matcher}")?;
                }
                f.write_str("}")
            }
            Self::Array(items) => {
                f.write_str("[")?;
                for (index, matcher) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{matcher}")?;
                }
                f.write_str("]")
            }
        }
    }
}

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Resolves a dot-separated path; numeric segments index arrays. An empty
/// path or `$` addresses the whole document.
#[must_use]
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let path = path.trim();
    if path.is_empty() || path == "$" {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Appends a key or index to a field path.
fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() || base == "$" { segment.to_string() } else { format!("{base}.{segment}") }
}

/// Path shown in messages; the root prints as `$`.
fn display_path(path: &str) -> String {
    if path.is_empty() { "$".to_string() } else { path.to_string() }
}

/// String coercion used by pattern matchers.
#[must_use]
pub fn coerce(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Actual value shown in messages.
fn render_actual(actual: Option<&Value>) -> String {
    actual.map_or_else(|| "<absent>".to_string(), ToString::to_string)
}

/// Literal comparison; numbers compare by value.
fn literal_equals(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::String(text), Value::Number(_) | Value::Bool(_)) => *text == actual.to_string(),
        (Value::Number(_) | Value::Bool(_), Value::String(text)) => *text == expected.to_string(),
        _ => expected == actual,
    }
}

/// Integers compare exactly; floats only when either side is fractional.
fn numbers_equal(left: &Number, right: &Number) -> bool {
    if left.is_f64() || right.is_f64() {
        return match (left.as_f64(), right.as_f64()) {
            (Some(left), Some(right)) => (left - right).abs() < f64::EPSILON,
            _ => false,
        };
    }
    match (left.as_i64(), right.as_i64()) {
        (Some(left), Some(right)) => left == right,
        _ => left.as_u64().is_some() && left.as_u64() == right.as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Matcher;
    use super::MatcherError;
    use super::lookup;

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let doc = json!({"user": {"emails": ["a@x", "b@x"]}});
        assert_eq!(lookup(&doc, "user.emails.1"), Some(&json!("b@x")));
        assert_eq!(lookup(&doc, "user.missing"), None);
        assert_eq!(lookup(&doc, ""), Some(&doc));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(Matcher::parse("/[unclosed/").is_err());
    }

    #[test]
    fn plain_text_is_a_string_literal() -> Result<(), MatcherError> {
        let matcher = Matcher::parse("hello world")?;
        assert!(matcher.check("greeting", Some(&json!("hello world"))).is_ok());
        Ok(())
    }

    #[test]
    fn large_integer_ids_compare_exactly() -> Result<(), MatcherError> {
        let matcher = Matcher::parse("9007199254740993")?;
        assert!(matcher.check("id", Some(&json!(9_007_199_254_740_992_u64))).is_err());
        assert!(matcher.check("id", Some(&json!(9_007_199_254_740_993_u64))).is_ok());
        assert!(Matcher::parse("2.5")?.check("ratio", Some(&json!(2.5))).is_ok());
        assert!(Matcher::parse("3")?.check("count", Some(&json!(3.0))).is_ok());
        Ok(())
    }

    #[test]
    fn string_literal_accepts_equal_number_text() {
        let matcher = Matcher::Literal(json!("42"));
        assert!(matcher.check("id", Some(&json!(42))).is_ok());
        assert!(matcher.check("id", Some(&json!(43))).is_err());
    }
}

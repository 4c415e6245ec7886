// crates/contract-rig-scenario/src/placeholder.rs
// ============================================================================
// Module: Placeholder Substitution
// Description: Generators and back-references inside step arguments.
// Purpose: Let scenarios carry fresh unique data and reuse captured values.
// Dependencies: rand, regex, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Tokens look like `<name>` or `<generator:alias>`:
//! - `<random_token>`, `<timestamp>`, `<uuid>` and `<unique_email>` produce a
//!   fresh value at every occurrence.
//! - `<generator:alias>` produces a value once and stores it under `alias`.
//! - `<name>` resolves to the value captured under `name` earlier in the same
//!   scenario; resolving it twice yields the same value.
//!
//! Unknown tokens are left untouched, so matcher tokens such as `<number>`
//! survive substitution. In JSON mode string values are escaped for a JSON
//! string context and other values are inserted as JSON text, so bodies stay
//! parseable after substitution.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Captures;
use regex::Regex;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Length of `<random_token>` values.
const RANDOM_TOKEN_LEN: usize = 16;

/// Values captured within one scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    /// Stored values by name.
    values: BTreeMap<String, Value>,
}

/// How substituted values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    /// Strings verbatim, other values as JSON text.
    Plain,
    /// Strings JSON-escaped without quotes, other values as JSON text.
    Json,
}

impl Variables {
    /// Stores `value` under `name`, replacing any earlier capture.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Returns the value captured under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Number of captured values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every known token in `text`.
    pub fn substitute(&mut self, text: &str, rendering: Rendering) -> String {
        let Some(pattern) = token_pattern() else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let name = &caps[1];
                let alias = caps.get(2).map(|alias| alias.as_str());
                if let Some(value) = generate(name) {
                    if let Some(alias) = alias {
                        self.insert(alias, Value::String(value.clone()));
                    }
                    return render(&Value::String(value), rendering);
                }
                match (alias, self.values.get(name)) {
                    (None, Some(value)) => render(value, rendering),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Pattern matching `{name}` tokens.
fn token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z_][A-Za-z0-9_]*))?>").ok())
        .as_ref()
}

/// Produces a value for a generator name, or `None` for other names.
#[must_use]
pub fn generate(name: &str) -> Option<String> {
    match name {
        "random_token" => Some(
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(RANDOM_TOKEN_LEN)
                .map(char::from)
                .collect(),
        ),
        "timestamp" => Some(OffsetDateTime::now_utc().unix_timestamp().to_string()),
        "uuid" => Some(Uuid::new_v4().to_string()),
        "unique_email" => Some(format!("rig-{}@contract-rig.test", Uuid::new_v4().simple())),
        _ => None,
    }
}

/// Renders a value for insertion into text.
#[must_use]
pub fn render(value: &Value, rendering: Rendering) -> String {
    match (value, rendering) {
        (Value::String(text), Rendering::Plain) => text.clone(),
        (Value::String(text), Rendering::Json) => {
            let quoted = Value::String(text.clone()).to_string();
            quoted[1 .. quoted.len() - 1].to_string()
        }
        (other, _) => other.to_string(),
    }
}

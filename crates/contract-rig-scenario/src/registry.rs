// crates/contract-rig-scenario/src/registry.rs
// ============================================================================
// Module: Step Registry
// Description: Typed pattern to handler table with specificity scoring.
// Purpose: Resolve each step text to exactly one handler, preferring the
//          most specific pattern.
// Dependencies: futures, regex
// ============================================================================

//! ## Overview
//! Patterns are plain text with typed placeholders:
//! - `{string}` matches a double-quoted string and captures its content,
//! - `{int}` matches an optionally signed integer,
//! - `{word}` matches one run of non-whitespace.
//!
//! Specificity is computed once at registration: more literal words win,
//! then fewer placeholders, then earlier registration. A generic pattern can
//! therefore never absorb a step meant for a more specific one.

use std::cmp::Reverse;

use futures::future::BoxFuture;
use regex::Regex;
use thiserror::Error;

use crate::error::StepError;
use crate::world::ScenarioWorld;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Future returned by step handlers.
pub type StepFuture<'a> = BoxFuture<'a, Result<(), StepError>>;

/// A step implementation.
pub type StepHandler = for<'a> fn(&'a mut ScenarioWorld, &'a StepCall) -> StepFuture<'a>;

/// Arguments handed to a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepCall {
    /// Full step text.
    pub text: String,
    /// Placeholder captures in pattern order.
    pub args: Vec<String>,
    /// Attached data table.
    pub table: Option<Vec<Vec<String>>>,
    /// Attached doc string.
    pub docstring: Option<String>,
}

impl StepCall {
    /// Capture `index` as text.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when the capture is missing.
    pub fn arg(&self, index: usize) -> Result<&str, StepError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| StepError::invalid(format!("missing argument {index} in `{}`", self.text)))
    }

    /// Capture `index` as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when missing or not an integer.
    pub fn int(&self, index: usize) -> Result<i64, StepError> {
        let raw = self.arg(index)?;
        raw.parse().map_err(|_| StepError::invalid(format!("`{raw}` is not an integer")))
    }

    /// The attached table.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when the step has no table.
    pub fn table(&self) -> Result<&[Vec<String>], StepError> {
        self.table
            .as_deref()
            .ok_or_else(|| StepError::invalid(format!("`{}` needs a data table", self.text)))
    }

    /// The attached doc string.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when the step has no doc string.
    pub fn docstring(&self) -> Result<&str, StepError> {
        self.docstring
            .as_deref()
            .ok_or_else(|| StepError::invalid(format!("`{}` needs a doc string", self.text)))
    }
}

/// A registered pattern.
#[derive(Clone)]
pub struct StepDefinition {
    /// Pattern as registered.
    pub pattern: String,
    /// Anchored regex compiled from the pattern.
    regex: Regex,
    /// Literal words outside placeholders.
    literal_words: usize,
    /// Number of placeholders.
    placeholders: usize,
    /// Registration order.
    order: usize,
    /// Step implementation.
    handler: StepHandler,
}

impl StepDefinition {
    /// Score used to pick among matching definitions; larger wins.
    #[must_use]
    pub fn specificity(&self) -> (usize, Reverse<usize>, Reverse<usize>) {
        (self.literal_words, Reverse(self.placeholders), Reverse(self.order))
    }

    /// The handler.
    #[must_use]
    pub fn handler(&self) -> StepHandler {
        self.handler
    }
}

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid step pattern `{pattern}`: {message}")]
pub struct RegistryError {
    /// Offending pattern.
    pub pattern: String,
    /// Compiler message.
    pub message: String,
}

/// Ordered set of step definitions.
#[derive(Clone, Default)]
pub struct StepRegistry {
    /// Definitions in registration order.
    definitions: Vec<StepDefinition>,
}

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Placeholder tokens and the capture groups they compile to.
const PLACEHOLDERS: [(&str, &str); 3] =
    [("{string}", "\"([^\"]*)\""), ("{int}", "(-?\\d+)"), ("{word}", "(\\S+)")];

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern` for `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the compiled pattern is not a valid regex.
    pub fn register(&mut self, pattern: &str, handler: StepHandler) -> Result<(), RegistryError> {
        let (source, placeholders) = compile(pattern);
        let regex = Regex::new(&source).map_err(|err| RegistryError {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        let literal_words = pattern
            .split_whitespace()
            .filter(|word| !PLACEHOLDERS.iter().any(|(token, _)| word.contains(token)))
            .count();
        self.definitions.push(StepDefinition {
            pattern: pattern.to_string(),
            regex,
            literal_words,
            placeholders,
            order: self.definitions.len(),
            handler,
        });
        Ok(())
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resolves `text` to the most specific matching definition and its
    /// captures.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<(&StepDefinition, Vec<String>)> {
        self.definitions
            .iter()
            .filter_map(|definition| {
                let captures = definition.regex.captures(text)?;
                let args = captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect();
                Some((definition, args))
            })
            .max_by_key(|(definition, _)| definition.specificity())
    }
}

/// Turns a pattern into an anchored regex source and counts placeholders.
fn compile(pattern: &str) -> (String, usize) {
    let mut source = String::from("^");
    let mut placeholders = 0;
    let mut rest = pattern;
    while !rest.is_empty() {
        let next = PLACEHOLDERS
            .iter()
            .filter_map(|(token, regex)| rest.find(token).map(|at| (at, *token, *regex)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, token, regex)) => {
                source.push_str(&regex::escape(&rest[.. at]));
                source.push_str(regex);
                placeholders += 1;
                rest = &rest[at + token.len() ..];
            }
            None => {
                source.push_str(&regex::escape(rest));
                rest = "";
            }
        }
    }
    source.push('$');
    (source, placeholders)
}

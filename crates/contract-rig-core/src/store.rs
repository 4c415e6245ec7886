// crates/contract-rig-core/src/store.rs
// ============================================================================
// Module: Fixture Store Seam
// Description: Direct relational access used to establish preconditions.
// Purpose: Let scenarios and per-scenario reset bypass the HTTP layer.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! A [`FixtureStore`] truncates, seeds and counts rows in the sandboxed
//! relational store. Table and column names are validated identifiers; values
//! are passed as text literals and coerced by the store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Fixture store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("fixture store unreachable: {0}")]
    Connect(String),
    /// A statement failed.
    #[error("fixture statement failed: {0}")]
    Statement(String),
    /// A table or column name is not a plain identifier.
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
}

/// Direct relational operations for fixtures and assertions.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    /// Truncates every user table and restarts identity sequences.
    async fn truncate_all(&self) -> Result<(), StoreError>;

    /// Inserts one row of text-literal values.
    async fn insert_row(
        &self,
        table: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Counts rows in `table`.
    async fn count_rows(&self, table: &str) -> Result<u64, StoreError>;

    /// Counts rows whose columns textually equal every given value.
    async fn count_matching(
        &self,
        table: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<u64, StoreError>;

    /// Lists user tables.
    async fn tables(&self) -> Result<Vec<String>, StoreError>;
}

/// Returns true when `name` is safe to splice as an identifier.
///
/// Accepts ASCII letters, digits and underscores, optionally schema-qualified
/// with a single dot, not starting with a digit.
#[must_use]
pub fn is_plain_identifier(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid = |part: &str| {
        !part.is_empty()
            && part.len() <= 63
            && !part.starts_with(|c: char| c.is_ascii_digit())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match (parts.next(), parts.next(), parts.next()) {
        (Some(only), None, None) => valid(only),
        (Some(schema), Some(table), None) => valid(schema) && valid(table),
        _ => false,
    }
}

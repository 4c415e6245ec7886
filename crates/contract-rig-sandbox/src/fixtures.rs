// crates/contract-rig-sandbox/src/fixtures.rs
// ============================================================================
// Module: Relational Fixture Store
// Description: Truncate, seed and count rows in the sandboxed store.
// Purpose: Back per-scenario reset and fixture steps without the HTTP layer.
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! [`FixtureStore`] over a relational endpoint: truncation, seeding, row counts.
//! Table and column names must be plain identifiers before they reach SQL.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use contract_rig_core::FixtureStore;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::StoreError;
use contract_rig_core::is_plain_identifier;

use crate::relational::ExecError;
use crate::relational::RelationalConnector;

/// Lists tables in the default schema.
const LIST_TABLES_SQL: &str =
    "SELECT tablename FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename";

/// [`FixtureStore`] over a [`RelationalConnector`].
pub struct PgFixtureStore {
    /// Connector that runs the statements.
    connector: Arc<dyn RelationalConnector>,
    /// Target store.
    endpoint: RelationalEndpoint,
}

impl PgFixtureStore {
    /// Creates a store bound to `endpoint`.
    #[must_use]
    pub fn new(connector: Arc<dyn RelationalConnector>, endpoint: RelationalEndpoint) -> Self {
        Self {
            connector,
            endpoint,
        }
    }

    /// Runs a query returning one integer.
    async fn scalar(&self, sql: &str) -> Result<u64, StoreError> {
        let rows = self.connector.query_column(&self.endpoint, sql).await.map_err(store_error)?;
        let first = rows.first().ok_or_else(|| StoreError::Statement("no rows".to_string()))?;
        first.trim().parse().map_err(|_| StoreError::Statement(format!("not a count: {first}")))
    }
}

/// Maps a connector error onto the fixture error type.
fn store_error(err: ExecError) -> StoreError {
    match err {
        ExecError::Connect(message) => StoreError::Connect(message),
        ExecError::Statement(message) => StoreError::Statement(message),
    }
}

/// Quotes an identifier, schema-qualified or not.
fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Quotes a text literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes `name` after checking it is a plain identifier.
fn checked(name: &str) -> Result<String, StoreError> {
    if is_plain_identifier(name) {
        Ok(quote_identifier(name))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Renders `INSERT INTO t (c, ...) VALUES ('v', ...)`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] for unsafe names, and
/// [`StoreError::Statement`] for an empty row.
pub fn insert_sql(table: &str, values: &BTreeMap<String, String>) -> Result<String, StoreError> {
    if values.is_empty() {
        return Err(StoreError::Statement(format!("no values for {table}")));
    }
    let table = checked(table)?;
    let columns = values.keys().map(|column| checked(column)).collect::<Result<Vec<_>, _>>()?;
    let literals = values.values().map(|value| quote_literal(value)).collect::<Vec<_>>();
    Ok(format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), literals.join(", ")))
}

/// Renders a count of rows textually matching every value.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] for unsafe names.
pub fn count_matching_sql(
    table: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, StoreError> {
    let table = checked(table)?;
    if values.is_empty() {
        return Ok(format!("SELECT COUNT(*) FROM {table}"));
    }
    let predicates = values
        .iter()
        .map(|(column, value)| Ok(format!("{}::text = {}", checked(column)?, quote_literal(value))))
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(format!("SELECT COUNT(*) FROM {table} WHERE {}", predicates.join(" AND ")))
}

#[async_trait]
impl FixtureStore for PgFixtureStore {
    async fn truncate_all(&self) -> Result<(), StoreError> {
        let tables = self.tables().await?;
        if tables.is_empty() {
            return Ok(());
        }
        let list = tables.iter().map(|table| quote_identifier(table)).collect::<Vec<_>>();
        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", list.join(", "));
        self.connector.execute_batch(&self.endpoint, &sql).await.map_err(store_error)
    }

    async fn insert_row(
        &self,
        table: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let sql = insert_sql(table, values)?;
        self.connector.execute_batch(&self.endpoint, &sql).await.map_err(store_error)
    }

    async fn count_rows(&self, table: &str) -> Result<u64, StoreError> {
        self.scalar(&count_matching_sql(table, &BTreeMap::new())?).await
    }

    async fn count_matching(
        &self,
        table: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<u64, StoreError> {
        self.scalar(&count_matching_sql(table, values)?).await
    }

    async fn tables(&self) -> Result<Vec<String>, StoreError> {
        self.connector.query_column(&self.endpoint, LIST_TABLES_SQL).await.map_err(store_error)
    }
}

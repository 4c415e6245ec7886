// crates/contract-rig-sandbox/src/relational.rs
// ============================================================================
// Module: Relational Connector
// Description: Fresh-connection statement execution against the sandbox store.
// Purpose: Isolate each batch in its own session so one failure cannot poison
//          the next.
// Dependencies: postgres, thiserror, tokio
// ============================================================================

//! ## Overview
//! Every call opens a new connection, runs its statements, and drops the
//! connection. A failed statement aborts only that session. The sync
//! `postgres` client runs on the blocking pool.

use std::time::Duration;

use async_trait::async_trait;
use contract_rig_core::Probe;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::RetryExhausted;
use contract_rig_core::RetryPolicy;
use contract_rig_core::retry_until;
use postgres::NoTls;
use postgres::SimpleQueryMessage;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure of one connector call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The store could not be reached or the session could not open.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The session opened but a statement failed.
    #[error("statement failed: {0}")]
    Statement(String),
}

// ============================================================================
// SECTION: Connector Seam
// ============================================================================

/// Statement execution over a fresh connection per call.
#[async_trait]
pub trait RelationalConnector: Send + Sync {
    /// Runs `sql` (possibly many statements) in a new session.
    async fn execute_batch(&self, endpoint: &RelationalEndpoint, sql: &str)
    -> Result<(), ExecError>;

    /// Runs a query in a new session and returns the first column of each row
    /// as text (`NULL` becomes an empty string).
    async fn query_column(
        &self,
        endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<Vec<String>, ExecError>;
}

// ============================================================================
// SECTION: Postgres Connector
// ============================================================================

/// [`RelationalConnector`] over the sync `postgres` client.
#[derive(Debug, Clone, Copy)]
pub struct PgConnector {
    /// Connect timeout for every new session.
    connect_timeout: Duration,
}

impl PgConnector {
    /// Creates a connector with the given connect timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
        }
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Opens one blocking connection bounded by `timeout`.
fn connect(
    endpoint: &RelationalEndpoint,
    timeout: Duration,
) -> Result<postgres::Client, ExecError> {
    let mut config = postgres::Config::new();
    config
        .host(&endpoint.host)
        .port(endpoint.port)
        .user(&endpoint.credentials.user)
        .password(&endpoint.credentials.password)
        .dbname(&endpoint.database_name)
        .connect_timeout(timeout);
    config.connect(NoTls).map_err(|err| ExecError::Connect(err.to_string()))
}

/// Renders the server message when there is one.
fn statement_message(err: &postgres::Error) -> String {
    err.as_db_error().map_or_else(
        || err.to_string(),
        |db| format!("{} (SQLSTATE {})", db.message(), db.code().code()),
    )
}

#[async_trait]
impl RelationalConnector for PgConnector {
    async fn execute_batch(
        &self,
        endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<(), ExecError> {
        let endpoint = endpoint.clone();
        let sql = sql.to_string();
        let timeout = self.connect_timeout;
        tokio::task::spawn_blocking(move || {
            let mut client = connect(&endpoint, timeout)?;
            client.batch_execute(&sql).map_err(|err| ExecError::Statement(statement_message(&err)))
        })
        .await
        .map_err(|err| ExecError::Connect(format!("blocking task failed: {err}")))?
    }

    async fn query_column(
        &self,
        endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<Vec<String>, ExecError> {
        let endpoint = endpoint.clone();
        let sql = sql.to_string();
        let timeout = self.connect_timeout;
        tokio::task::spawn_blocking(move || {
            let mut client = connect(&endpoint, timeout)?;
            let messages = client
                .simple_query(&sql)
                .map_err(|err| ExecError::Statement(statement_message(&err)))?;
            Ok(messages
                .into_iter()
                .filter_map(|message| match message {
                    SimpleQueryMessage::Row(row) => Some(row.get(0).unwrap_or_default().to_string()),
                    _ => None,
                })
                .collect())
        })
        .await
        .map_err(|err| ExecError::Connect(format!("blocking task failed: {err}")))?
    }
}

// ============================================================================
// SECTION: Readiness
// ============================================================================

/// Polls until the store accepts a session and answers `SELECT 1`.
///
/// # Errors
///
/// Returns [`RetryExhausted`] when the store never answers within `policy`.
pub async fn wait_for_relational(
    connector: &dyn RelationalConnector,
    endpoint: &RelationalEndpoint,
    policy: &RetryPolicy,
) -> Result<(), RetryExhausted> {
    retry_until(policy, "relational store", |_| async move {
        match connector.query_column(endpoint, "SELECT 1").await {
            Ok(_) => Probe::Ready(()),
            Err(err) => Probe::Pending(err.to_string()),
        }
    })
    .await
}

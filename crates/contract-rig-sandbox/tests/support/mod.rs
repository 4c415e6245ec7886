// crates/contract-rig-sandbox/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Result helpers and a scripted connector for sandbox tests.
// ============================================================================
//! ## Overview
//! Result-based assertion helpers so tests read as `ensure(cond, msg)?`.

#![allow(dead_code, reason = "Not every suite uses every helper.")]

use std::error::Error;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use contract_rig_core::Credentials;
use contract_rig_core::KeyValueEndpoint;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::SandboxEndpoints;
use contract_rig_sandbox::ExecError;
use contract_rig_sandbox::RelationalConnector;

/// Standard result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Returns an error carrying `message` when `condition` is false.
///
/// # Errors
/// Returns the message as a boxed error when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition { Ok(()) } else { Err(message.into().into()) }
}

// ============================================================================
// SECTION: Fake Connector
// ============================================================================

/// Scripted connector: records every batch and fails the ones containing a
/// configured needle.
#[derive(Default)]
pub struct FakeConnector {
    /// Batches executed, in order.
    pub batches: Mutex<Vec<String>>,
    /// Queries issued, in order.
    pub queries: Mutex<Vec<String>>,
    /// `(needle, error)` pairs; the first match wins.
    pub failures: Vec<(String, ExecError)>,
    /// `(needle, rows)` pairs answering queries.
    pub answers: Vec<(String, Vec<String>)>,
    /// When true every call fails to connect.
    pub unreachable: bool,
}

impl FakeConnector {
    /// Fails any batch containing `needle` with a statement error.
    #[must_use]
    pub fn failing(mut self, needle: &str, message: &str) -> Self {
        self.failures.push((needle.to_string(), ExecError::Statement(message.to_string())));
        self
    }

    /// Answers any query containing `needle` with `rows`.
    #[must_use]
    pub fn answering(mut self, needle: &str, rows: &[&str]) -> Self {
        self.answers
            .push((needle.to_string(), rows.iter().map(ToString::to_string).collect()));
        self
    }

    /// Snapshot of executed batches.
    pub fn executed(&self) -> Vec<String> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot of issued queries.
    pub fn issued(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RelationalConnector for FakeConnector {
    async fn execute_batch(
        &self,
        _endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<(), ExecError> {
        if self.unreachable {
            return Err(ExecError::Connect("connection refused".to_string()));
        }
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(sql.to_string());
        match self.failures.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn query_column(
        &self,
        _endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<Vec<String>, ExecError> {
        if self.unreachable {
            return Err(ExecError::Connect("connection refused".to_string()));
        }
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).push(sql.to_string());
        Ok(self
            .answers
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_else(|| vec!["1".to_string()]))
    }
}

/// Loopback endpoints for tests that never dial out.
#[must_use]
pub fn loopback_endpoints() -> SandboxEndpoints {
    SandboxEndpoints {
        relational: RelationalEndpoint {
            host: "127.0.0.1".to_string(),
            port: 55_432,
            credentials: Credentials {
                user: "rig".to_string(),
                password: "rig".to_string(),
            },
            database_name: "rig".to_string(),
        },
        key_value: KeyValueEndpoint {
            host: "127.0.0.1".to_string(),
            port: 56_379,
        },
    }
}

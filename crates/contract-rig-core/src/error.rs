// crates/contract-rig-core/src/error.rs
// ============================================================================
// Module: Orchestrator Error Taxonomy
// Description: Fatal setup errors and scenario-scoped failures.
// Purpose: Keep the abort-the-session versus abort-the-scenario split typed.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ProvisioningError`], [`MigrationError`] and [`ReadinessTimeoutError`] are
//! fatal: the session skips straight to teardown. [`NetworkError`] and
//! [`AssertionError`] are scoped to one scenario.

use std::time::Duration;

use thiserror::Error;

use crate::model::Diagnostics;

// ============================================================================
// SECTION: Fatal Errors
// ============================================================================

/// A sandbox or the service under test failed to start.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The relational store could not be started or reached.
    #[error("relational sandbox failed: {0}")]
    Relational(String),
    /// The key-value store could not be started or reached.
    #[error("key-value sandbox failed: {0}")]
    KeyValue(String),
    /// Endpoints were requested before `start`.
    #[error("sandbox not started")]
    NotStarted,
    /// No artifact source produced a runnable service.
    #[error("artifact {artifact} unavailable: {attempts}")]
    ArtifactUnavailable {
        /// Artifact reference that was requested.
        artifact: String,
        /// Summary of every failed resolution attempt.
        attempts: String,
    },
    /// The controller refused to start the service.
    #[error("service launch failed: {0}")]
    Launch(String),
    /// The externally bound port could not be determined.
    #[error("port discovery failed: {0}")]
    PortDiscovery(String),
    /// Releasing a sandbox or the service failed during teardown.
    #[error("teardown failed: {0}")]
    Teardown(String),
}

/// Relational connectivity failure during provisioning.
///
/// Statement-level failures are not errors unless the abort policy is active.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Could not open a connection to the relational store.
    #[error("cannot connect to {endpoint}: {message}")]
    Connect {
        /// Host and port that were dialled.
        endpoint: String,
        /// Driver message.
        message: String,
    },
    /// The manifest exists but could not be read.
    #[error("cannot read manifest {path}: {message}")]
    Manifest {
        /// Manifest path.
        path: String,
        /// IO message.
        message: String,
    },
    /// A unit failed under the abort policy.
    #[error("migration {unit} failed: {message}")]
    UnitFailed {
        /// Unit name.
        unit: String,
        /// Driver message.
        message: String,
    },
}

/// The service never became ready within the attempt budget.
#[derive(Debug, Error)]
#[error(
    "service not ready after {attempts} attempts ({elapsed_ms} ms): {last_observation}\n{diagnostics}"
)]
pub struct ReadinessTimeoutError {
    /// Attempts made.
    pub attempts: u32,
    /// Wall-clock time spent polling, in milliseconds.
    pub elapsed_ms: u128,
    /// What the final probe saw.
    pub last_observation: String,
    /// Diagnostics captured on exhaustion.
    pub diagnostics: Diagnostics,
}

impl ReadinessTimeoutError {
    /// Builds the error from a retry outcome and captured diagnostics.
    #[must_use]
    pub fn new(
        attempts: u32,
        elapsed: Duration,
        last_observation: String,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            attempts,
            elapsed_ms: elapsed.as_millis(),
            last_observation,
            diagnostics,
        }
    }
}

// ============================================================================
// SECTION: Scenario-Scoped Errors
// ============================================================================

/// Why an HTTP call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailureKind {
    /// The enforced request timeout elapsed.
    Timeout,
    /// Nothing accepted the connection.
    ConnectionRefused,
    /// Any other transport failure.
    Other,
}

impl NetworkFailureKind {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::Other => "transport error",
        }
    }
}

/// A single HTTP call to the service failed.
#[derive(Debug, Clone, Error)]
#[error("{method} {path} failed ({}): {message}", .kind.as_str())]
pub struct NetworkError {
    /// Request method.
    pub method: String,
    /// Request path after substitution.
    pub path: String,
    /// Request body after substitution, when one was sent.
    pub body: Option<String>,
    /// Failure classification.
    pub kind: NetworkFailureKind,
    /// Transport message.
    pub message: String,
}

/// A response check did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assertion failed at `{path}`: expected {expected}, got {actual}")]
pub struct AssertionError {
    /// Dot-separated field path, or `status`.
    pub path: String,
    /// Rendered matcher.
    pub expected: String,
    /// Rendered actual value.
    pub actual: String,
}

impl AssertionError {
    /// Builds an assertion error.
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

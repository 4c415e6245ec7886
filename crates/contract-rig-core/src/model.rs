// crates/contract-rig-core/src/model.rs
// ============================================================================
// Module: Orchestrator Data Model
// Description: Endpoint coordinates, migration units, and diagnostics.
// Purpose: Immutable session-scoped values shared across orchestration crates.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Sandbox endpoints are created once per session and never mutated; address
//! computation produces rewritten copies rather than editing them in place.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Sandbox Endpoints
// ============================================================================

/// Login credentials for the relational store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Role name.
    pub user: String,
    /// Role password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection coordinates for the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalEndpoint {
    /// Host reachable from the orchestrator.
    pub host: String,
    /// Mapped port.
    pub port: u16,
    /// Login credentials.
    pub credentials: Credentials,
    /// Database name.
    pub database_name: String,
}

impl RelationalEndpoint {
    /// Returns a `postgres://` connection URL for this endpoint.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.credentials.user,
            self.credentials.password,
            self.host,
            self.port,
            self.database_name
        )
    }
}

/// Connection coordinates for the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueEndpoint {
    /// Host reachable from the orchestrator.
    pub host: String,
    /// Mapped port.
    pub port: u16,
}

impl KeyValueEndpoint {
    /// Returns a `redis://` connection URL for this endpoint.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Coordinates for both sandboxed dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxEndpoints {
    /// Relational store coordinates.
    pub relational: RelationalEndpoint,
    /// Key-value store coordinates.
    pub key_value: KeyValueEndpoint,
}

impl SandboxEndpoints {
    /// Returns a copy with both hosts replaced, keeping ports and credentials.
    #[must_use]
    pub fn with_host(&self, host: &str) -> Self {
        let mut rewritten = self.clone();
        rewritten.relational.host = host.to_string();
        rewritten.key_value.host = host.to_string();
        rewritten
    }
}

// ============================================================================
// SECTION: Migration Units
// ============================================================================

/// A named, ordered unit of schema statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUnit {
    /// Manifest name of the unit.
    pub name: String,
    /// Zero-based position in the manifest.
    pub ordinal: usize,
    /// SQL payload.
    pub payload: String,
}

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

/// Snapshot of the service under test, captured when something goes wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Last lines of the service log.
    pub log_tail: String,
    /// Running-process listing inside the isolation boundary.
    pub processes: String,
    /// Listening-port listing inside the isolation boundary.
    pub listening_ports: String,
}

impl Diagnostics {
    /// Returns true when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log_tail.trim().is_empty()
            && self.processes.trim().is_empty()
            && self.listening_ports.trim().is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- service log tail ---")?;
        writeln!(f, "{}", self.log_tail.trim_end())?;
        writeln!(f, "--- processes ---")?;
        writeln!(f, "{}", self.processes.trim_end())?;
        writeln!(f, "--- listening ports ---")?;
        write!(f, "{}", self.listening_ports.trim_end())
    }
}

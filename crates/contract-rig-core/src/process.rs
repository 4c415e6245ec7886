// crates/contract-rig-core/src/process.rs
// ============================================================================
// Module: Process Controller Seam
// Description: Narrow interface over the isolation mechanism of the service.
// Purpose: Let the launcher drive containers, native processes, or fakes
//          without touching orchestration logic.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! A [`ProcessController`] starts, stops, inspects and execs into one running
//! instance of the service under test. Implementations must treat `stop` on an
//! instance that is already gone as success.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// Where a runnable artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Already present locally.
    Local,
    /// Fetched from a remote source.
    Remote,
    /// Built from source on this host.
    Built,
}

impl ArtifactOrigin {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Built => "built",
        }
    }
}

/// A runnable artifact reference (image tag or executable path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    /// Image reference or executable path.
    pub reference: String,
    /// How it was obtained.
    pub origin: ArtifactOrigin,
}

// ============================================================================
// SECTION: Launch
// ============================================================================

/// Everything a controller needs to start one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Unique instance name, prefixed for leftover cleanup.
    pub name: String,
    /// Artifact to run.
    pub artifact: ResolvedArtifact,
    /// Port the service listens on inside its isolation boundary.
    pub internal_port: u16,
    /// Injected configuration.
    pub env: BTreeMap<String, String>,
    /// Extra `host:address` entries for name resolution inside the boundary.
    pub extra_hosts: Vec<String>,
}

/// Opaque reference to a started instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    /// Controller-specific identifier (container id, pid).
    pub id: String,
    /// Instance name.
    pub name: String,
}

/// Controller failures.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The instance no longer exists.
    #[error("instance {0} not found")]
    NotFound(String),
    /// An external command failed.
    #[error("`{command}` failed: {message}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Captured stderr or spawn error.
        message: String,
    },
    /// The controller does not support the requested operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Lifecycle operations over one isolation mechanism.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Starts an instance and returns its handle.
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ControllerError>;

    /// Stops and removes an instance.
    async fn stop(&self, handle: &ProcessHandle) -> Result<(), ControllerError>;

    /// Returns up to `tail` trailing log lines.
    async fn logs(&self, handle: &ProcessHandle, tail: usize) -> Result<String, ControllerError>;

    /// Runs a command inside the isolation boundary and returns its stdout.
    async fn exec(&self, handle: &ProcessHandle, command: &[&str])
    -> Result<String, ControllerError>;

    /// Reports whether the instance is still alive.
    async fn is_running(&self, handle: &ProcessHandle) -> Result<bool, ControllerError>;

    /// Returns the host port bound for `internal_port`, if known yet.
    async fn external_port(
        &self,
        handle: &ProcessHandle,
        internal_port: u16,
    ) -> Result<Option<u16>, ControllerError>;

    /// Lists instances whose name starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ProcessHandle>, ControllerError>;

    /// Address at which the host's loopback services are reachable from
    /// inside the isolation boundary, or `None` when loopback already works.
    async fn gateway_address(&self) -> Option<String> {
        None
    }
}

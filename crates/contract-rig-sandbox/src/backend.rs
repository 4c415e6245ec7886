// crates/contract-rig-sandbox/src/backend.rs
// ============================================================================
// Module: Sandbox Backend Seam
// Description: How a relational or key-value store gets started.
// Purpose: Let the manager drive containers, external stores, or fakes.
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! Backend seam used by the sandbox manager to start and release stores.

use async_trait::async_trait;
use contract_rig_config::SandboxConfig;
use contract_rig_core::KeyValueEndpoint;
use contract_rig_core::ProvisioningError;
use contract_rig_core::RelationalEndpoint;

/// Releases whatever a backend acquired for one store.
#[async_trait]
pub trait StoreGuard: Send + Sync {
    /// Stops and removes the store.
    async fn release(self: Box<Self>) -> Result<(), String>;
}

/// A started store: its endpoint plus the guard that tears it down.
pub struct StoreLease<E> {
    /// Reachable coordinates.
    pub endpoint: E,
    /// Teardown handle; `None` when the store is not owned by the session.
    guard: Option<Box<dyn StoreGuard>>,
}

impl<E> StoreLease<E> {
    /// A lease whose store outlives the session.
    pub const fn unmanaged(endpoint: E) -> Self {
        Self {
            endpoint,
            guard: None,
        }
    }

    /// A lease released at teardown.
    pub fn guarded(endpoint: E, guard: Box<dyn StoreGuard>) -> Self {
        Self {
            endpoint,
            guard: Some(guard),
        }
    }

    /// Splits into endpoint and guard.
    pub fn into_parts(self) -> (E, Option<Box<dyn StoreGuard>>) {
        (self.endpoint, self.guard)
    }

    /// Releases the store, if owned.
    ///
    /// # Errors
    ///
    /// Returns the backend message when release fails.
    pub async fn release(self) -> Result<(), String> {
        match self.guard {
            Some(guard) => guard.release().await,
            None => Ok(()),
        }
    }
}

/// Starts the two sandboxed dependencies.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// Starts the relational store and waits until it answers.
    async fn start_relational(
        &self,
        config: &SandboxConfig,
    ) -> Result<StoreLease<RelationalEndpoint>, ProvisioningError>;

    /// Starts the key-value store and waits until it answers.
    async fn start_key_value(
        &self,
        config: &SandboxConfig,
    ) -> Result<StoreLease<KeyValueEndpoint>, ProvisioningError>;
}

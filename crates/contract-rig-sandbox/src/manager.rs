// crates/contract-rig-sandbox/src/manager.rs
// ============================================================================
// Module: Dependency Sandbox Manager
// Description: Session-scoped owner of the relational and key-value stores.
// Purpose: Start both stores in parallel, roll back partial starts, and make
//          start and stop idempotent.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! [`SandboxManager`] is constructed explicitly and owned by the session; no
//! process-wide state is involved. `start` returns the existing endpoints when
//! already started, `stop` is a no-op when nothing is running, and a failure
//! to start either store releases the other before the error surfaces.

use std::sync::Arc;

use contract_rig_config::SandboxConfig;
use contract_rig_core::ProvisioningError;
use contract_rig_core::SandboxEndpoints;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::backend::SandboxBackend;
use crate::backend::StoreGuard;
use crate::backend::StoreLease;
use crate::container::ContainerBackend;
use crate::external::ExternalBackend;
use crate::relational::RelationalConnector;

/// Stores started by the current sandbox.
struct RunningSandbox {
    /// Published coordinates.
    endpoints: SandboxEndpoints,
    /// Release guards in start order.
    guards: Vec<(&'static str, Box<dyn StoreGuard>)>,
}

/// Starts, tracks and stops the sandboxed dependencies of one session.
pub struct SandboxManager {
    /// Starts and stops the stores.
    backend: Arc<dyn SandboxBackend>,
    /// Present while the sandbox is up.
    running: Option<RunningSandbox>,
}

impl SandboxManager {
    /// Creates a manager over an explicit backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self {
            backend,
            running: None,
        }
    }

    /// Picks the external backend in reuse mode, containers otherwise.
    #[must_use]
    pub fn for_config(config: &SandboxConfig, connector: Arc<dyn RelationalConnector>) -> Self {
        let backend: Arc<dyn SandboxBackend> = if config.reuse {
            Arc::new(ExternalBackend::new(connector))
        } else {
            Arc::new(ContainerBackend::new(connector))
        };
        Self::new(backend)
    }

    /// Returns true between a successful `start` and the next `stop`.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Starts both stores, or returns the current endpoints if already started.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError`] when either store fails; anything that did
    /// start is released first.
    pub async fn start(
        &mut self,
        config: &SandboxConfig,
    ) -> Result<SandboxEndpoints, ProvisioningError> {
        if let Some(running) = &self.running {
            debug!("sandbox already started; reusing endpoints");
            return Ok(running.endpoints.clone());
        }
        let backend = self.backend.label();
        info!(backend, "starting sandbox");
        let (relational, key_value) = tokio::join!(
            self.backend.start_relational(config),
            self.backend.start_key_value(config)
        );
        match (relational, key_value) {
            (Ok(relational), Ok(key_value)) => {
                let (relational, relational_guard) = relational.into_parts();
                let (key_value, key_value_guard) = key_value.into_parts();
                let mut guards = Vec::new();
                if let Some(guard) = relational_guard {
                    guards.push(("relational", guard));
                }
                if let Some(guard) = key_value_guard {
                    guards.push(("key-value", guard));
                }
                let endpoints = SandboxEndpoints {
                    relational,
                    key_value,
                };
                self.running = Some(RunningSandbox {
                    endpoints: endpoints.clone(),
                    guards,
                });
                Ok(endpoints)
            }
            (Ok(relational), Err(err)) => {
                rollback("relational", relational).await;
                Err(err)
            }
            (Err(err), Ok(key_value)) => {
                rollback("key-value", key_value).await;
                Err(err)
            }
            (Err(err), Err(other)) => {
                warn!(error = %other, "key-value sandbox also failed");
                Err(err)
            }
        }
    }

    /// Returns the endpoints of the running sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::NotStarted`] before `start`.
    pub fn current_endpoints(&self) -> Result<SandboxEndpoints, ProvisioningError> {
        self.running
            .as_ref()
            .map(|running| running.endpoints.clone())
            .ok_or(ProvisioningError::NotStarted)
    }

    /// Releases every owned store. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Teardown`] listing stores that failed to
    /// release; the manager is stopped either way.
    pub async fn stop(&mut self) -> Result<(), ProvisioningError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let mut failures = Vec::new();
        for (label, guard) in running.guards.into_iter().rev() {
            if let Err(err) = guard.release().await {
                warn!(store = label, error = %err, "sandbox release failed");
                failures.push(format!("{label}: {err}"));
            }
        }
        info!("sandbox stopped");
        if failures.is_empty() { Ok(()) } else { Err(ProvisioningError::Teardown(failures.join("; "))) }
    }
}

/// Releases a store that started before a later one failed.
async fn rollback<E>(label: &str, lease: StoreLease<E>) {
    warn!(store = label, "rolling back partially started sandbox");
    if let Err(err) = lease.release().await {
        warn!(store = label, error = %err, "rollback release failed");
    }
}

// crates/contract-rig-launcher/src/launcher.rs
// ============================================================================
// Module: Service Launcher
// Description: Boots the service under test against sandboxed dependencies.
// Purpose: Drive Resolving -> Starting -> Polling -> Ready, capture
//          diagnostics on failure, and stop cleanly from any state.
// Dependencies: reqwest, serde, thiserror, tracing, uuid
// ============================================================================

//! ## Overview
//! [`ServiceLauncher::start`] runs seven steps:
//! 1. remove leftovers from aborted runs by name prefix (best-effort),
//! 2. resolve the artifact through the local/remote/build chain,
//! 3. rewrite loopback dependency hosts to the controller's gateway,
//! 4. launch with an ephemeral external port and injected configuration,
//! 5. discover the bound port, failing fast when it is unknown,
//! 6. poll liveness plus an HTTP request on the readiness path,
//! 7. confirm the primary process is present (warning only).
//!
//! Steps 4-6 are fatal on failure. At most one instance is tracked; a failed
//! instance stays tracked so `stop` can remove it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use contract_rig_config::ControllerKind;
use contract_rig_config::ServiceConfig;
use contract_rig_core::ControllerError;
use contract_rig_core::Diagnostics;
use contract_rig_core::LaunchSpec;
use contract_rig_core::Probe;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use contract_rig_core::ProvisioningError;
use contract_rig_core::ReadinessTimeoutError;
use contract_rig_core::RetryPolicy;
use contract_rig_core::SandboxEndpoints;
use contract_rig_core::retry_until;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::address::endpoints_for_service;
use crate::address::extra_hosts_for;
use crate::artifact::ArtifactResolver;
use crate::artifact::resolve_artifact;
use crate::diagnostics::capture_diagnostics;
use crate::diagnostics::primary_process_present;
use crate::docker::DockerController;
use crate::injection::service_env;
use crate::native::NativeController;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Lifecycle state of the service under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Obtaining a runnable artifact.
    Resolving,
    /// Launching the instance.
    Starting,
    /// Waiting for readiness signals.
    Polling,
    /// Answering requests.
    Ready,
    /// Setup failed.
    Failed,
    /// Terminated and removed.
    Stopped,
}

impl ServiceStatus {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Starting => "starting",
            Self::Polling => "polling",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// A launched service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInstance {
    /// Controller handle.
    pub handle: ProcessHandle,
    /// Host port bound for the service.
    pub external_port: u16,
    /// Dependency host as seen from inside the service's boundary.
    pub internal_target_address: String,
    /// Base URL reachable from the orchestrator.
    pub base_url: String,
    /// Current state.
    pub status: ServiceStatus,
}

/// Fatal launcher failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Artifact, launch or port discovery failed.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    /// The service never became ready.
    #[error(transparent)]
    Readiness(Box<ReadinessTimeoutError>),
}

// ============================================================================
// SECTION: Launcher
// ============================================================================

/// Starts and stops one service instance per session.
pub struct ServiceLauncher {
    /// Starts and stops the service process.
    controller: Arc<dyn ProcessController>,
    /// Supplies the artifact to run.
    resolver: Arc<dyn ArtifactResolver>,
    /// Service settings.
    config: ServiceConfig,
    /// Client used for health polling.
    client: reqwest::Client,
    /// Current lifecycle state.
    status: ServiceStatus,
    /// Running instance, if any.
    instance: Option<ServiceInstance>,
}

impl ServiceLauncher {
    /// Creates a launcher over an explicit controller and artifact resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Launch`] when the probe client cannot be built.
    pub fn new(
        controller: Arc<dyn ProcessController>,
        resolver: Arc<dyn ArtifactResolver>,
        config: ServiceConfig,
    ) -> Result<Self, ProvisioningError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.readiness.probe_timeout_ms))
            .build()
            .map_err(|err| ProvisioningError::Launch(format!("probe client: {err}")))?;
        Ok(Self {
            controller,
            resolver,
            config,
            client,
            status: ServiceStatus::Stopped,
            instance: None,
        })
    }

    /// Creates a launcher with the controller selected by `config.controller`.
    /// Native instance logs are written under `run_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Launch`] when the probe client cannot be built.
    pub fn for_config(config: ServiceConfig, run_dir: &Path) -> Result<Self, ProvisioningError> {
        match config.controller {
            ControllerKind::Docker => {
                let docker = Arc::new(DockerController::from_config(&config));
                Self::new(docker.clone(), docker, config)
            }
            ControllerKind::Native => {
                let native =
                    Arc::new(NativeController::from_config(&config, run_dir.join("service-logs")));
                Self::new(native.clone(), native, config)
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> ServiceStatus {
        self.status
    }

    /// The tracked instance, if any.
    #[must_use]
    pub const fn instance(&self) -> Option<&ServiceInstance> {
        self.instance.as_ref()
    }

    /// Moves to `next` and logs the change.
    fn transition(&mut self, next: ServiceStatus) {
        debug!(from = self.status.as_str(), to = next.as_str(), "service state transition");
        self.status = next;
        if let Some(instance) = self.instance.as_mut() {
            instance.status = next;
        }
    }

    /// Marks the launcher failed and passes `err` through.
    fn fail<E>(&mut self, err: E) -> LaunchError
    where
        LaunchError: From<E>,
    {
        self.transition(ServiceStatus::Failed);
        LaunchError::from(err)
    }

    /// Launches the service and waits for readiness.
    ///
    /// Returns the existing instance when one is already ready.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when any fatal step fails.
    pub async fn start(&mut self, endpoints: &SandboxEndpoints) -> Result<ServiceInstance, LaunchError> {
        if let Some(instance) = self.instance.as_ref().filter(|i| i.status == ServiceStatus::Ready) {
            return Ok(instance.clone());
        }
        self.stop().await;
        self.transition(ServiceStatus::Resolving);
        self.remove_leftovers().await;
        let artifact = match resolve_artifact(&*self.resolver).await {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.fail(err)),
        };

        self.transition(ServiceStatus::Starting);
        let gateway = self.controller.gateway_address().await;
        let target = endpoints_for_service(endpoints, gateway.as_deref());
        let name = format!("{}-{}", self.config.name_prefix, Uuid::new_v4().simple());
        let spec = LaunchSpec {
            name: name.clone(),
            artifact,
            internal_port: self.config.internal_port,
            env: service_env(&self.config, &target),
            extra_hosts: extra_hosts_for(gateway.as_deref()),
        };
        info!(instance = %name, reference = %spec.artifact.reference, dependency_host = %target.relational.host, "launching service");
        let handle = match self.controller.start(&spec).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(ProvisioningError::Launch(err.to_string()))),
        };

        let external_port = match self.controller.external_port(&handle, self.config.internal_port).await {
            Ok(Some(port)) => port,
            Ok(None) => {
                self.discard(&handle).await;
                return Err(self.fail(ProvisioningError::PortDiscovery(format!(
                    "no host port bound for {}/tcp on {name}",
                    self.config.internal_port
                ))));
            }
            Err(err) => {
                self.discard(&handle).await;
                return Err(self.fail(ProvisioningError::PortDiscovery(err.to_string())));
            }
        };
        let base_url = format!("http://127.0.0.1:{external_port}");
        self.instance = Some(ServiceInstance {
            handle: handle.clone(),
            external_port,
            internal_target_address: target.relational.host.clone(),
            base_url: base_url.clone(),
            status: ServiceStatus::Starting,
        });

        self.transition(ServiceStatus::Polling);
        if let Err(err) = self.wait_until_ready(&handle, &base_url).await {
            self.transition(ServiceStatus::Failed);
            return Err(LaunchError::Readiness(Box::new(err)));
        }
        self.transition(ServiceStatus::Ready);
        info!(instance = %name, %base_url, "service ready");

        match primary_process_present(&*self.controller, &handle, &self.config.process_name).await {
            Some(true) => debug!(process = %self.config.process_name, "primary process confirmed"),
            Some(false) => warn!(
                process = %self.config.process_name,
                "service answered but its primary process is not listed; readiness may be a false positive"
            ),
            None => warn!(process = %self.config.process_name, "could not list processes to confirm readiness"),
        }
        let instance = self
            .instance
            .clone()
            .ok_or_else(|| ProvisioningError::Launch("instance vanished during start".to_string()))?;
        Ok(instance)
    }

    /// Polls the health endpoint until it answers, the attempts run out, or the process dies.
    async fn wait_until_ready(
        &self,
        handle: &ProcessHandle,
        base_url: &str,
    ) -> Result<(), ReadinessTimeoutError> {
        let readiness = &self.config.readiness;
        let policy = RetryPolicy {
            max_attempts: readiness.max_attempts,
            interval: readiness.interval(),
            verbose_every: readiness.verbose_every,
        };
        let url = format!("{base_url}{}", readiness.path);
        let controller = &*self.controller;
        let client = &self.client;
        let url = url.as_str();
        let outcome = retry_until(&policy, "service readiness", |_| async move {
            match controller.is_running(handle).await {
                Ok(true) => {}
                Ok(false) => return Probe::Abandon("process exited before becoming ready".to_string()),
                Err(err) => return Probe::Pending(format!("liveness check failed: {err}")),
            }
            match client.get(url).send().await {
                Ok(response) => Probe::Ready(response.status().as_u16()),
                Err(err) => Probe::Pending(format!("GET {url}: {err}")),
            }
        })
        .await;
        match outcome {
            Ok(status) => {
                debug!(status, "readiness probe answered");
                Ok(())
            }
            Err(exhausted) => {
                let diagnostics =
                    capture_diagnostics(controller, handle, self.config.log_tail_lines).await;
                warn!(
                    attempts = exhausted.attempts,
                    abandoned = exhausted.abandoned,
                    observation = %exhausted.last_observation,
                    "service never became ready"
                );
                Err(ReadinessTimeoutError::new(
                    exhausted.attempts,
                    exhausted.elapsed,
                    exhausted.last_observation,
                    diagnostics,
                ))
            }
        }
    }

    /// Captures diagnostics for the tracked instance, if any.
    pub async fn diagnostics(&self) -> Option<Diagnostics> {
        let instance = self.instance.as_ref()?;
        Some(capture_diagnostics(&*self.controller, &instance.handle, self.config.log_tail_lines).await)
    }

    /// Stops and removes the tracked instance. Never fails; an instance that is
    /// already gone counts as stopped.
    pub async fn stop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.discard(&instance.handle).await;
            info!(instance = %instance.handle.name, "service stopped");
        }
        self.status = ServiceStatus::Stopped;
    }

    /// Stops a process that never became ready.
    async fn discard(&self, handle: &ProcessHandle) {
        match self.controller.stop(handle).await {
            Ok(()) | Err(ControllerError::NotFound(_)) => {}
            Err(err) => warn!(instance = %handle.name, error = %err, "failed to stop service instance"),
        }
    }

    /// Stops instances left behind by an earlier run.
    async fn remove_leftovers(&self) {
        let leftovers = match self.controller.list_by_prefix(&self.config.name_prefix).await {
            Ok(leftovers) => leftovers,
            Err(err) => {
                debug!(error = %err, "leftover listing failed; continuing");
                return;
            }
        };
        for handle in leftovers {
            info!(instance = %handle.name, "removing leftover instance");
            self.discard(&handle).await;
        }
    }
}

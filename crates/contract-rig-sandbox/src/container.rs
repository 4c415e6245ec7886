// crates/contract-rig-sandbox/src/container.rs
// ============================================================================
// Module: Container Sandbox Backend
// Description: Disposable Postgres and Redis containers via testcontainers.
// Purpose: Give each session fresh stores on ephemeral host ports.
// Dependencies: testcontainers, tokio, tracing
// ============================================================================

//! ## Overview
//! Containers publish their store port on a random host port; no fixed,
//! well-known port is ever bound. The relational container is considered
//! started only after it answers `SELECT 1` through the connector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use contract_rig_config::SandboxConfig;
use contract_rig_core::Credentials;
use contract_rig_core::KeyValueEndpoint;
use contract_rig_core::ProvisioningError;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::RetryPolicy;
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::ImageExt;
use testcontainers::core::IntoContainerPort;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use tracing::info;
use tracing::warn;

use crate::backend::SandboxBackend;
use crate::backend::StoreGuard;
use crate::backend::StoreLease;
use crate::relational::RelationalConnector;
use crate::relational::wait_for_relational;

/// Port Postgres listens on inside its container.
const RELATIONAL_PORT: u16 = 5432;
/// Port Redis listens on inside its container.
const KEY_VALUE_PORT: u16 = 6379;
/// Host the published ports are reachable on.
const LOOPBACK: &str = "127.0.0.1";

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Removes one container on release.
struct ContainerGuard {
    /// Store label for logs.
    label: &'static str,
    /// Running container.
    container: ContainerAsync<GenericImage>,
}

#[async_trait]
impl StoreGuard for ContainerGuard {
    async fn release(self: Box<Self>) -> Result<(), String> {
        let label = self.label;
        self.container.rm().await.map_err(|err| format!("failed to remove {label}: {err}"))?;
        info!(store = label, "sandbox container removed");
        Ok(())
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Starts each store as a throwaway container.
pub struct ContainerBackend {
    /// Connector used to wait for readiness.
    connector: Arc<dyn RelationalConnector>,
}

impl ContainerBackend {
    /// Creates a backend that verifies the relational store through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn RelationalConnector>) -> Self {
        Self {
            connector,
        }
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn label(&self) -> &'static str {
        "container"
    }

    async fn start_relational(
        &self,
        config: &SandboxConfig,
    ) -> Result<StoreLease<RelationalEndpoint>, ProvisioningError> {
        ensure_docker_available().await.map_err(ProvisioningError::Relational)?;
        let container = GenericImage::new(&config.relational_image, &config.relational_tag)
            .with_exposed_port(RELATIONAL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", config.user.clone())
            .with_env_var("POSTGRES_PASSWORD", config.password.clone())
            .with_env_var("POSTGRES_DB", config.database.clone())
            .start()
            .await
            .map_err(|err| {
                ProvisioningError::Relational(format!("failed to start postgres container: {err}"))
            })?;
        let port = match container.get_host_port_ipv4(RELATIONAL_PORT.tcp()).await {
            Ok(port) => port,
            Err(err) => {
                discard(container, "relational").await;
                return Err(ProvisioningError::Relational(format!(
                    "failed to resolve postgres port: {err}"
                )));
            }
        };
        let endpoint = RelationalEndpoint {
            host: LOOPBACK.to_string(),
            port,
            credentials: Credentials {
                user: config.user.clone(),
                password: config.password.clone(),
            },
            database_name: config.database.clone(),
        };
        let policy = RetryPolicy::new(
            config.connect_attempts,
            Duration::from_millis(config.connect_interval_ms),
        );
        if let Err(exhausted) = wait_for_relational(&*self.connector, &endpoint, &policy).await {
            discard(container, "relational").await;
            return Err(ProvisioningError::Relational(format!(
                "postgres not answering after {} attempts: {}",
                exhausted.attempts, exhausted.last_observation
            )));
        }
        info!(port, "relational sandbox ready");
        Ok(StoreLease::guarded(
            endpoint,
            Box::new(ContainerGuard {
                label: "relational",
                container,
            }),
        ))
    }

    async fn start_key_value(
        &self,
        config: &SandboxConfig,
    ) -> Result<StoreLease<KeyValueEndpoint>, ProvisioningError> {
        ensure_docker_available().await.map_err(ProvisioningError::KeyValue)?;
        let container = GenericImage::new(&config.kv_image, &config.kv_tag)
            .with_exposed_port(KEY_VALUE_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .start()
            .await
            .map_err(|err| {
                ProvisioningError::KeyValue(format!("failed to start redis container: {err}"))
            })?;
        let port = match container.get_host_port_ipv4(KEY_VALUE_PORT.tcp()).await {
            Ok(port) => port,
            Err(err) => {
                discard(container, "key-value").await;
                return Err(ProvisioningError::KeyValue(format!(
                    "failed to resolve redis port: {err}"
                )));
            }
        };
        info!(port, "key-value sandbox ready");
        Ok(StoreLease::guarded(
            KeyValueEndpoint {
                host: LOOPBACK.to_string(),
                port,
            },
            Box::new(ContainerGuard {
                label: "key-value",
                container,
            }),
        ))
    }
}

/// Removes a container that failed to become ready.
async fn discard(container: ContainerAsync<GenericImage>, label: &str) {
    if let Err(err) = container.rm().await {
        warn!(store = label, error = %err, "failed to remove container after start failure");
    }
}

/// Fails fast when the docker daemon is not reachable.
///
/// # Errors
///
/// Returns the `docker info` failure message.
pub async fn ensure_docker_available() -> Result<(), String> {
    let output = tokio::process::Command::new("docker")
        .arg("info")
        .output()
        .await
        .map_err(|err| format!("docker info failed: {err}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("docker info failed: {stderr}"));
    }
    Ok(())
}

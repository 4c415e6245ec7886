// system-tests/src/harness.rs
// ============================================================================
// Module: Session Harness
// Description: Session parts that launch the in-process users service.
// Purpose: Drive the real lifecycle controller end to end while the service
//          and, optionally, the stores stay in process.
// Dependencies: async-trait, contract-rig-cli, contract-rig-launcher,
//               contract-rig-sandbox
// ============================================================================

//! ## Overview
//! [`InProcessController`] "launches" a service by reporting the port of a
//! stub that is already listening, so the launcher still resolves an
//! artifact, injects configuration, discovers the port and polls readiness.
//! At launch the controller reads the injected relational coordinates and
//! binds a fixture store into the stub, so registrations land in whichever
//! store the session provisioned.
//! [`LoopbackBackend`] and [`ScratchConnector`] stand in for the stores when
//! docker is unavailable.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use contract_rig_cli::SessionParts;
use contract_rig_config::RigConfig;
use contract_rig_config::SandboxConfig;
use contract_rig_config::ServiceEnvNames;
use contract_rig_core::ArtifactOrigin;
use contract_rig_core::ControllerError;
use contract_rig_core::Credentials;
use contract_rig_core::KeyValueEndpoint;
use contract_rig_core::LaunchSpec;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use contract_rig_core::ProvisioningError;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::ResolvedArtifact;
use contract_rig_launcher::ArtifactResolver;
use contract_rig_launcher::ServiceLauncher;
use contract_rig_sandbox::ExecError;
use contract_rig_sandbox::PgFixtureStore;
use contract_rig_sandbox::RelationalConnector;
use contract_rig_sandbox::SandboxBackend;
use contract_rig_sandbox::SandboxManager;
use contract_rig_sandbox::StoreGuard;
use contract_rig_sandbox::StoreLease;

use crate::stub::StoreSlot;
use crate::stub::UsersService;

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Where the launched stub persists, and how it finds its store.
struct Persistence {
    /// Slot the service reads its store from.
    slot: StoreSlot,
    /// Connector backing the bound store.
    connector: Arc<dyn RelationalConnector>,
    /// Variable names the launcher injects.
    names: ServiceEnvNames,
}

/// Process controller fronting an already-listening in-process service.
pub struct InProcessController {
    /// Port of the in-process service.
    port: u16,
    /// Store binding applied on start, when persisting.
    persistence: Option<Persistence>,
    /// Launch specs received, in order.
    launches: Mutex<Vec<LaunchSpec>>,
    /// Number of stop calls.
    stops: AtomicU32,
}

impl InProcessController {
    /// Controller whose "process" listens on `port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            persistence: None,
            launches: Mutex::new(Vec::new()),
            stops: AtomicU32::new(0),
        }
    }

    /// Controller fronting `service` that binds its store from the injected
    /// relational coordinates on every launch.
    #[must_use]
    pub fn persisting(service: &UsersService, connector: Arc<dyn RelationalConnector>, names: ServiceEnvNames) -> Self {
        Self {
            persistence: Some(Persistence {
                slot: service.store_slot(),
                connector,
                names,
            }),
            ..Self::new(service.port())
        }
    }

    /// Launch specs received, in order.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of stop calls.
    #[must_use]
    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessController for InProcessController {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ControllerError> {
        self.launches.lock().unwrap_or_else(PoisonError::into_inner).push(spec.clone());
        if let Some(persistence) = &self.persistence {
            let endpoint = injected_relational(&spec.env, &persistence.names)?;
            persistence.slot.bind(Arc::new(PgFixtureStore::new(Arc::clone(&persistence.connector), endpoint)));
        }
        Ok(ProcessHandle {
            id: format!("in-process-{}", spec.name),
            name: spec.name.clone(),
        })
    }

    async fn stop(&self, _handle: &ProcessHandle) -> Result<(), ControllerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(persistence) = &self.persistence {
            persistence.slot.unbind();
        }
        Ok(())
    }

    async fn logs(&self, handle: &ProcessHandle, _tail: usize) -> Result<String, ControllerError> {
        Ok(format!("{}: serving on 127.0.0.1:{}", handle.name, self.port))
    }

    async fn exec(&self, handle: &ProcessHandle, command: &[&str]) -> Result<String, ControllerError> {
        match command.first() {
            Some(&"ps") => Ok(format!("1 {}", handle.name)),
            _ => Err(ControllerError::Unsupported("in-process service has no shell".to_string())),
        }
    }

    async fn is_running(&self, _handle: &ProcessHandle) -> Result<bool, ControllerError> {
        Ok(true)
    }

    async fn external_port(
        &self,
        _handle: &ProcessHandle,
        _internal_port: u16,
    ) -> Result<Option<u16>, ControllerError> {
        Ok(Some(self.port))
    }

    async fn list_by_prefix(&self, _prefix: &str) -> Result<Vec<ProcessHandle>, ControllerError> {
        Ok(Vec::new())
    }
}

/// Relational coordinates the launcher injected into the service env.
fn injected_relational(
    env: &BTreeMap<String, String>,
    names: &ServiceEnvNames,
) -> Result<RelationalEndpoint, ControllerError> {
    let read = |name: &String| {
        env.get(name).cloned().ok_or_else(|| ControllerError::Command {
            command: "in-process launch".to_string(),
            message: format!("{name} not injected"),
        })
    };
    let port = read(&names.relational_port)?;
    Ok(RelationalEndpoint {
        host: read(&names.relational_host)?,
        port: port.parse().map_err(|_| ControllerError::Command {
            command: "in-process launch".to_string(),
            message: format!("{} is not a port: {port}", names.relational_port),
        })?,
        credentials: Credentials {
            user: read(&names.relational_user)?,
            password: read(&names.relational_password)?,
        },
        database_name: read(&names.relational_database)?,
    })
}

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// Resolver that finds a prebuilt artifact locally, or finds nothing anywhere.
pub struct StubArtifact {
    /// Whether the artifact resolves.
    present: bool,
}

impl StubArtifact {
    /// An artifact present locally.
    #[must_use]
    pub const fn present() -> Self {
        Self {
            present: true,
        }
    }

    /// An artifact no source can produce.
    #[must_use]
    pub const fn unreachable() -> Self {
        Self {
            present: false,
        }
    }
}

#[async_trait]
impl ArtifactResolver for StubArtifact {
    fn artifact_name(&self) -> String {
        "users-service:contract".to_string()
    }

    async fn find_local(&self) -> Result<ResolvedArtifact, String> {
        if self.present {
            return Ok(ResolvedArtifact {
                reference: self.artifact_name(),
                origin: ArtifactOrigin::Local,
            });
        }
        Err("image users-service:contract not present".to_string())
    }

    async fn fetch_remote(&self) -> Result<ResolvedArtifact, String> {
        Err("registry.invalid unreachable".to_string())
    }

    async fn build_from_source(&self) -> Result<ResolvedArtifact, String> {
        Err("no build context configured".to_string())
    }
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Counts releases.
struct ReleaseCounter(Arc<AtomicU32>);

#[async_trait]
impl StoreGuard for ReleaseCounter {
    async fn release(self: Box<Self>) -> Result<(), String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend handing out fixed loopback endpoints and counting releases.
#[derive(Default)]
pub struct LoopbackBackend {
    /// Shared release counter.
    releases: Arc<AtomicU32>,
}

impl LoopbackBackend {
    /// Shared release counter.
    #[must_use]
    pub fn releases(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.releases)
    }
}

#[async_trait]
impl SandboxBackend for LoopbackBackend {
    fn label(&self) -> &'static str {
        "loopback"
    }

    async fn start_relational(
        &self,
        config: &SandboxConfig,
    ) -> Result<StoreLease<RelationalEndpoint>, ProvisioningError> {
        let endpoint = RelationalEndpoint {
            host: "127.0.0.1".to_string(),
            port: 5432,
            credentials: Credentials {
                user: config.user.clone(),
                password: config.password.clone(),
            },
            database_name: config.database.clone(),
        };
        Ok(StoreLease::guarded(endpoint, Box::new(ReleaseCounter(Arc::clone(&self.releases)))))
    }

    async fn start_key_value(
        &self,
        _config: &SandboxConfig,
    ) -> Result<StoreLease<KeyValueEndpoint>, ProvisioningError> {
        let endpoint = KeyValueEndpoint {
            host: "127.0.0.1".to_string(),
            port: 6379,
        };
        Ok(StoreLease::guarded(endpoint, Box::new(ReleaseCounter(Arc::clone(&self.releases)))))
    }
}

/// Connector that accepts every batch and keeps an in-memory row count per
/// table, enough for provisioning, reset and count assertions.
#[derive(Default)]
pub struct ScratchConnector {
    /// Batches executed, in order.
    batches: Mutex<Vec<String>>,
    /// Row counts by quoted table name.
    rows: Mutex<BTreeMap<String, u64>>,
}

impl ScratchConnector {
    /// Batches executed, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RelationalConnector for ScratchConnector {
    async fn execute_batch(&self, _endpoint: &RelationalEndpoint, sql: &str) -> Result<(), ExecError> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(sql.to_string());
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        if sql.starts_with("TRUNCATE") {
            rows.clear();
        } else if let Some(table) = quoted_table(sql, "INSERT INTO ") {
            *rows.entry(table).or_default() += 1;
        }
        Ok(())
    }

    async fn query_column(&self, _endpoint: &RelationalEndpoint, sql: &str) -> Result<Vec<String>, ExecError> {
        if sql.contains("pg_tables") {
            return Ok(vec!["clientes".to_string(), "geo_cache".to_string()]);
        }
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let count = quoted_table(sql, "FROM ").and_then(|table| rows.get(&table).copied()).unwrap_or(0);
        Ok(vec![count.to_string()])
    }
}

/// First double-quoted identifier after `marker`.
fn quoted_table(sql: &str, marker: &str) -> Option<String> {
    let rest = &sql[sql.find(marker)? + marker.len() ..];
    let rest = rest.strip_prefix('"')?;
    Some(rest[.. rest.find('"')?].to_string())
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Everything a suite inspects after a session ran.
pub struct StubRig {
    /// Controller fronting the in-process service.
    pub controller: Arc<InProcessController>,
    /// Store release counter.
    pub releases: Arc<AtomicU32>,
    /// Connector shared by provisioning and fixtures.
    pub connector: Arc<ScratchConnector>,
}

impl StubRig {
    /// Session parts for `config` fronting `service`, which persists through
    /// the scratch connector.
    ///
    /// # Errors
    ///
    /// Returns an error when the launcher cannot be built.
    pub fn parts(
        service: &UsersService,
        config: &RigConfig,
        artifact: StubArtifact,
    ) -> Result<(Self, SessionParts), String> {
        let backend = LoopbackBackend::default();
        let releases = backend.releases();
        let connector = Arc::new(ScratchConnector::default());
        let controller = Arc::new(InProcessController::persisting(
            service,
            connector.clone(),
            config.service.env_names.clone(),
        ));
        let launcher = ServiceLauncher::new(controller.clone(), Arc::new(artifact), config.service.clone())
            .map_err(|err| err.to_string())?;
        let parts = SessionParts {
            sandbox: SandboxManager::new(Arc::new(backend)),
            connector: connector.clone(),
            launcher,
        };
        Ok((
            Self {
                controller,
                releases,
                connector,
            },
            parts,
        ))
    }

    /// Number of store leases released.
    #[must_use]
    pub fn released(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Launcher for the in-process service with a caller-supplied sandbox, used
/// by the docker suites where the stores are real. The service persists
/// through `connector`.
///
/// # Errors
///
/// Returns an error when the launcher cannot be built.
pub fn stub_launcher(
    service: &UsersService,
    connector: Arc<dyn RelationalConnector>,
    config: &RigConfig,
) -> Result<(Arc<InProcessController>, ServiceLauncher), String> {
    let controller = Arc::new(InProcessController::persisting(service, connector, config.service.env_names.clone()));
    let launcher = ServiceLauncher::new(controller.clone(), Arc::new(StubArtifact::present()), config.service.clone())
        .map_err(|err| err.to_string())?;
    Ok((controller, launcher))
}

/// Configuration tuned for fast local suites; `scratch` receives reports.
#[must_use]
pub fn suite_config(scratch: &Path) -> RigConfig {
    let mut config = RigConfig::default();
    config.scenarios.features_dir = features_dir();
    config.scenarios.token_query_param = Some("token".to_string());
    config.scenarios.request_timeout_ms = 5_000;
    config.migrations.manifest = scratch.join("no-manifest.plan");
    config.migrations.deploy_dir = scratch.join("deploy");
    config.service.readiness.max_attempts = 20;
    config.service.readiness.interval_ms = 25;
    config.service.readiness.probe_timeout_ms = 1_000;
    config.report.run_root = Some(scratch.join("run"));
    config
}

/// Bundled feature files.
#[must_use]
pub fn features_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("features")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use contract_rig_config::ServiceEnvNames;
    use contract_rig_core::ControllerError;

    use super::injected_relational;
    use super::quoted_table;

    #[test]
    fn injected_relational_reads_the_launch_env() -> Result<(), ControllerError> {
        let names = ServiceEnvNames::default();
        let mut env = BTreeMap::from([
            (names.relational_host.clone(), "127.0.0.1".to_string()),
            (names.relational_port.clone(), "49153".to_string()),
            (names.relational_user.clone(), "rig".to_string()),
            (names.relational_password.clone(), "pw".to_string()),
            (names.relational_database.clone(), "contract".to_string()),
        ]);
        let endpoint = injected_relational(&env, &names)?;
        assert_eq!(endpoint.port, 49_153);
        assert_eq!(endpoint.database_name, "contract");

        env.insert(names.relational_port.clone(), "not-a-port".to_string());
        assert!(injected_relational(&env, &names).is_err());
        env.remove(&names.relational_host);
        assert!(injected_relational(&env, &names).is_err());
        Ok(())
    }

    #[test]
    fn quoted_table_reads_first_identifier_after_marker() {
        assert_eq!(
            quoted_table("INSERT INTO \"geo_cache\" (\"result\") VALUES ('x')", "INSERT INTO "),
            Some("geo_cache".to_string())
        );
        assert_eq!(
            quoted_table("SELECT COUNT(*) FROM \"clientes\" WHERE \"email\"::text = 'a'", "FROM "),
            Some("clientes".to_string())
        );
        assert_eq!(quoted_table("SELECT 1", "FROM "), None);
    }
}

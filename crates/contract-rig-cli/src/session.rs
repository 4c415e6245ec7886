// crates/contract-rig-cli/src/session.rs
// ============================================================================
// Module: Session Lifecycle Controller
// Description: One-time setup, per-scenario reset, and guaranteed teardown.
// Purpose: Own the sandbox, provisioner and launcher for one run and drive
//          scenarios against the ready service in order.
// Dependencies: contract-rig-sandbox, contract-rig-launcher,
//               contract-rig-scenario, tracing
// ============================================================================

//! ## Overview
//! [`Session`] is constructed explicitly from a [`RigConfig`] and its
//! [`SessionParts`]; nothing is shared process-wide. Setup runs sandbox start,
//! schema provisioning and service launch in that order and stops at the
//! first fatal error. Scenarios run one at a time; those tagged `@clean` get a
//! truncate plus fixture re-seed first. Teardown stops the service before its
//! dependencies and runs whether or not setup or scenarios succeeded.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use contract_rig_config::ConfigError;
use contract_rig_config::FixtureRow;
use contract_rig_config::RigConfig;
use contract_rig_core::FixtureStore;
use contract_rig_core::MigrationError;
use contract_rig_core::ProvisioningError;
use contract_rig_core::ReadinessTimeoutError;
use contract_rig_core::SandboxEndpoints;
use contract_rig_core::StoreError;
use contract_rig_launcher::LaunchError;
use contract_rig_launcher::ServiceLauncher;
use contract_rig_sandbox::ApplyReport;
use contract_rig_sandbox::PgConnector;
use contract_rig_sandbox::PgFixtureStore;
use contract_rig_sandbox::RelationalConnector;
use contract_rig_sandbox::SandboxManager;
use contract_rig_sandbox::SchemaProvisioner;
use contract_rig_scenario::Feature;
use contract_rig_scenario::FailureDetail;
use contract_rig_scenario::FeatureError;
use contract_rig_scenario::HttpDriver;
use contract_rig_scenario::RegistryError;
use contract_rig_scenario::Scenario;
use contract_rig_scenario::ScenarioReport;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::ScenarioStatus;
use contract_rig_scenario::ScenarioWorld;
use contract_rig_scenario::StepReport;
use contract_rig_scenario::StepStatus;
use contract_rig_scenario::TagFilter;
use contract_rig_scenario::WorldSettings;
use contract_rig_scenario::requires_reset;
use contract_rig_scenario::tags::creates_user;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal session failures. Any of these aborts the run before scenarios.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A sandbox or the service failed to start.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    /// The relational store was unreachable during provisioning.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// The service never became ready.
    #[error(transparent)]
    Readiness(Box<ReadinessTimeoutError>),
    /// Feature files could not be read.
    #[error(transparent)]
    Features(#[from] FeatureError),
    /// The step vocabulary failed to compile.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The scenario HTTP client could not be built.
    #[error("http client: {0}")]
    Http(String),
    /// Reports could not be written.
    #[error("report: {0}")]
    Report(String),
}

impl SessionError {
    /// Lifecycle stage the error belongs to.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Provisioning(_) => "provisioning",
            Self::Migration(_) => "migration",
            Self::Readiness(_) => "readiness",
            Self::Features(_) | Self::Registry(_) => "scenarios",
            Self::Http(_) => "http",
            Self::Report(_) => "report",
        }
    }
}

impl From<LaunchError> for SessionError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Provisioning(err) => Self::Provisioning(err),
            LaunchError::Readiness(err) => Self::Readiness(err),
        }
    }
}

// ============================================================================
// SECTION: Parts
// ============================================================================

/// Components a session drives. Built from configuration in production and
/// from fakes in tests.
pub struct SessionParts {
    /// Dependency sandbox.
    pub sandbox: SandboxManager,
    /// Relational access for provisioning and fixtures.
    pub connector: Arc<dyn RelationalConnector>,
    /// Service launcher.
    pub launcher: ServiceLauncher,
}

impl SessionParts {
    /// Builds production parts: postgres connector, container or external
    /// sandbox, and the configured process controller. Native service logs
    /// land under `run_root`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Provisioning`] when the launcher cannot be built.
    pub fn for_config(config: &RigConfig, run_root: &Path) -> Result<Self, SessionError> {
        let timeout = Duration::from_secs(config.migrations.connect_timeout_secs);
        let connector: Arc<dyn RelationalConnector> = Arc::new(PgConnector::new(timeout));
        Ok(Self {
            sandbox: SandboxManager::for_config(&config.sandbox, Arc::clone(&connector)),
            connector,
            launcher: ServiceLauncher::for_config(config.service.clone(), run_root)?,
        })
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    /// Schema provisioning summary.
    pub migrations: ApplyReport,
    /// Base URL of the launched service.
    pub service_url: String,
    /// One report per executed scenario, in run order.
    pub scenarios: Vec<ScenarioReport>,
}

impl SessionOutcome {
    /// Number of failed scenarios.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.scenarios.iter().filter(|report| !report.passed()).count()
    }
}

/// Flattens features into the scenarios `filter` selects, in file order.
#[must_use]
pub fn selected_scenarios(features: &[Feature], filter: &TagFilter) -> Vec<Scenario> {
    features
        .iter()
        .flat_map(|feature| feature.scenarios.iter())
        .filter(|scenario| filter.selects(&scenario.tags))
        .cloned()
        .collect()
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Everything setup produced that scenarios need.
struct Prepared {
    /// Migration outcome, kept for the report.
    migrations: ApplyReport,
    /// Base URL of the healthy service.
    service_url: String,
    /// Store used for per-scenario reset and fixture steps.
    store: Arc<dyn FixtureStore>,
    /// Settings shared by every scenario world.
    settings: Arc<WorldSettings>,
    /// HTTP client shared by every scenario world.
    http: HttpDriver,
}

/// One contract-testing run.
pub struct Session {
    /// Effective configuration.
    config: RigConfig,
    /// Owns the sandboxed stores.
    sandbox: SandboxManager,
    /// Connector used for migrations and fixtures.
    connector: Arc<dyn RelationalConnector>,
    /// Owns the service under test.
    launcher: ServiceLauncher,
    /// Present between a successful setup and teardown.
    prepared: Option<Prepared>,
}

impl Session {
    /// Creates a session; nothing starts until [`Session::setup`].
    #[must_use]
    pub fn new(config: RigConfig, parts: SessionParts) -> Self {
        Self {
            config,
            sandbox: parts.sandbox,
            connector: parts.connector,
            launcher: parts.launcher,
            prepared: None,
        }
    }

    /// Starts the sandbox and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the sandbox fails to start or the store
    /// is unreachable during provisioning.
    pub async fn provision(&mut self) -> Result<(SandboxEndpoints, ApplyReport), SessionError> {
        let endpoints = self.sandbox.start(&self.config.sandbox).await?;
        info!(
            relational_host = %endpoints.relational.host,
            relational_port = endpoints.relational.port,
            key_value_port = endpoints.key_value.port,
            "sandbox ready"
        );
        let provisioner = SchemaProvisioner::new(Arc::clone(&self.connector), self.config.migrations.clone());
        let report = provisioner.apply(&endpoints, &self.config.migrations.manifest).await?;
        info!(applied = report.applied_count(), baseline = report.baseline, "schema provisioned");
        Ok((endpoints, report))
    }

    /// Runs global setup: sandbox, migrations, then the service.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`SessionError`]; already started components
    /// stay tracked so [`Session::teardown`] releases them.
    pub async fn setup(&mut self) -> Result<(), SessionError> {
        let (endpoints, migrations) = self.provision().await?;
        let instance = self.launcher.start(&endpoints).await?;
        let http = HttpDriver::new(Duration::from_millis(self.config.scenarios.request_timeout_ms))
            .map_err(SessionError::Http)?;
        let settings = WorldSettings::from_config(&self.config.scenarios, &instance.base_url);
        let store: Arc<dyn FixtureStore> =
            Arc::new(PgFixtureStore::new(Arc::clone(&self.connector), endpoints.relational));
        info!(service = %instance.base_url, "session setup complete");
        self.prepared = Some(Prepared {
            migrations,
            service_url: instance.base_url,
            store,
            settings: Arc::new(settings),
            http,
        });
        Ok(())
    }

    /// Truncates every table and re-seeds configured fixture rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store rejects the reset or a row.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let Some(prepared) = &self.prepared else {
            return Err(StoreError::Connect("session not set up".to_string()));
        };
        reset_store(&*prepared.store, &self.config.fixtures.rows).await
    }

    /// Runs `scenarios` in order against the ready service.
    ///
    /// Before setup every scenario is reported failed without running.
    pub async fn run_scenarios(&self, runner: &ScenarioRunner, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run_one(runner, scenario).await);
        }
        reports
    }

    /// Resets the store when the scenario asks for it, then runs it.
    async fn run_one(&self, runner: &ScenarioRunner, scenario: &Scenario) -> ScenarioReport {
        let Some(prepared) = &self.prepared else {
            return not_run(scenario, "setup", "session", "session not set up".to_string());
        };
        if requires_reset(&scenario.tags)
            && let Err(err) = reset_store(&*prepared.store, &self.config.fixtures.rows).await
        {
            warn!(scenario = %scenario.name, error = %err, "data reset failed");
            return not_run(scenario, "@clean", "fixture", format!("data reset failed: {err}"));
        }
        let mut world = ScenarioWorld::new(
            prepared.http.clone(),
            Arc::clone(&prepared.settings),
            Some(Arc::clone(&prepared.store)),
        );
        let mut report = runner.run(scenario, &mut world).await;
        if !report.passed() {
            report.diagnostics = self.launcher.diagnostics().await;
        }
        report
    }

    /// Stops the service, then the sandbox. Never fails; problems are logged.
    pub async fn teardown(&mut self) {
        self.launcher.stop().await;
        if let Err(err) = self.sandbox.stop().await {
            warn!(error = %err, "sandbox teardown incomplete");
        }
        self.prepared = None;
        info!("session torn down");
    }

    /// Runs the whole lifecycle: setup, scenarios, teardown.
    ///
    /// # Errors
    ///
    /// Returns the setup failure after teardown; no scenario runs in that case.
    pub async fn run(mut self, runner: &ScenarioRunner, scenarios: &[Scenario]) -> Result<SessionOutcome, SessionError> {
        let started = Instant::now();
        if let Err(err) = self.setup().await {
            warn!(stage = err.stage(), error = %err, "session setup failed");
            self.teardown().await;
            return Err(err);
        }
        let reports = self.run_scenarios(runner, scenarios).await;
        let outcome = self.prepared.as_ref().map(|prepared| SessionOutcome {
            migrations: prepared.migrations.clone(),
            service_url: prepared.service_url.clone(),
            scenarios: reports,
        });
        self.teardown().await;
        let outcome = outcome.ok_or(ProvisioningError::NotStarted)?;
        info!(
            scenarios = outcome.scenarios.len(),
            failed = outcome.failed(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "session finished"
        );
        Ok(outcome)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Truncates every table, then reapplies the seed rows.
async fn reset_store(store: &dyn FixtureStore, rows: &[FixtureRow]) -> Result<(), StoreError> {
    store.truncate_all().await?;
    for row in rows {
        store.insert_row(&row.table, &row.values).await?;
    }
    info!(seeded = rows.len(), "data reset");
    Ok(())
}

/// Report for a scenario that never got to run its steps.
fn not_run(scenario: &Scenario, stage: &str, kind: &str, message: String) -> ScenarioReport {
    ScenarioReport {
        feature: scenario.feature.clone(),
        name: scenario.name.clone(),
        tags: scenario.tags.clone(),
        status: ScenarioStatus::Failed,
        steps: scenario
            .steps
            .iter()
            .map(|step| StepReport {
                text: format!("{} {}", step.keyword.as_str(), step.text),
                line: step.line,
                status: StepStatus::Skipped,
            })
            .collect(),
        failure: Some(FailureDetail {
            step: stage.to_string(),
            kind: kind.to_string(),
            message,
        }),
        diagnostics: None,
        creates_user: creates_user(&scenario.tags),
        duration_ms: 0,
    }
}

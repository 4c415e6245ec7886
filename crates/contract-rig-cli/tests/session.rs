// crates/contract-rig-cli/tests/session.rs
// ============================================================================
// Module: Session Lifecycle Tests
// Description: Setup ordering, per-scenario reset, and guaranteed teardown.
// ============================================================================

//! ## Overview
//! Integration tests for the session lifecycle controller.
//! Invariants:
//! - Teardown runs on every exit path.
//! - Scenario failures never abort the session.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod support;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use contract_rig_cli::Session;
use contract_rig_cli::SessionError;
use contract_rig_cli::SessionParts;
use contract_rig_cli::selected_scenarios;
use contract_rig_config::FixtureRow;
use contract_rig_config::RigConfig;
use contract_rig_config::SandboxConfig;
use contract_rig_core::ArtifactOrigin;
use contract_rig_core::ControllerError;
use contract_rig_core::Credentials;
use contract_rig_core::KeyValueEndpoint;
use contract_rig_core::LaunchSpec;
use contract_rig_core::MigrationError;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use contract_rig_core::ProvisioningError;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::ResolvedArtifact;
use contract_rig_launcher::ArtifactResolver;
use contract_rig_launcher::ServiceLauncher;
use contract_rig_sandbox::ExecError;
use contract_rig_sandbox::RelationalConnector;
use contract_rig_sandbox::SandboxBackend;
use contract_rig_sandbox::SandboxManager;
use contract_rig_sandbox::StoreGuard;
use contract_rig_sandbox::StoreLease;
use contract_rig_scenario::Scenario;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::TagFilter;
use contract_rig_scenario::default_registry;
use contract_rig_scenario::parse_feature;
use support::TestResult;
use support::ensure;

// ============================================================================
// SECTION: Fakes
// ============================================================================

/// Counts guard releases.
struct CountingGuard(Arc<AtomicU32>);

#[async_trait]
impl StoreGuard for CountingGuard {
    async fn release(self: Box<Self>) -> Result<(), String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend handing out counting guards.
struct FakeBackend {
    /// Shared release counter.
    releases: Arc<AtomicU32>,
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    fn label(&self) -> &'static str {
        "fake"
    }

    async fn start_relational(
        &self,
        _config: &SandboxConfig,
    ) -> Result<StoreLease<RelationalEndpoint>, ProvisioningError> {
        let endpoint = RelationalEndpoint {
            host: "127.0.0.1".to_string(),
            port: 55_432,
            credentials: Credentials {
                user: "rig".to_string(),
                password: "rig".to_string(),
            },
            database_name: "rig".to_string(),
        };
        Ok(StoreLease::guarded(endpoint, Box::new(CountingGuard(Arc::clone(&self.releases)))))
    }

    async fn start_key_value(
        &self,
        _config: &SandboxConfig,
    ) -> Result<StoreLease<KeyValueEndpoint>, ProvisioningError> {
        let endpoint = KeyValueEndpoint {
            host: "127.0.0.1".to_string(),
            port: 56_379,
        };
        Ok(StoreLease::guarded(endpoint, Box::new(CountingGuard(Arc::clone(&self.releases)))))
    }
}

/// Connector recording batches with scripted failures.
#[derive(Default)]
struct FakeConnector {
    /// Fails every call to connect.
    unreachable: bool,
    /// Fails truncation batches.
    fail_truncate: bool,
    /// Batches executed, in order.
    batches: Mutex<Vec<String>>,
}

impl FakeConnector {
    /// Snapshot of executed batches.
    fn executed(&self) -> Vec<String> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RelationalConnector for FakeConnector {
    async fn execute_batch(&self, _endpoint: &RelationalEndpoint, sql: &str) -> Result<(), ExecError> {
        if self.unreachable {
            return Err(ExecError::Connect("connection refused".to_string()));
        }
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(sql.to_string());
        if self.fail_truncate && sql.starts_with("TRUNCATE") {
            return Err(ExecError::Statement("permission denied".to_string()));
        }
        Ok(())
    }

    async fn query_column(
        &self,
        _endpoint: &RelationalEndpoint,
        sql: &str,
    ) -> Result<Vec<String>, ExecError> {
        if self.unreachable {
            return Err(ExecError::Connect("connection refused".to_string()));
        }
        if sql.contains("pg_tables") {
            return Ok(vec!["clientes".to_string(), "geo_cache".to_string()]);
        }
        Ok(vec!["0".to_string()])
    }
}

/// Controller pointing at an already running stub.
struct FakeController {
    /// Port of the stub.
    port: u16,
    /// Launch specs received.
    started: Mutex<Vec<LaunchSpec>>,
    /// Names stopped.
    stopped: Mutex<Vec<String>>,
}

impl FakeController {
    /// Controller reporting `port`.
    fn serving(port: u16) -> Self {
        Self {
            port,
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    /// Number of starts.
    fn started(&self) -> usize {
        self.started.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of stops.
    fn stopped(&self) -> usize {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ProcessController for FakeController {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ControllerError> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner).push(spec.clone());
        Ok(ProcessHandle {
            id: format!("id-{}", spec.name),
            name: spec.name.clone(),
        })
    }

    async fn stop(&self, handle: &ProcessHandle) -> Result<(), ControllerError> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner).push(handle.id.clone());
        Ok(())
    }

    async fn logs(&self, _handle: &ProcessHandle, _tail: usize) -> Result<String, ControllerError> {
        Ok("boot log: listening".to_string())
    }

    async fn exec(
        &self,
        _handle: &ProcessHandle,
        _command: &[&str],
    ) -> Result<String, ControllerError> {
        Err(ControllerError::Unsupported("no exec".to_string()))
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

    async fn gateway_address(&self) -> Option<String> {
        None
    }
}

/// Resolver that either finds the artifact locally or finds nothing.
struct FakeResolver {
    /// Whether the local lookup succeeds.
    available: bool,
}

#[async_trait]
impl ArtifactResolver for FakeResolver {
    fn artifact_name(&self) -> String {
        "service:test".to_string()
    }

    async fn find_local(&self) -> Result<ResolvedArtifact, String> {
        if self.available {
            return Ok(ResolvedArtifact {
                reference: "service:test".to_string(),
                origin: ArtifactOrigin::Local,
            });
        }
        Err("not present locally".to_string())
    }

    async fn fetch_remote(&self) -> Result<ResolvedArtifact, String> {
        Err("registry unreachable".to_string())
    }

    async fn build_from_source(&self) -> Result<ResolvedArtifact, String> {
        Err("no build context configured".to_string())
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fakes shared by one session under test.
struct Harness {
    /// Release counter of the fake backend.
    releases: Arc<AtomicU32>,
    /// Fake connector.
    connector: Arc<FakeConnector>,
    /// Fake controller.
    controller: Arc<FakeController>,
}

impl Harness {
    /// Builds fakes around a stub on `port`.
    fn new(port: u16, connector: FakeConnector) -> Self {
        Self {
            releases: Arc::new(AtomicU32::new(0)),
            connector: Arc::new(connector),
            controller: Arc::new(FakeController::serving(port)),
        }
    }

    /// Session wired to the fakes.
    fn session(&self, config: RigConfig, artifact_available: bool) -> TestResult<Session> {
        let backend = FakeBackend {
            releases: Arc::clone(&self.releases),
        };
        let launcher = ServiceLauncher::new(
            self.controller.clone(),
            Arc::new(FakeResolver {
                available: artifact_available,
            }),
            config.service.clone(),
        )?;
        let parts = SessionParts {
            sandbox: SandboxManager::new(Arc::new(backend)),
            connector: self.connector.clone(),
            launcher,
        };
        Ok(Session::new(config, parts))
    }

    /// Releases observed so far.
    fn released(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Configuration rooted at `dir`.
fn rig_config(dir: &Path) -> RigConfig {
    let mut config = RigConfig::default();
    config.migrations.manifest = dir.join("absent.plan");
    config.migrations.deploy_dir = dir.join("deploy");
    config.service.readiness.max_attempts = 5;
    config.service.readiness.interval_ms = 20;
    config.service.readiness.probe_timeout_ms = 500;
    config.fixtures.rows = vec![FixtureRow {
        table: "geo_cache".to_string(),
        values: BTreeMap::from([
            ("search_term".to_string(), "01001000".to_string()),
            ("result".to_string(), "{}".to_string()),
        ]),
    }];
    config
}

/// Parses scenarios from feature text.
fn scenarios(text: &str) -> TestResult<Vec<Scenario>> {
    let feature = parse_feature(text, "ping.feature")?;
    Ok(selected_scenarios(&[feature], &TagFilter::default()))
}

/// Runner with the built-in steps.
fn runner() -> TestResult<ScenarioRunner> {
    Ok(ScenarioRunner::new(default_registry()?))
}

/// Serves a health route and a ping route; returns the port.
async fn serve_stub() -> TestResult<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "ok" }))
        .route(
            "/ping",
            axum::routing::get(|| async { axum::Json(serde_json::json!({ "pong": true })) }),
        );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(port)
}

/// Feature hitting the ping route.
const PING_FEATURE: &str = r#"Feature: Ping

  Scenario: Ping answers
    When I send a GET request to "/ping"
    Then the response status should be 200
    And the response field "pong" should be "true"

  Scenario: Ping is not a teapot
    When I send a GET request to "/ping"
    Then the response status should be 418
    And the response field "pong" should be "true"

  @clean
  Scenario: Ping after reset
    When I send a GET request to "/ping"
    Then the response status should be 200
"#;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests full lifecycle runs every scenario and tears down.
#[tokio::test]
async fn full_lifecycle_runs_every_scenario_and_tears_down() -> TestResult {
    let dir = tempfile::tempdir()?;
    let port = serve_stub().await?;
    let harness = Harness::new(port, FakeConnector::default());
    let session = harness.session(rig_config(dir.path()), true)?;

    let outcome = session.run(&runner()?, &scenarios(PING_FEATURE)?).await?;
    ensure(outcome.service_url == format!("http://127.0.0.1:{port}"), "service url reported")?;
    ensure(outcome.migrations.baseline, "baseline schema stood in for the manifest")?;
    ensure(outcome.scenarios.len() == 3, "every scenario reported")?;
    ensure(outcome.failed() == 1, "exactly one failure")?;

    let failed = &outcome.scenarios[1];
    ensure(failed.name == "Ping is not a teapot", "failure attributed to its scenario")?;
    let failure = failed.failure.as_ref().ok_or("failure detail")?;
    ensure(failure.kind == "assertion", format!("unexpected kind {}", failure.kind))?;
    ensure(failure.message.contains("418"), "expected status in message")?;
    let diagnostics = failed.diagnostics.as_ref().ok_or("diagnostics attached")?;
    ensure(diagnostics.log_tail.contains("boot log"), "service log tail attached")?;
    ensure(outcome.scenarios[0].diagnostics.is_none(), "no diagnostics on passing scenarios")?;
    ensure(outcome.scenarios[2].passed(), "later scenario unaffected by the failure")?;

    let executed = harness.connector.executed();
    ensure(executed.iter().any(|sql| sql.starts_with("TRUNCATE")), "@clean truncated tables")?;
    ensure(
        executed.iter().any(|sql| sql.starts_with("INSERT INTO \"geo_cache\"")),
        "fixture rows re-seeded",
    )?;
    ensure(harness.controller.started() == 1, "service launched once")?;
    ensure(harness.controller.stopped() == 1, "service stopped")?;
    ensure(harness.released() == 2, "both stores released")
}

/// Tests unreachable artifact aborts setup and releases sandbox.
#[tokio::test]
async fn unreachable_artifact_aborts_setup_and_releases_sandbox() -> TestResult {
    let dir = tempfile::tempdir()?;
    let harness = Harness::new(1, FakeConnector::default());
    let session = harness.session(rig_config(dir.path()), false)?;

    let result = session.run(&runner()?, &scenarios(PING_FEATURE)?).await;
    let Err(err) = result else {
        return Err("setup should fail".into());
    };
    ensure(
        matches!(err, SessionError::Provisioning(ProvisioningError::ArtifactUnavailable { .. })),
        format!("unexpected error {err}"),
    )?;
    ensure(err.stage() == "provisioning", "stage label")?;
    ensure(harness.controller.started() == 0, "nothing launched")?;
    ensure(harness.released() == 2, "sandbox released after the failure")
}

/// Tests unreachable store fails provisioning before launch.
#[tokio::test]
async fn unreachable_store_fails_provisioning_before_launch() -> TestResult {
    let dir = tempfile::tempdir()?;
    let harness = Harness::new(
        1,
        FakeConnector {
            unreachable: true,
            ..FakeConnector::default()
        },
    );
    let session = harness.session(rig_config(dir.path()), true)?;

    let result = session.run(&runner()?, &scenarios(PING_FEATURE)?).await;
    ensure(
        matches!(result, Err(SessionError::Migration(MigrationError::Connect { .. }))),
        "connect failure surfaces as a migration error",
    )?;
    ensure(harness.controller.started() == 0, "service never launched")?;
    ensure(harness.released() == 2, "sandbox released")
}

/// Tests failed reset fails only the clean scenario.
#[tokio::test]
async fn failed_reset_fails_only_the_clean_scenario() -> TestResult {
    let dir = tempfile::tempdir()?;
    let port = serve_stub().await?;
    let harness = Harness::new(
        port,
        FakeConnector {
            fail_truncate: true,
            ..FakeConnector::default()
        },
    );
    let session = harness.session(rig_config(dir.path()), true)?;
    let feature = r#"Feature: Reset

  @clean
  Scenario: Needs a clean slate
    When I send a GET request to "/ping"
    Then the response status should be 200

  Scenario: Runs anyway
    When I send a GET request to "/ping"
    Then the response status should be 200
"#;

    let outcome = session.run(&runner()?, &scenarios(feature)?).await?;
    let clean = &outcome.scenarios[0];
    let failure = clean.failure.as_ref().ok_or("reset failure recorded")?;
    ensure(failure.step == "@clean" && failure.kind == "fixture", "reset failure classified")?;
    ensure(
        clean.steps.iter().all(|step| step.status == contract_rig_scenario::StepStatus::Skipped),
        "no step ran after a failed reset",
    )?;
    ensure(outcome.scenarios[1].passed(), "next scenario still runs")?;
    ensure(harness.controller.stopped() == 1, "service stopped")
}

/// Tests scenarios before setup are reported not run.
#[tokio::test]
async fn scenarios_before_setup_are_reported_not_run() -> TestResult {
    let dir = tempfile::tempdir()?;
    let harness = Harness::new(1, FakeConnector::default());
    let session = harness.session(rig_config(dir.path()), true)?;
    let reports = session.run_scenarios(&runner()?, &scenarios(PING_FEATURE)?).await;
    ensure(reports.len() == 3, "every scenario reported")?;
    ensure(reports.iter().all(|report| !report.passed()), "none passed")?;
    ensure(
        reports.iter().all(|report| report.failure.as_ref().is_some_and(|failure| failure.step == "setup")),
        "attributed to setup",
    )
}

/// Tests tag filter selects scenarios in file order.
#[test]
fn tag_filter_selects_scenarios_in_file_order() -> TestResult {
    let feature = parse_feature(
        r#"Feature: Tags

  @smoke
  Scenario: First
    Then the response status should be 200

  @wip
  Scenario: Unfinished
    Then the response status should be 200

  @smoke @slow
  Scenario: Slow
    Then the response status should be 200
"#,
        "tags.feature",
    )?;
    let mut filter = TagFilter::default();
    filter.extend_from_expression("smoke,~slow");
    let selected = selected_scenarios(std::slice::from_ref(&feature), &filter);
    ensure(selected.len() == 1 && selected[0].name == "First", "smoke minus slow")?;
    let all = selected_scenarios(&[feature], &TagFilter::default());
    ensure(
        all.iter().map(|scenario| scenario.name.as_str()).collect::<Vec<_>>() == ["First", "Slow"],
        "wip excluded by default, order kept",
    )
}

// system-tests/tests/suites/sandbox.rs
// ============================================================================
// Module: Docker Sandbox Suite
// Description: Real containers for the relational and key-value stores.
// Purpose: Prove provisioning, fixture access and teardown against real
//          stores, and run the bundled features through a full session.
// Dependencies: contract-rig-sandbox, contract-rig-cli, system-tests
// ============================================================================

//! ## Overview
//! Session runs against real containerized stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use contract_rig_cli::Session;
use contract_rig_cli::SessionOutcome;
use contract_rig_cli::SessionParts;
use contract_rig_cli::selected_scenarios;
use contract_rig_config::RigConfig;
use contract_rig_core::FixtureStore;
use contract_rig_core::ProvisioningError;
use contract_rig_sandbox::PgConnector;
use contract_rig_sandbox::PgFixtureStore;
use contract_rig_sandbox::RelationalConnector;
use contract_rig_sandbox::SandboxManager;
use contract_rig_sandbox::SchemaProvisioner;
use contract_rig_sandbox::ensure_docker_available;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::TagFilter;
use contract_rig_scenario::default_registry;
use contract_rig_scenario::load_features;
use system_tests::InProcessController;
use system_tests::UsersService;
use system_tests::spawn_users_service;
use system_tests::stub_launcher;
use system_tests::suite_config;

use crate::helpers::TestResult;
use crate::helpers::ensure;

/// Real relational connector.
fn connector() -> Arc<dyn RelationalConnector> {
    Arc::new(PgConnector::new(Duration::from_secs(10)))
}

/// Runs the bundled scenarios selected by `tags` against a persisting service.
async fn run_tagged(
    config: RigConfig,
    tags: &str,
    service: &UsersService,
) -> TestResult<(Arc<InProcessController>, SessionOutcome)> {
    let features = load_features(&config.scenarios.features_dir)?;
    let mut filter = TagFilter::from_config(&config.scenarios);
    filter.extend_from_expression(tags);
    let scenarios = selected_scenarios(&features, &filter);
    let connector = connector();
    let (controller, launcher) = stub_launcher(service, Arc::clone(&connector), &config)?;
    let parts = SessionParts {
        sandbox: SandboxManager::for_config(&config.sandbox, Arc::clone(&connector)),
        connector,
        launcher,
    };
    let runner = ScenarioRunner::new(default_registry()?);
    let outcome = Session::new(config, parts).run(&runner, &scenarios).await?;
    Ok((controller, outcome))
}

/// Tests containers provision seed and release.
#[tokio::test(flavor = "multi_thread")]
async fn containers_provision_seed_and_release() -> TestResult {
    ensure_docker_available().await?;
    let scratch = tempfile::tempdir()?;
    let config = suite_config(scratch.path());
    let connector = connector();
    let mut manager = SandboxManager::for_config(&config.sandbox, Arc::clone(&connector));

    let endpoints = manager.start(&config.sandbox).await?;
    ensure(endpoints.relational.port != 5432, "relational store on an ephemeral port")?;
    ensure(manager.start(&config.sandbox).await? == endpoints, "second start is a no-op")?;

    let provisioner = SchemaProvisioner::new(Arc::clone(&connector), config.migrations.clone());
    let first = provisioner.apply(&endpoints, &config.migrations.manifest).await?;
    ensure(first.baseline && first.failed.is_empty(), "baseline applied cleanly")?;
    let again = provisioner.apply(&endpoints, &config.migrations.manifest).await?;
    ensure(again.failed.is_empty(), "baseline is idempotent")?;

    let store = PgFixtureStore::new(Arc::clone(&connector), endpoints.relational.clone());
    let row = BTreeMap::from([
        ("search_term".to_string(), "01001000".to_string()),
        ("result".to_string(), "{\"city\": \"Sao Paulo\"}".to_string()),
    ]);
    store.insert_row("geo_cache", &row).await?;
    ensure(store.count_rows("geo_cache").await? == 1, "row inserted")?;
    let lookup = BTreeMap::from([("search_term".to_string(), "01001000".to_string())]);
    ensure(store.count_matching("geo_cache", &lookup).await? == 1, "row found by value")?;
    ensure(store.insert_row("geo_cache", &row).await.is_err(), "unique constraint enforced")?;
    store.truncate_all().await?;
    ensure(store.count_rows("geo_cache").await? == 0, "truncate empties the table")?;

    manager.stop().await?;
    manager.stop().await?;
    ensure(
        matches!(manager.current_endpoints(), Err(ProvisioningError::NotStarted)),
        "endpoints gone after stop",
    )
}

/// Tests fixture feature passes against real postgres.
#[tokio::test(flavor = "multi_thread")]
async fn fixture_feature_passes_against_real_postgres() -> TestResult {
    ensure_docker_available().await?;
    let scratch = tempfile::tempdir()?;
    let service = spawn_users_service().await?;
    let (controller, outcome) = run_tagged(suite_config(scratch.path()), "fixtures", &service).await?;

    ensure(outcome.scenarios.len() == 2, "fixture scenarios selected")?;
    for report in &outcome.scenarios {
        let detail = report.failure.as_ref().map(|failure| failure.message.clone()).unwrap_or_default();
        ensure(report.passed(), format!("{} failed: {detail}", report.name))?;
    }
    let injected = &controller.launches()[0].env;
    ensure(injected.contains_key("POSTGRESQL_HOST"), "relational host injected")?;
    ensure(injected.contains_key("REDIS_URL"), "key-value url injected")?;
    ensure(controller.stops() == 1, "service stopped")?;
    service.shutdown().await;
    Ok(())
}

/// Tests users feature persists registrations to real postgres.
#[tokio::test(flavor = "multi_thread")]
async fn users_feature_persists_registrations_to_real_postgres() -> TestResult {
    ensure_docker_available().await?;
    let scratch = tempfile::tempdir()?;
    let service = spawn_users_service().await?;
    let (_controller, outcome) = run_tagged(suite_config(scratch.path()), "users", &service).await?;

    ensure(outcome.scenarios.len() == 6, format!("users scenarios selected, got {}", outcome.scenarios.len()))?;
    for report in &outcome.scenarios {
        let detail = report.failure.as_ref().map(|failure| failure.message.clone()).unwrap_or_default();
        ensure(report.passed(), format!("{} failed: {detail}", report.name))?;
    }
    ensure(!service.store_slot().is_bound(), "store unbound once the service stopped")?;
    service.shutdown().await;
    Ok(())
}

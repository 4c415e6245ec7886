// system-tests/tests/suites/lifecycle.rs
// ============================================================================
// Module: Session Lifecycle Suite
// Description: Bundled features run end to end against the users service.
// Purpose: Prove setup, per-scenario isolation, reports and teardown work
//          together.
// Dependencies: contract-rig-cli, system-tests
// ============================================================================

//! ## Overview
//! End-to-end session runs against the in-process users service.

use std::fs;

use contract_rig_cli::RunStatus;
use contract_rig_cli::RunSummary;
use contract_rig_cli::Session;
use contract_rig_cli::SessionError;
use contract_rig_cli::selected_scenarios;
use contract_rig_cli::write_reports;
use contract_rig_config::RigConfig;
use contract_rig_core::ProvisioningError;
use contract_rig_scenario::Scenario;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::StepStatus;
use contract_rig_scenario::TagFilter;
use contract_rig_scenario::default_registry;
use contract_rig_scenario::load_features;
use contract_rig_scenario::parse_feature;
use serde_json::Value;
use system_tests::StubArtifact;
use system_tests::StubRig;
use system_tests::spawn_users_service;
use system_tests::suite_config;

use crate::helpers::TestResult;
use crate::helpers::ensure;

/// Bundled scenarios selected by `tags`.
fn bundled(config: &RigConfig, tags: Option<&str>) -> TestResult<Vec<Scenario>> {
    let features = load_features(&config.scenarios.features_dir)?;
    let mut filter = TagFilter::from_config(&config.scenarios);
    if let Some(expression) = tags {
        filter.extend_from_expression(expression);
    }
    Ok(selected_scenarios(&features, &filter))
}

/// Runner with the built-in steps.
fn runner() -> TestResult<ScenarioRunner> {
    Ok(ScenarioRunner::new(default_registry()?))
}

/// Tests bundled contract passes end to end.
#[tokio::test]
async fn bundled_contract_passes_end_to_end() -> TestResult {
    let scratch = tempfile::tempdir()?;
    let service = spawn_users_service().await?;
    let config = suite_config(scratch.path());
    let scenarios = bundled(&config, None)?;
    ensure(scenarios.len() == 8, format!("expected 8 selected scenarios, got {}", scenarios.len()))?;
    ensure(scenarios.iter().all(|scenario| scenario.name != "Profiles can be renamed"), "@wip excluded")?;

    let run_root = config.report.run_root.clone().ok_or("run root configured")?;
    let (rig, parts) = StubRig::parts(&service, &config, StubArtifact::present())?;
    let outcome = Session::new(config, parts).run(&runner()?, &scenarios).await?;

    for report in &outcome.scenarios {
        let detail = report.failure.as_ref().map(|failure| failure.message.clone()).unwrap_or_default();
        ensure(report.passed(), format!("{} failed: {detail}", report.name))?;
    }
    ensure(outcome.service_url == service.base_url(), "service url is the stub")?;
    ensure(outcome.migrations.baseline, "baseline schema applied without a manifest")?;
    ensure(
        outcome.scenarios.iter().filter(|report| report.creates_user).count() == 3,
        "user-creating scenarios recorded",
    )?;
    ensure(service.registered() == 3, "only valid registrations persisted")?;

    let launches = rig.controller.launches();
    ensure(launches.len() == 1, "service launched once for the whole session")?;
    ensure(launches[0].name.starts_with("contract-rig-sut-"), "instance carries the name prefix")?;
    ensure(rig.controller.stops() == 1, "service stopped at teardown")?;
    ensure(rig.released() == 2, "both stores released at teardown")?;
    let executed = rig.connector.executed();
    let truncates = executed.iter().filter(|sql| sql.starts_with("TRUNCATE")).count();
    ensure(truncates == 4, format!("one reset per @clean scenario, got {truncates}"))?;
    let persisted = executed.iter().filter(|sql| sql.starts_with("INSERT INTO \"clientes\"")).count();
    ensure(persisted == 3, format!("accepted registrations persisted, got {persisted}"))?;
    ensure(!service.store_slot().is_bound(), "service stops persisting after teardown")?;

    let summary = RunSummary::from_outcome(&outcome, "2026-01-01T00:00:00Z".to_string());
    ensure(summary.status == RunStatus::Passed, "run passed")?;
    let (json_path, _) = write_reports(&run_root, &summary)?;
    let value: Value = serde_json::from_slice(&fs::read(json_path)?)?;
    ensure(value["totals"]["passed"] == 8, "summary totals written")?;

    service.shutdown().await;
    Ok(())
}

/// Tests tag expression narrows the run.
#[tokio::test]
async fn tag_expression_narrows_the_run() -> TestResult {
    let scratch = tempfile::tempdir()?;
    let config = suite_config(scratch.path());
    let only_fixtures = bundled(&config, Some("fixtures"))?;
    ensure(only_fixtures.len() == 2, "fixture feature only")?;
    let without_users = bundled(&config, Some("~users"))?;
    ensure(
        without_users.iter().all(|scenario| scenario.feature == "Lookup cache fixtures"),
        "feature tags inherited by scenarios",
    )?;
    let mut wip = config;
    wip.scenarios.include_wip = true;
    ensure(bundled(&wip, Some("users"))?.len() == 7, "@wip included on request")
}

/// Tests unreachable artifact runs zero scenarios.
#[tokio::test]
async fn unreachable_artifact_runs_zero_scenarios() -> TestResult {
    let scratch = tempfile::tempdir()?;
    let service = spawn_users_service().await?;
    let config = suite_config(scratch.path());
    let scenarios = bundled(&config, None)?;
    let (rig, parts) = StubRig::parts(&service, &config, StubArtifact::unreachable())?;

    let Err(err) = Session::new(config, parts).run(&runner()?, &scenarios).await else {
        return Err("setup should fail without an artifact".into());
    };
    let SessionError::Provisioning(ProvisioningError::ArtifactUnavailable { attempts, .. }) = &err else {
        return Err(format!("unexpected error: {err}").into());
    };
    ensure(attempts.contains("registry.invalid"), "every fallback attempt listed")?;
    ensure(rig.controller.launches().is_empty(), "nothing launched")?;
    ensure(rig.released() == 2, "sandbox released after the failed setup")?;
    ensure(service.registered() == 0, "no scenario reached the service")?;

    let summary = RunSummary::from_setup_error(&err, "2026-01-01T00:00:00Z".to_string());
    ensure(summary.status == RunStatus::SetupFailed && summary.totals.scenarios == 0, "zero scenarios")?;
    service.shutdown().await;
    Ok(())
}

/// Tests broken expectations fail alone with diagnostics.
#[tokio::test]
async fn broken_expectations_fail_alone_with_diagnostics() -> TestResult {
    let scratch = tempfile::tempdir()?;
    let service = spawn_users_service().await?;
    let config = suite_config(scratch.path());
    let feature = parse_feature(
        r#"Feature: Drifted contract

  Scenario: Registration was expected to return 201
    When I send a POST request to "/v1/users" with body:
      """
      {"email": "<unique_email>", "password": "s3cret!"}
      """
    Then the response status should be 201
    And the response field "token" should exist

  Scenario: Unknown vocabulary
    When I teleport to "/v1/users"

  Scenario: Still healthy
    When I send a GET request to "/"
    Then the response status should be 200
"#,
        "drift.feature",
    )?;
    let scenarios = selected_scenarios(&[feature], &TagFilter::default());
    let (_rig, parts) = StubRig::parts(&service, &config, StubArtifact::present())?;
    let outcome = Session::new(config, parts).run(&runner()?, &scenarios).await?;

    ensure(outcome.failed() == 2, "two scenarios fail")?;
    let drifted = &outcome.scenarios[0];
    let failure = drifted.failure.as_ref().ok_or("failure detail")?;
    ensure(failure.kind == "assertion", "status mismatch is an assertion")?;
    ensure(failure.message.contains("expected 201, got 200"), "expected versus actual reported")?;
    ensure(
        drifted.steps.last().is_some_and(|step| step.status == StepStatus::Skipped),
        "later steps skipped",
    )?;
    let diagnostics = drifted.diagnostics.as_ref().ok_or("diagnostics attached")?;
    ensure(diagnostics.log_tail.contains("serving on"), "service log tail attached")?;
    ensure(
        outcome.scenarios[1].failure.as_ref().is_some_and(|failure| failure.kind == "undefined"),
        "unknown step reported as undefined",
    )?;
    ensure(outcome.scenarios[2].passed(), "failures do not leak into later scenarios")?;
    service.shutdown().await;
    Ok(())
}

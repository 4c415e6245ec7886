// crates/contract-rig-scenario/tests/runner.rs
// ============================================================================
// Module: Scenario Runner Tests
// Description: End-to-end scenario execution against an in-process service.
// Purpose: Cover request, assertion, capture and fixture steps, failure
//          isolation between scenarios, and network failure reporting.
// ============================================================================

//! ## Overview
//! Integration tests for scenario execution against a local HTTP stub.

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
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use contract_rig_core::FixtureStore;
use contract_rig_core::StoreError;
use contract_rig_scenario::HttpDriver;
use contract_rig_scenario::Scenario;
use contract_rig_scenario::ScenarioReport;
use contract_rig_scenario::ScenarioRunner;
use contract_rig_scenario::ScenarioStatus;
use contract_rig_scenario::ScenarioWorld;
use contract_rig_scenario::StepStatus;
use contract_rig_scenario::WorldSettings;
use contract_rig_scenario::default_registry;
use contract_rig_scenario::parse_feature;
use serde_json::Value;
use serde_json::json;
use support::TestResult;
use support::ensure;

// ============================================================================
// SECTION: Stub Service
// ============================================================================

/// Users table shared by the stub service and the fake fixture store.
#[derive(Clone, Default)]
struct Users {
    /// Users in insertion order.
    rows: Arc<Mutex<Vec<(u64, String)>>>,
}

impl Users {
    /// Locks the rows.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, String)>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `POST /users`
async fn create_user(State(users): State<Users>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default().to_string();
    let mut rows = users.lock();
    if !email.contains('@') {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid email"})));
    }
    if rows.iter().any(|(_, existing)| *existing == email) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "email already registered"})));
    }
    let id = rows.last().map_or(1, |(id, _)| id + 1);
    rows.push((id, email.clone()));
    (StatusCode::OK, Json(json!({"id": id, "email": email, "token": format!("tok_{id:08x}")})))
}

/// `GET /users/{id}`
async fn get_user(State(users): State<Users>, Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    let rows = users.lock();
    match rows.iter().find(|(row_id, _)| *row_id == id) {
        Some((id, email)) => (
            StatusCode::OK,
            Json(json!({"id": id, "email": email, "created_at": "2026-01-01T00:00:00Z", "profile": null})),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
    }
}

/// Echoes headers and query parameters.
async fn echo(headers: HeaderMap, Query(query): Query<BTreeMap<String, String>>) -> Json<Value> {
    let api_key = headers.get("x-api-key").and_then(|value| value.to_str().ok()).map(str::to_string);
    let trace = headers.get("x-trace").and_then(|value| value.to_str().ok()).map(str::to_string);
    Json(json!({"api_key": api_key, "trace": trace, "query": query}))
}

/// Serves the stub; returns its base URL.
async fn serve(users: Users) -> TestResult<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let app = Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/echo", get(echo))
        .with_state(users);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://127.0.0.1:{port}"))
}

/// A URL nothing listens on.
fn closed_url() -> TestResult<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(format!("http://127.0.0.1:{}", listener.local_addr()?.port()))
}

// ============================================================================
// SECTION: Fake Store
// ============================================================================

/// Fixture store over the stub's user table.
struct FakeStore {
    /// Shared user table.
    users: Users,
}

#[async_trait]
impl FixtureStore for FakeStore {
    async fn truncate_all(&self) -> Result<(), StoreError> {
        self.users.lock().clear();
        Ok(())
    }

    async fn insert_row(&self, table: &str, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if table != "clientes" {
            return Err(StoreError::Statement(format!("relation \"{table}\" does not exist")));
        }
        let email = values.get("email").cloned().unwrap_or_default();
        let mut rows = self.users.lock();
        let id = rows.last().map_or(1, |(id, _)| id + 1);
        rows.push((id, email));
        Ok(())
    }

    async fn count_rows(&self, _table: &str) -> Result<u64, StoreError> {
        count_to_u64(self.users.lock().len())
    }

    async fn count_matching(&self, _table: &str, values: &BTreeMap<String, String>) -> Result<u64, StoreError> {
        let wanted = values.get("email");
        let count = self.users.lock().iter().filter(|(_, email)| Some(email) == wanted).count();
        count_to_u64(count)
    }

    async fn tables(&self) -> Result<Vec<String>, StoreError> {
        Ok(vec!["clientes".to_string()])
    }
}

/// Converts a row count.
fn count_to_u64(count: usize) -> Result<u64, StoreError> {
    u64::try_from(count).map_err(|err| StoreError::Statement(err.to_string()))
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Runner, world settings and store for one test.
struct Harness {
    /// Runner with the built-in steps.
    runner: ScenarioRunner,
    /// Settings pointing at the stub.
    settings: Arc<WorldSettings>,
    /// Store over the stub.
    store: Arc<dyn FixtureStore>,
    /// Shared HTTP client.
    http: HttpDriver,
}

impl Harness {
    /// Starts the stub and wires the runner to it.
    async fn start() -> TestResult<Self> {
        let users = Users::default();
        let service = serve(users.clone()).await?;
        let mut targets = BTreeMap::new();
        targets.insert("service".to_string(), service);
        targets.insert("offline".to_string(), closed_url()?);
        let settings = WorldSettings {
            targets,
            default_target: Some("service".to_string()),
            token_header: "x-api-key".to_string(),
            token_query_param: Some("token".to_string()),
        };
        let store: Arc<dyn FixtureStore> = Arc::new(FakeStore {
            users,
        });
        Ok(Self {
            runner: ScenarioRunner::new(default_registry()?),
            settings: Arc::new(settings),
            store,
            http: HttpDriver::new(Duration::from_secs(5))?,
        })
    }

    /// Runs one scenario with a fresh world.
    async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let mut world = ScenarioWorld::new(self.http.clone(), self.settings.clone(), Some(self.store.clone()));
        self.runner.run(scenario, &mut world).await
    }

    /// Parses `text` and runs every scenario.
    async fn run_all(&self, text: &str) -> TestResult<Vec<ScenarioReport>> {
        let feature = parse_feature(text, "inline.feature")?;
        let mut reports = Vec::new();
        for scenario in &feature.scenarios {
            reports.push(self.run(scenario).await);
        }
        Ok(reports)
    }
}

/// Message of the first failed step.
fn failure_message(report: &ScenarioReport) -> String {
    report.failure.as_ref().map(|failure| format!("{}: {}", failure.step, failure.message)).unwrap_or_default()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Registration feature used by several tests.
const REGISTRATION: &str = r#"
Feature: Registration

  @clean @creates-user
  Scenario: Register then look up the same user
    Given the database is clean
    When I send a POST request to "/users" with body:
      """
      {"email": "<unique_email:email>"}
      """
    Then the response status should be 200
    And I store the response field "id" as "user_id"
    When I send a GET request to "/users/<user_id>"
    Then the response status should be 200
    And the response field "email" should be "<email>"
    And the response field "id" should be "<number>"
    And the response field "profile" should be "<null>"
    And the response body should match:
      """
      {"email": "<email>", "id": "<number>", "created_at": "/^\\d{4}-\\d{2}-\\d{2}T/"}
      """

  @clean @creates-user
  Scenario: Duplicate email is rejected
    Given the database is clean
    When I send a POST request to "/users" with body:
      """
      {"email": "<unique_email:email>"}
      """
    Then the response status should be 200
    And the response field "token" should be "/^tok_[0-9a-f]+$/"
    When I send a POST request to "/users" with body:
      """
      {"email": "<email>"}
      """
    Then the response status should be 400
    And the response field "error" should be "<string>"
    And the table "clientes" should have 1 row
"#;

/// Tests registration contract holds.
#[tokio::test]
async fn registration_contract_holds() -> TestResult {
    let harness = Harness::start().await?;
    let reports = harness.run_all(REGISTRATION).await?;
    ensure(reports.len() == 2, "two scenarios")?;
    for report in &reports {
        ensure(report.passed(), format!("{} failed: {}", report.name, failure_message(report)))?;
        ensure(report.creates_user, "creates-user tag recorded")?;
        ensure(report.steps.iter().all(|step| step.status == StepStatus::Passed), "all steps passed")?;
    }
    Ok(())
}

/// Tests failing step skips the rest but not the next scenario.
#[tokio::test]
async fn failing_step_skips_the_rest_but_not_the_next_scenario() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Isolation
  Scenario: Wrong status
    Given the database is clean
    When I send a POST request to "/users" with body:
      """
      {"email": "first@example.com"}
      """
    Then the response status should be 201
    And the response field "id" should exist

  Scenario: Still runs
    When I send a GET request to "/users/1"
    Then the response status should be 200
    And the response field "email" should be "first@example.com"
"#;
    let reports = harness.run_all(text).await?;
    let failed = &reports[0];
    ensure(failed.status == ScenarioStatus::Failed, "first scenario fails")?;
    let failure = failed.failure.as_ref().ok_or("failure detail missing")?;
    ensure(failure.kind == "assertion", format!("kind {}", failure.kind))?;
    ensure(failure.step == "Then the response status should be 201", format!("step {}", failure.step))?;
    ensure(failure.message.contains("expected 201, got 200"), format!("message {}", failure.message))?;
    let statuses: Vec<StepStatus> = failed.steps.iter().map(|step| step.status).collect();
    ensure(
        statuses == vec![StepStatus::Passed, StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped],
        format!("statuses {statuses:?}"),
    )?;
    ensure(reports[1].passed(), failure_message(&reports[1]))?;
    Ok(())
}

/// Tests assertion failures name path expected and actual.
#[tokio::test]
async fn assertion_failures_name_path_expected_and_actual() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Detail
  Scenario: Mismatch
    When I send a POST request to "/users" with body:
      """
      {"email": "detail@example.com"}
      """
    Then the response body should match:
      """
      {"email": "other@example.com"}
      """
"#;
    let reports = harness.run_all(text).await?;
    let message = failure_message(&reports[0]);
    ensure(message.contains("`email`"), format!("path missing: {message}"))?;
    ensure(message.contains("other@example.com"), format!("expected missing: {message}"))?;
    ensure(message.contains("detail@example.com"), format!("actual missing: {message}"))?;
    Ok(())
}

/// Tests tokens headers and query parameters are sent.
#[tokio::test]
async fn tokens_headers_and_query_parameters_are_sent() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Transport
  Scenario: Token and headers
    Given I use the token "<random_token:token>"
    And I set the header "X-Trace" to "trace-1"
    When I send a GET request to "/echo" with query parameters:
      | page | 2 |
    Then the response field "api_key" should be "<token>"
    And the response field "trace" should be "trace-1"
    And the response field "query.page" should be "2"
    And the response field "query.token" should be "<token>"
    And I store the response body as "echo"
"#;
    let reports = harness.run_all(text).await?;
    ensure(reports[0].passed(), failure_message(&reports[0]))
}

/// Tests fixture rows are visible to the service.
#[tokio::test]
async fn fixture_rows_are_visible_to_the_service() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Fixtures
  @clean
  Scenario: Seeded user
    Given the database is clean
    And the table "clientes" contains the rows:
      | email          | nome |
      | seed@rig.test  | Ana  |
    Then the table "clientes" should have 1 row
    And the table "clientes" should contain a row with:
      | email | seed@rig.test |
    When I send a GET request to "/users/1"
    Then the response field "email" should be "seed@rig.test"

  Scenario: Unknown table
    Given the table "missing" contains the rows:
      | id |
      | 1  |
"#;
    let reports = harness.run_all(text).await?;
    ensure(reports[0].passed(), failure_message(&reports[0]))?;
    let failure = reports[1].failure.as_ref().ok_or("unknown table must fail")?;
    ensure(failure.kind == "fixture", format!("kind {}", failure.kind))?;
    Ok(())
}

/// Tests unreachable target is a network failure.
#[tokio::test]
async fn unreachable_target_is_a_network_failure() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Offline
  @backend-offline
  Scenario: Nobody listens
    When I send a POST request to "/users" with body:
      """
      {"email": "x@example.com"}
      """
    Then the response status should be 200
"#;
    let reports = harness.run_all(text).await?;
    let failure = reports[0].failure.as_ref().ok_or("request must fail")?;
    ensure(failure.kind == "network", format!("kind {}", failure.kind))?;
    ensure(failure.message.contains("POST /users"), format!("message {}", failure.message))?;
    ensure(reports[0].steps[1].status == StepStatus::Skipped, "assertion skipped")?;
    Ok(())
}

/// Tests unknown steps and backends fail the scenario.
#[tokio::test]
async fn unknown_steps_and_backends_fail_the_scenario() -> TestResult {
    let harness = Harness::start().await?;
    let text = r#"
Feature: Mistakes
  Scenario: Typo
    Given I do something nobody defined

  @backend-nowhere
  Scenario: Unknown backend
    When I send a GET request to "/echo"
"#;
    let reports = harness.run_all(text).await?;
    let typo = reports[0].failure.as_ref().ok_or("undefined step must fail")?;
    ensure(typo.kind == "undefined", format!("kind {}", typo.kind))?;
    let backend = reports[1].failure.as_ref().ok_or("unknown backend must fail")?;
    ensure(backend.kind == "invalid", format!("kind {}", backend.kind))?;
    ensure(reports[1].steps.iter().all(|step| step.status == StepStatus::Skipped), "steps skipped")?;
    Ok(())
}

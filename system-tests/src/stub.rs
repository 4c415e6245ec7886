// system-tests/src/stub.rs
// ============================================================================
// Module: Users Service Stub
// Description: In-process HTTP service implementing the registration contract.
// Purpose: Give end-to-end suites a real service to launch and probe without
//          building an image.
// Dependencies: axum, contract-rig-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `GET /` answers `ok` for readiness probes.
//! - `POST /v1/users` registers `{email, password}`: `200` with `{id, email,
//!   token}`, `422` for a malformed email or short password, `400` with an
//!   `error` field when the email is taken.
//! - `GET /v1/users/me` returns the caller's profile for a valid `x-api-key`
//!   header or `token` query parameter, `401` otherwise.
//! - `GET /v1/users/{id}` returns `{id, email, apelido}` or `404`.
//!
//! Once a store is bound to its [`StoreSlot`], every accepted registration is
//! also written to the `clientes` table, the way the real service persists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

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
use serde_json::Value;
use serde_json::json;
use tokio::task::JoinHandle;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

/// A registered user.
#[derive(Debug, Clone)]
struct Account {
    /// Sequential id.
    id: u64,
    /// Unique email.
    email: String,
    /// Bearer token issued at registration.
    token: String,
}

/// In-memory user table.
#[derive(Clone, Default)]
struct Accounts {
    /// Rows in insertion order.
    rows: Arc<Mutex<Vec<Account>>>,
}

impl Accounts {
    /// Locks the rows, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Vec<Account>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Relational store the stub persists registrations to, bound at launch.
#[derive(Clone, Default)]
pub struct StoreSlot {
    /// Bound store, if any.
    store: Arc<Mutex<Option<Arc<dyn FixtureStore>>>>,
}

impl StoreSlot {
    /// Starts writing registrations through `store`.
    pub fn bind(&self, store: Arc<dyn FixtureStore>) {
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    /// Stops persisting.
    pub fn unbind(&self) {
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a store is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }

    /// Store bound right now.
    fn current(&self) -> Option<Arc<dyn FixtureStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Shared handler state.
#[derive(Clone)]
struct ServiceState {
    /// User table.
    accounts: Accounts,
    /// Persistence binding.
    slot: StoreSlot,
}

/// A running stub bound to an ephemeral loopback port.
pub struct UsersService {
    /// Bound port.
    port: u16,
    /// User table.
    accounts: Accounts,
    /// Persistence binding.
    slot: StoreSlot,
    /// Server task.
    join: JoinHandle<()>,
}

impl UsersService {
    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the stub.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of registered accounts.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.accounts.lock().len()
    }

    /// Slot the launch binds the relational store into.
    #[must_use]
    pub fn store_slot(&self) -> StoreSlot {
        self.slot.clone()
    }

    /// Stops serving.
    pub async fn shutdown(self) {
        self.join.abort();
        let _ = self.join.await;
    }
}

/// Spawns the stub on `127.0.0.1:0`.
///
/// # Errors
///
/// Returns an error when the loopback listener cannot be bound.
pub async fn spawn_users_service() -> Result<UsersService, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("failed to bind loopback: {err}"))?;
    let port = listener.local_addr().map_err(|err| format!("failed to read listener address: {err}"))?.port();
    let accounts = Accounts::default();
    let slot = StoreSlot::default();
    let state = ServiceState {
        accounts: accounts.clone(),
        slot: slot.clone(),
    };
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/v1/users", post(register))
        .route("/v1/users/me", get(me))
        .route("/v1/users/{id}", get(public_profile))
        .with_state(state);
    let join = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(UsersService {
        port,
        accounts,
        slot,
        join,
    })
}

/// `POST /v1/users`
async fn register(State(state): State<ServiceState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default().trim().to_lowercase();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if !is_email(&email) {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "invalid email"})));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "password too short"})));
    }
    if state.accounts.lock().iter().any(|account| account.email == email) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "email already registered"})));
    }
    if let Some(store) = state.slot.current() {
        let row = BTreeMap::from([("email".to_string(), email.clone())]);
        if let Err(err) = store.insert_row("clientes", &row).await {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()})));
        }
    }
    let mut rows = state.accounts.lock();
    let id = rows.last().map_or(1, |account| account.id + 1);
    let token = format!("tok_{id:08x}_{}", email.len());
    rows.push(Account {
        id,
        email: email.clone(),
        token: token.clone(),
    });
    (StatusCode::OK, Json(json!({"id": id, "email": email, "token": token})))
}

/// `GET /v1/users/me`
async fn me(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let presented = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.get("token").cloned());
    let rows = state.accounts.lock();
    let Some(account) = presented.and_then(|token| rows.iter().find(|account| account.token == token)) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "not authenticated"})));
    };
    (
        StatusCode::OK,
        Json(json!({
            "id": account.id,
            "email": account.email,
            "status": "setup",
            "nome_completo": null,
            "created_on": "2026-01-01T00:00:00Z",
        })),
    )
}

/// `GET /v1/users/{id}`
async fn public_profile(State(state): State<ServiceState>, Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    let rows = state.accounts.lock();
    match rows.iter().find(|account| account.id == id) {
        Some(account) => (
            StatusCode::OK,
            Json(json!({"id": account.id, "email": account.email, "apelido": null})),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "not found"}))),
    }
}

/// Loose email shape check.
fn is_email(candidate: &str) -> bool {
    candidate
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
}

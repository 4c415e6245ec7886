// crates/contract-rig-scenario/src/http.rs
// ============================================================================
// Module: HTTP Driver
// Description: Sends scenario requests to the service under test.
// Purpose: Enforce a per-request timeout and classify transport failures.
// Dependencies: reqwest, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every request carries the configured timeout. Timeouts and refused
//! connections become [`NetworkError`] values that keep the attempted path
//! and body for diagnostics. Non-JSON bodies are kept as text.

use std::collections::BTreeMap;
use std::time::Duration;

use contract_rig_core::NetworkError;
use contract_rig_core::NetworkFailureKind;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::matcher::lookup;

/// A fully substituted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Path relative to the target base URL.
    pub path: String,
    /// Raw body text.
    pub body: Option<String>,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
}

/// What came back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSnapshot {
    /// Status code.
    pub status: u16,
    /// Response headers with lowercase names.
    pub headers: BTreeMap<String, String>,
    /// Raw body text.
    pub body: String,
    /// Decoded body when it is JSON.
    pub json: Option<Value>,
}

impl ResponseSnapshot {
    /// Builds a snapshot, decoding the body when it is JSON.
    #[must_use]
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: String) -> Self {
        let json = serde_json::from_str(&body).ok();
        Self {
            status,
            headers,
            body,
            json,
        }
    }

    /// Field at a dot path, or the whole body for an empty path.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|json| lookup(json, path))
    }

    /// The body as a JSON value; non-JSON bodies become a string.
    #[must_use]
    pub fn body_value(&self) -> Value {
        self.json.clone().unwrap_or_else(|| Value::String(self.body.clone()))
    }
}

/// Shared HTTP client with an enforced timeout.
#[derive(Debug, Clone)]
pub struct HttpDriver {
    /// Shared client.
    client: reqwest::Client,
}

impl HttpDriver {
    /// Builds a driver whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a message when the client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("http client: {err}"))?;
        Ok(Self {
            client,
        })
    }

    /// Sends `request` against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] when the method is invalid or the transport
    /// fails.
    pub async fn send(
        &self,
        base_url: &str,
        request: &RequestSpec,
    ) -> Result<ResponseSnapshot, NetworkError> {
        let failure = |kind: NetworkFailureKind, message: String| NetworkError {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
            kind,
            message,
        };
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| failure(NetworkFailureKind::Other, format!("invalid method: {err}")))?;
        let url = join_url(base_url, &request.path);
        debug!(method = %method, %url, "scenario request");

        let mut builder = self.client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let has_content_type = request.headers.keys().any(|name| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| failure(classify(&err), err.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|err| failure(classify(&err), err.to_string()))?;
        Ok(ResponseSnapshot::new(status, headers, body))
    }
}

/// Maps a transport error onto a failure kind.
fn classify(err: &reqwest::Error) -> NetworkFailureKind {
    if err.is_timeout() {
        NetworkFailureKind::Timeout
    } else if err.is_connect() {
        NetworkFailureKind::ConnectionRefused
    } else {
        NetworkFailureKind::Other
    }
}

/// Joins a base URL and a path with exactly one slash.
#[must_use]
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') { format!("{base}{path}") } else { format!("{base}/{path}") }
}

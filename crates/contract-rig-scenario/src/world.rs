// crates/contract-rig-scenario/src/world.rs
// ============================================================================
// Module: Scenario World
// Description: Mutable context scoped to one scenario.
// Purpose: Carry captured variables, the last response, the selected target
//          and fixture access between steps.
// Dependencies: contract-rig-config, contract-rig-core
// ============================================================================

//! ## Overview
//! A [`ScenarioWorld`] is created fresh for every scenario and discarded when
//! it ends; nothing captured in one scenario is visible to the next.

use std::collections::BTreeMap;
use std::sync::Arc;

use contract_rig_config::ScenarioConfig;
use contract_rig_core::FixtureStore;

use crate::error::StepError;
use crate::http::HttpDriver;
use crate::http::RequestSpec;
use crate::http::ResponseSnapshot;
use crate::placeholder::Variables;

/// Session-wide inputs every world starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSettings {
    /// Target name to base URL.
    pub targets: BTreeMap<String, String>,
    /// Target used until a step or tag selects another.
    pub default_target: Option<String>,
    /// Header that carries the scenario token.
    pub token_header: String,
    /// Query parameter that carries the scenario token, if any.
    pub token_query_param: Option<String>,
}

impl WorldSettings {
    /// Builds settings from configuration. Targets without a URL resolve to
    /// `service_url`, the launched instance.
    #[must_use]
    pub fn from_config(config: &ScenarioConfig, service_url: &str) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|(name, target)| {
                (name.clone(), target.url.clone().unwrap_or_else(|| service_url.to_string()))
            })
            .collect();
        Self {
            targets,
            default_target: config.default_target.clone(),
            token_header: config.token_header.clone(),
            token_query_param: config.token_query_param.clone(),
        }
    }
}

/// Per-scenario mutable state.
pub struct ScenarioWorld {
    /// Values captured by earlier steps.
    pub variables: Variables,
    /// Most recent response.
    last_response: Option<ResponseSnapshot>,
    /// Shared HTTP client.
    http: HttpDriver,
    /// Session-wide settings.
    settings: Arc<WorldSettings>,
    /// Selected backend name.
    target: Option<String>,
    /// Bearer token for later requests.
    token: Option<String>,
    /// Extra headers for later requests.
    headers: BTreeMap<String, String>,
    /// Store for fixture steps, when one is configured.
    fixtures: Option<Arc<dyn FixtureStore>>,
}

impl ScenarioWorld {
    /// Creates a fresh world.
    #[must_use]
    pub fn new(
        http: HttpDriver,
        settings: Arc<WorldSettings>,
        fixtures: Option<Arc<dyn FixtureStore>>,
    ) -> Self {
        let target = settings.default_target.clone();
        Self {
            variables: Variables::default(),
            last_response: None,
            http,
            settings,
            target,
            token: None,
            headers: BTreeMap::new(),
            fixtures,
        }
    }

    /// Selects the target subsequent requests go to.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] for an unknown target.
    pub fn select_target(&mut self, name: &str) -> Result<(), StepError> {
        if !self.settings.targets.contains_key(name) {
            let known: Vec<&str> = self.settings.targets.keys().map(String::as_str).collect();
            return Err(StepError::invalid(format!(
                "unknown backend `{name}` (known: {})",
                known.join(", ")
            )));
        }
        self.target = Some(name.to_string());
        Ok(())
    }

    /// Name of the selected target.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Base URL of the selected target.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when no target is selected.
    pub fn base_url(&self) -> Result<&str, StepError> {
        self.target
            .as_ref()
            .and_then(|name| self.settings.targets.get(name))
            .map(String::as_str)
            .ok_or_else(|| StepError::invalid("no backend selected"))
    }

    /// Sets the token injected into every later request.
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Sets a header sent with every later request.
    pub fn set_header(&mut self, name: String, value: String) {
        self.headers.insert(name, value);
    }

    /// Sends a request with scenario headers and token applied, and records
    /// the response.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Network`] when the request fails.
    pub async fn send(&mut self, mut request: RequestSpec) -> Result<&ResponseSnapshot, StepError> {
        for (name, value) in &self.headers {
            request.headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
        if let Some(token) = &self.token {
            request.headers.entry(self.settings.token_header.clone()).or_insert_with(|| token.clone());
            if let Some(param) = &self.settings.token_query_param {
                request.query.push((param.clone(), token.clone()));
            }
        }
        let base_url = self.base_url()?.to_string();
        self.last_response = None;
        let response = self.http.send(&base_url, &request).await?;
        Ok(self.last_response.insert(response))
    }

    /// The most recent response.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] before any request was sent.
    pub fn response(&self) -> Result<&ResponseSnapshot, StepError> {
        self.last_response.as_ref().ok_or_else(|| StepError::invalid("no response recorded yet"))
    }

    /// Direct store access.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Invalid`] when the session has no fixture store.
    pub fn fixtures(&self) -> Result<Arc<dyn FixtureStore>, StepError> {
        self.fixtures.clone().ok_or_else(|| StepError::invalid("no fixture store available"))
    }
}

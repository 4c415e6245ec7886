// crates/contract-rig-config/src/model.rs
// ============================================================================
// Module: Configuration Model
// Description: Serde model for the session configuration file.
// Purpose: Provide defaults, file loading, env layering, and validation.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Each section maps to one orchestration component. Defaults mirror the
//! environment surface of the service under test: `POSTGRESQL_*` connection
//! parameters, a `REDIS_URL`, a test-mode flag that unlocks test-only response
//! fields, and relaxed rate limits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::env::EnvOverrides;

/// Maximum configuration file size accepted.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// IO message.
        message: String,
    },
    /// The file is not valid TOML for the model.
    #[error("invalid config {path}: {message}")]
    Parse {
        /// File path.
        path: String,
        /// Parser message.
        message: String,
    },
    /// An environment override was malformed.
    #[error("invalid environment: {0}")]
    Env(String),
    /// A value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Root
// ============================================================================

/// Complete session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    /// Dependency sandbox settings.
    pub sandbox: SandboxConfig,
    /// Schema provisioning settings.
    pub migrations: MigrationConfig,
    /// Service launcher settings.
    pub service: ServiceConfig,
    /// Scenario engine settings.
    pub scenarios: ScenarioConfig,
    /// Rows re-seeded after every per-scenario reset.
    pub fixtures: FixtureConfig,
    /// Report output settings.
    pub report: ReportConfig,
}

impl RigConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text does not match the model.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: origin.to_string(),
            message: err.to_string(),
        })
    }

    /// Loads configuration from `path`, or defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, oversized, or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let display = path.display().to_string();
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io {
            path: display.clone(),
            message: err.to_string(),
        })?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Invalid(format!("{display} exceeds {MAX_CONFIG_BYTES} bytes")));
        }
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: display.clone(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&text, &display)
    }

    /// Loads a file, layers process environment overrides, and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any stage fails.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        let overrides = EnvOverrides::load().map_err(ConfigError::Env)?;
        config.apply_overrides(&overrides);
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) {
        if let Some(run_root) = &overrides.run_root {
            self.report.run_root = Some(run_root.clone());
        }
        if let Some(timeout) = overrides.timeout {
            // The override acts as a minimum so explicitly longer timeouts survive.
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            self.scenarios.request_timeout_ms = self.scenarios.request_timeout_ms.max(millis);
        }
        if let Some(reuse) = overrides.reuse_sandbox {
            self.sandbox.reuse = reuse;
        }
        if let Some(url) = &overrides.relational_url {
            self.sandbox.relational_url = Some(url.clone());
        }
        if let Some(url) = &overrides.kv_url {
            self.sandbox.kv_url = Some(url.clone());
        }
        if let Some(image) = &overrides.service_image {
            match self.service.controller {
                ControllerKind::Docker => self.service.image = image.clone(),
                ControllerKind::Native => self.service.executable = Some(PathBuf::from(image)),
            }
        }
        if let Some(include_wip) = overrides.include_wip {
            self.scenarios.include_wip = include_wip;
        }
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let readiness = &self.service.readiness;
        if readiness.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "service.readiness.max_attempts must be greater than zero".to_string(),
            ));
        }
        if readiness.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "service.readiness.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.service.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("service.name_prefix must not be empty".to_string()));
        }
        if self.service.internal_port == 0 {
            return Err(ConfigError::Invalid("service.internal_port must be non-zero".to_string()));
        }
        if self.scenarios.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scenarios.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(default) = &self.scenarios.default_target
            && !self.scenarios.targets.contains_key(default)
        {
            return Err(ConfigError::Invalid(format!(
                "scenarios.default_target `{default}` is not a configured target"
            )));
        }
        if self.sandbox.reuse
            && (self.sandbox.relational_url.is_none() || self.sandbox.kv_url.is_none())
        {
            return Err(ConfigError::Invalid(
                "sandbox.reuse requires sandbox.relational_url and sandbox.kv_url".to_string(),
            ));
        }
        for row in &self.fixtures.rows {
            if row.table.trim().is_empty() || row.values.is_empty() {
                return Err(ConfigError::Invalid(
                    "fixture rows need a table and at least one value".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Sandbox
// ============================================================================

/// Dependency sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Relational store image name.
    pub relational_image: String,
    /// Relational store image tag.
    pub relational_tag: String,
    /// Relational store role.
    pub user: String,
    /// Relational store password.
    pub password: String,
    /// Relational database name.
    pub database: String,
    /// Key-value store image name.
    pub kv_image: String,
    /// Key-value store image tag.
    pub kv_tag: String,
    /// Attach to already-running stores instead of starting containers.
    pub reuse: bool,
    /// Relational URL used in reuse mode.
    pub relational_url: Option<String>,
    /// Key-value URL used in reuse mode.
    pub kv_url: Option<String>,
    /// Attempts made to reach the relational store after start.
    pub connect_attempts: u32,
    /// Interval between connection attempts in milliseconds.
    pub connect_interval_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            relational_image: "postgres".to_string(),
            relational_tag: "16-alpine".to_string(),
            user: "contract_rig".to_string(),
            password: "contract_rig".to_string(),
            database: "contract_rig".to_string(),
            kv_image: "redis".to_string(),
            kv_tag: "7-alpine".to_string(),
            reuse: false,
            relational_url: None,
            kv_url: None,
            connect_attempts: 60,
            connect_interval_ms: 500,
        }
    }
}

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// What to do with a migration unit failure that is not idempotency noise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationFailurePolicy {
    /// Log a warning and continue with the next unit.
    #[default]
    Warn,
    /// Stop provisioning and fail the session.
    Abort,
}

/// Schema provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Ordered manifest of unit names.
    pub manifest: PathBuf,
    /// Directory holding `<name>.<extension>` payloads.
    pub deploy_dir: PathBuf,
    /// Payload file extension.
    pub extension: String,
    /// Policy for non-benign unit failures.
    pub on_failure: MigrationFailurePolicy,
    /// Connect timeout for each unit's connection, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("deploy/sqitch.plan"),
            deploy_dir: PathBuf::from("deploy/deploy_db"),
            extension: "sql".to_string(),
            on_failure: MigrationFailurePolicy::Warn,
            connect_timeout_secs: 10,
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Isolation mechanism for the service under test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Run the service as a container via the docker CLI.
    #[default]
    Docker,
    /// Run the service as a native child process.
    Native,
}

/// Readiness polling budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Maximum probe attempts.
    pub max_attempts: u32,
    /// Interval between attempts in milliseconds.
    pub interval_ms: u64,
    /// Escalate log verbosity every N attempts.
    pub verbose_every: u32,
    /// Path probed over HTTP.
    pub path: String,
    /// Timeout for each probe request in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 180,
            interval_ms: 1_000,
            verbose_every: 10,
            path: "/".to_string(),
            probe_timeout_ms: 2_000,
        }
    }
}

impl ReadinessConfig {
    /// Interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Environment variable names the service reads its dependencies from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceEnvNames {
    /// Relational host variable.
    pub relational_host: String,
    /// Relational port variable.
    pub relational_port: String,
    /// Relational user variable.
    pub relational_user: String,
    /// Relational password variable.
    pub relational_password: String,
    /// Relational database variable.
    pub relational_database: String,
    /// Key-value URL variable.
    pub kv_url: String,
    /// Flag that unlocks test-only response fields.
    pub test_mode: String,
}

impl Default for ServiceEnvNames {
    fn default() -> Self {
        Self {
            relational_host: "POSTGRESQL_HOST".to_string(),
            relational_port: "POSTGRESQL_PORT".to_string(),
            relational_user: "POSTGRESQL_USER".to_string(),
            relational_password: "POSTGRESQL_PASSWORD".to_string(),
            relational_database: "POSTGRESQL_DBNAME".to_string(),
            kv_url: "REDIS_URL".to_string(),
            test_mode: "CONTRACT_TEST_MODE".to_string(),
        }
    }
}

/// Service launcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Isolation mechanism.
    pub controller: ControllerKind,
    /// Local image reference (docker controller).
    pub image: String,
    /// Remote image reference pulled when the local image is absent.
    pub remote_image: Option<String>,
    /// Build context used when neither local nor remote image is available.
    pub build_context: Option<PathBuf>,
    /// Dockerfile path relative to the build context.
    pub dockerfile: Option<PathBuf>,
    /// Executable path (native controller).
    pub executable: Option<PathBuf>,
    /// URL an executable is downloaded from when absent (native controller).
    pub download_url: Option<String>,
    /// Command that builds the executable from source (native controller).
    pub build_command: Vec<String>,
    /// Working directory for the build command and native process.
    pub working_dir: Option<PathBuf>,
    /// Port the service listens on inside its boundary.
    pub internal_port: u16,
    /// Stable prefix used to name and later clean up instances.
    pub name_prefix: String,
    /// Primary process name checked after readiness.
    pub process_name: String,
    /// Number of log lines captured in diagnostics.
    pub log_tail_lines: usize,
    /// Readiness polling budget.
    pub readiness: ReadinessConfig,
    /// Environment variable names for dependency coordinates.
    pub env_names: ServiceEnvNames,
    /// Relaxed rate-limit thresholds injected for scenario load.
    pub rate_limits: BTreeMap<String, String>,
    /// Extra environment injected verbatim.
    pub env: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let rate_limits = BTreeMap::from([
            ("MAX_LOGIN_ATTEMPTS_PER_MINUTE".to_string(), "10000".to_string()),
            ("MAX_SIGNUP_ATTEMPTS_PER_MINUTE".to_string(), "10000".to_string()),
            ("MAX_REQUESTS_PER_MINUTE".to_string(), "100000".to_string()),
        ]);
        Self {
            controller: ControllerKind::Docker,
            image: "contract-rig/service-under-test:latest".to_string(),
            remote_image: None,
            build_context: None,
            dockerfile: None,
            executable: None,
            download_url: None,
            build_command: Vec::new(),
            working_dir: None,
            internal_port: 8000,
            name_prefix: "contract-rig-sut".to_string(),
            process_name: "uvicorn".to_string(),
            log_tail_lines: 100,
            readiness: ReadinessConfig::default(),
            env_names: ServiceEnvNames::default(),
            rate_limits,
            env: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// A backend a scenario can select with `I am testing the "<name>" backend`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Fixed base URL; `None` means the launched service.
    pub url: Option<String>,
}

/// Scenario engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Directory searched for `.feature` files.
    pub features_dir: PathBuf,
    /// Named backends.
    pub targets: BTreeMap<String, TargetConfig>,
    /// Target used before any selection step runs.
    pub default_target: Option<String>,
    /// Only run scenarios carrying one of these tags (empty means all).
    pub include_tags: Vec<String>,
    /// Skip scenarios carrying any of these tags.
    pub exclude_tags: Vec<String>,
    /// Run scenarios tagged `@wip`.
    pub include_wip: bool,
    /// Enforced per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Header carrying the session token.
    pub token_header: String,
    /// Query parameter also carrying the session token, when set.
    pub token_query_param: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            features_dir: PathBuf::from("features"),
            targets: BTreeMap::from([("service".to_string(), TargetConfig::default())]),
            default_target: Some("service".to_string()),
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            include_wip: false,
            request_timeout_ms: 10_000,
            token_header: "x-api-key".to_string(),
            token_query_param: None,
        }
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// One row inserted after each reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureRow {
    /// Target table.
    pub table: String,
    /// Column values as text literals.
    pub values: BTreeMap<String, String>,
}

/// Rows that stand in for external-service lookups during tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureConfig {
    /// Rows re-seeded after each reset.
    pub rows: Vec<FixtureRow>,
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Report output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Directory receiving `summary.json` and `summary.md`.
    pub run_root: Option<PathBuf>,
}

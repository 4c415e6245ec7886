// crates/contract-rig-config/src/env.rs
// ============================================================================
// Module: Environment Overrides
// Description: Environment-backed overrides for a contract-testing session.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8, empty values, zero timeouts and unknown
//! boolean literals fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys for session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigEnv {
    /// Optional run root override for reports.
    RunRoot,
    /// Optional per-request timeout override in seconds (positive integer).
    TimeoutSeconds,
    /// Attach to already-running stores (`true`/`false` or `1`/`0`).
    ReuseSandbox,
    /// Connection URL of an already-running relational store.
    RelationalUrl,
    /// Connection URL of an already-running key-value store.
    KvUrl,
    /// Image or executable override for the service under test.
    ServiceImage,
    /// Run scenarios tagged work-in-progress (`true`/`false` or `1`/`0`).
    IncludeWip,
}

impl RigEnv {
    /// Every key, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::RunRoot,
        Self::TimeoutSeconds,
        Self::ReuseSandbox,
        Self::RelationalUrl,
        Self::KvUrl,
        Self::ServiceImage,
        Self::IncludeWip,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunRoot => "CONTRACT_RIG_RUN_ROOT",
            Self::TimeoutSeconds => "CONTRACT_RIG_TIMEOUT_SEC",
            Self::ReuseSandbox => "CONTRACT_RIG_REUSE_SANDBOX",
            Self::RelationalUrl => "CONTRACT_RIG_RELATIONAL_URL",
            Self::KvUrl => "CONTRACT_RIG_KV_URL",
            Self::ServiceImage => "CONTRACT_RIG_SERVICE_IMAGE",
            Self::IncludeWip => "CONTRACT_RIG_INCLUDE_WIP",
        }
    }
}

// ============================================================================
// SECTION: Override Types
// ============================================================================

/// Typed overrides derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvOverrides {
    /// Optional run root override.
    pub run_root: Option<PathBuf>,
    /// Optional request timeout override.
    pub timeout: Option<Duration>,
    /// Optional reuse-mode override.
    pub reuse_sandbox: Option<bool>,
    /// Optional external relational store URL.
    pub relational_url: Option<String>,
    /// Optional external key-value store URL.
    pub kv_url: Option<String>,
    /// Optional service artifact override.
    pub service_image: Option<String>,
    /// Optional work-in-progress inclusion override.
    pub include_wip: Option<bool>,
}

impl EnvOverrides {
    /// Loads overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when an environment value is not valid UTF-8, is empty,
    /// or fails validation (for example, an invalid timeout or boolean value).
    pub fn load() -> Result<Self, String> {
        Self::from_lookup(read_env_strict)
    }

    /// Loads overrides through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error when a looked-up value fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Result<Option<String>, String>,
    {
        let read = |key: RigEnv| read_nonempty(&lookup, key.as_str());
        let run_root = read(RigEnv::RunRoot)?.map(PathBuf::from);
        let timeout = read(RigEnv::TimeoutSeconds)?
            .map(|value| parse_timeout_seconds(RigEnv::TimeoutSeconds.as_str(), &value))
            .transpose()?;
        let reuse_sandbox = read(RigEnv::ReuseSandbox)?
            .map(|value| parse_bool(RigEnv::ReuseSandbox.as_str(), &value))
            .transpose()?;
        let include_wip = read(RigEnv::IncludeWip)?
            .map(|value| parse_bool(RigEnv::IncludeWip.as_str(), &value))
            .transpose()?;
        Ok(Self {
            run_root,
            timeout,
            reuse_sandbox,
            relational_url: read(RigEnv::RelationalUrl)?,
            kv_url: read(RigEnv::KvUrl)?,
            service_image: read(RigEnv::ServiceImage)?,
            include_wip,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads a value and rejects empty strings.
fn read_nonempty<F>(lookup: &F, name: &str) -> Result<Option<String>, String>
where
    F: Fn(&str) -> Result<Option<String>, String>,
{
    match lookup(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a positive timeout value from an environment variable string.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let secs: u64 = trimmed
        .parse()
        .map_err(|_| format!("{name} must be a positive integer number of seconds"))?;
    if secs == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// Parses a boolean literal.
fn parse_bool(name: &str, raw: &str) -> Result<bool, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(format!("{name} must be 1, 0, true, or false"))
}

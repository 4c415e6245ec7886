// crates/contract-rig-config/tests/load.rs
// ============================================================================
// Module: Config Loading Tests
// Description: File loading, section defaults, and validation failures.
// ============================================================================

//! ## Overview
//! Integration tests for configuration loading and validation.

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

use std::fs;
use std::path::PathBuf;

use contract_rig_config::ConfigError;
use contract_rig_config::ControllerKind;
use contract_rig_config::EnvOverrides;
use contract_rig_config::MigrationFailurePolicy;
use contract_rig_config::RigConfig;
use support::TestResult;
use support::ensure;

/// Tests missing path yields defaults.
#[test]
fn missing_path_yields_defaults() -> TestResult {
    let config = RigConfig::load(None)?;
    ensure(config == RigConfig::default(), "no file should mean defaults")?;
    ensure(config.service.env_names.relational_host == "POSTGRESQL_HOST", "default host var")?;
    ensure(config.service.env_names.kv_url == "REDIS_URL", "default kv var")?;
    ensure(config.migrations.on_failure == MigrationFailurePolicy::Warn, "warn by default")?;
    config.validate()?;
    Ok(())
}

/// Tests partial file keeps unspecified defaults.
#[test]
fn partial_file_keeps_unspecified_defaults() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rig.toml");
    fs::write(
        &path,
        r#"
[migrations]
on_failure = "abort"

[service]
controller = "native"
executable = "./target/debug/app"
internal_port = 9000

[service.readiness]
max_attempts = 5
interval_ms = 50

[scenarios.targets.service]

[scenarios.targets.legacy]
url = "http://127.0.0.1:7000"

[[fixtures.rows]]
table = "geo_cache"
values = { zip = "01001000", city = "Sao Paulo" }
"#,
    )?;
    let config = RigConfig::load(Some(&path))?;
    ensure(config.migrations.on_failure == MigrationFailurePolicy::Abort, "abort parsed")?;
    ensure(config.service.controller == ControllerKind::Native, "native controller parsed")?;
    ensure(config.service.internal_port == 9000, "internal port parsed")?;
    ensure(config.service.readiness.max_attempts == 5, "attempts parsed")?;
    ensure(config.service.readiness.verbose_every == 10, "verbose_every defaulted")?;
    ensure(config.service.name_prefix == "contract-rig-sut", "prefix defaulted")?;
    ensure(config.scenarios.targets.len() == 2, "both targets parsed")?;
    ensure(
        config.scenarios.targets.get("legacy").and_then(|t| t.url.as_deref())
            == Some("http://127.0.0.1:7000"),
        "fixed target url parsed",
    )?;
    ensure(config.fixtures.rows.len() == 1, "fixture row parsed")?;
    config.validate()?;
    Ok(())
}

/// Tests unknown fields are rejected.
#[test]
fn unknown_fields_are_rejected() -> TestResult {
    let result = RigConfig::from_toml_str("[service]\nimagee = \"typo\"\n", "inline");
    ensure(matches!(result, Err(ConfigError::Parse { .. })), "typo should fail to parse")
}

/// Tests unreadable file reports io error.
#[test]
fn unreadable_file_reports_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let result = RigConfig::load(Some(&dir.path().join("absent.toml")));
    ensure(matches!(result, Err(ConfigError::Io { .. })), "missing file is an io error")
}

/// Tests validation rejects zero readiness budget.
#[test]
fn validation_rejects_zero_readiness_budget() -> TestResult {
    let mut config = RigConfig::default();
    config.service.readiness.max_attempts = 0;
    ensure(config.validate().is_err(), "zero attempts rejected")?;

    let mut config = RigConfig::default();
    config.service.readiness.interval_ms = 0;
    ensure(config.validate().is_err(), "zero interval rejected")
}

/// Tests validation rejects unknown default target.
#[test]
fn validation_rejects_unknown_default_target() -> TestResult {
    let mut config = RigConfig::default();
    config.scenarios.default_target = Some("nowhere".to_string());
    ensure(config.validate().is_err(), "unknown default target rejected")
}

/// Tests validation rejects blank name prefix.
#[test]
fn validation_rejects_blank_name_prefix() -> TestResult {
    let mut config = RigConfig::default();
    config.service.name_prefix = "  ".to_string();
    ensure(config.validate().is_err(), "blank prefix rejected")
}

/// Tests lookup overrides apply without touching process env.
#[test]
fn lookup_overrides_apply_without_touching_process_env() -> TestResult {
    let overrides = EnvOverrides::from_lookup(|name| {
        Ok(match name {
            "CONTRACT_RIG_RUN_ROOT" => Some("/tmp/out".to_string()),
            "CONTRACT_RIG_INCLUDE_WIP" => Some("1".to_string()),
            "CONTRACT_RIG_TIMEOUT_SEC" => Some("30".to_string()),
            _ => None,
        })
    })?;
    let mut config = RigConfig::default();
    config.apply_overrides(&overrides);
    ensure(config.report.run_root == Some(PathBuf::from("/tmp/out")), "run root applied")?;
    ensure(config.scenarios.include_wip, "wip inclusion applied")?;
    ensure(config.scenarios.request_timeout_ms == 30_000, "longer timeout applied")?;
    Ok(())
}

/// Tests native service override sets executable.
#[test]
fn native_service_override_sets_executable() -> TestResult {
    let overrides = EnvOverrides {
        service_image: Some("/opt/app/bin/server".to_string()),
        ..EnvOverrides::default()
    };
    let mut config = RigConfig::default();
    config.service.controller = ControllerKind::Native;
    config.apply_overrides(&overrides);
    ensure(
        config.service.executable == Some(PathBuf::from("/opt/app/bin/server")),
        "native override targets the executable",
    )
}

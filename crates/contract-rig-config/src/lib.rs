// crates/contract-rig-config/src/lib.rs
// ============================================================================
// Module: Contract Rig Configuration
// Description: Typed configuration for a contract-testing session.
// Purpose: Load a TOML file, layer strict environment overrides, validate.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! A session is configured by one [`RigConfig`]. Every field has a default so
//! an empty file (or no file) yields a runnable configuration. Environment
//! overrides are parsed with strict UTF-8 enforcement and fail closed on empty
//! or malformed values.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod env;
mod model;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use env::EnvOverrides;
pub use env::RigEnv;
pub use env::read_env_strict;
pub use model::ConfigError;
pub use model::ControllerKind;
pub use model::FixtureConfig;
pub use model::FixtureRow;
pub use model::MigrationConfig;
pub use model::MigrationFailurePolicy;
pub use model::ReadinessConfig;
pub use model::ReportConfig;
pub use model::RigConfig;
pub use model::SandboxConfig;
pub use model::ScenarioConfig;
pub use model::ServiceConfig;
pub use model::ServiceEnvNames;
pub use model::TargetConfig;

// crates/contract-rig-sandbox/src/lib.rs
// ============================================================================
// Module: Contract Rig Sandbox
// Description: Ephemeral dependencies and schema for the service under test.
// Purpose: Start and stop the relational and key-value stores, provision the
//          schema, and give scenarios direct fixture access.
// Dependencies: postgres, testcontainers, tokio, tracing, url
// ============================================================================

//! ## Overview
//! [`SandboxManager`] owns the stores for one session through a
//! [`SandboxBackend`]: [`ContainerBackend`] starts throwaway containers on
//! ephemeral ports, [`ExternalBackend`] attaches to stores that are already
//! running. [`SchemaProvisioner`] applies migration units one fresh connection
//! at a time, and [`PgFixtureStore`] implements the core fixture seam.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod container;
pub mod external;
pub mod fixtures;
pub mod manager;
pub mod provision;
pub mod relational;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use backend::SandboxBackend;
pub use backend::StoreGuard;
pub use backend::StoreLease;
pub use container::ContainerBackend;
pub use container::ensure_docker_available;
pub use external::ExternalBackend;
pub use external::parse_key_value_url;
pub use external::parse_relational_url;
pub use fixtures::PgFixtureStore;
pub use manager::SandboxManager;
pub use provision::ApplyReport;
pub use provision::BASELINE_SCHEMA;
pub use provision::SchemaProvisioner;
pub use provision::UnitFailure;
pub use provision::is_benign_failure;
pub use provision::parse_manifest;
pub use relational::ExecError;
pub use relational::PgConnector;
pub use relational::RelationalConnector;
pub use relational::wait_for_relational;

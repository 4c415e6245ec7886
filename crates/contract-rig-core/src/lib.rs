// crates/contract-rig-core/src/lib.rs
// ============================================================================
// Module: Contract Rig Core
// Description: Shared model and seams for the contract-testing orchestrator.
// Purpose: Give every orchestration crate one vocabulary for endpoints,
//          migration units, diagnostics, errors, and process control.
// Dependencies: async-trait, serde, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! `contract-rig-core` holds the types that cross crate boundaries: the
//! sandbox endpoint model, migration units, the fatal and scenario-scoped
//! error taxonomy, the bounded-retry primitive used for every
//! eventual-consistency wait, the [`ProcessController`] seam that lets the
//! launcher drive containers or native processes interchangeably, and the
//! [`FixtureStore`] seam used for relational preconditions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod model;
pub mod process;
pub mod retry;
pub mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use error::AssertionError;
pub use error::MigrationError;
pub use error::NetworkError;
pub use error::NetworkFailureKind;
pub use error::ProvisioningError;
pub use error::ReadinessTimeoutError;
pub use model::Credentials;
pub use model::Diagnostics;
pub use model::KeyValueEndpoint;
pub use model::MigrationUnit;
pub use model::RelationalEndpoint;
pub use model::SandboxEndpoints;
pub use process::ArtifactOrigin;
pub use process::ControllerError;
pub use process::LaunchSpec;
pub use process::ProcessController;
pub use process::ProcessHandle;
pub use process::ResolvedArtifact;
pub use retry::Probe;
pub use retry::RetryExhausted;
pub use retry::RetryPolicy;
pub use retry::retry_until;
pub use store::FixtureStore;
pub use store::StoreError;
pub use store::is_plain_identifier;

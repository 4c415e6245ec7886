// system-tests/src/lib.rs
// ============================================================================
// Module: Contract Rig System Tests Library
// Description: Shared stub service and session harness for system suites.
// Purpose: Let every suite drive the real lifecycle controller end to end.
// Dependencies: axum, contract-rig-cli, tokio
// ============================================================================

//! ## Overview
//! This crate hosts the in-process users service and the session parts that
//! launch it, used by the suites in `system-tests/tests`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod harness;
pub mod stub;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use harness::InProcessController;
pub use harness::LoopbackBackend;
pub use harness::ScratchConnector;
pub use harness::StubArtifact;
pub use harness::StubRig;
pub use harness::features_dir;
pub use harness::stub_launcher;
pub use harness::suite_config;
pub use stub::StoreSlot;
pub use stub::UsersService;
pub use stub::spawn_users_service;

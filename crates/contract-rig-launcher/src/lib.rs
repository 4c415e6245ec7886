// crates/contract-rig-launcher/src/lib.rs
// ============================================================================
// Module: Contract Rig Launcher
// Description: Boots the service under test against the sandbox.
// Purpose: Resolve the artifact, launch it with injected configuration, wait
//          for readiness, and surface diagnostics when it misbehaves.
// Dependencies: reqwest, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! [`ServiceLauncher`] drives one instance through a [`ProcessController`]
//! and an [`ArtifactResolver`]. [`DockerController`] runs containers through
//! the docker CLI; [`NativeController`] runs a host executable.
//!
//! [`ProcessController`]: contract_rig_core::ProcessController

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod address;
pub mod artifact;
pub mod diagnostics;
pub mod docker;
pub mod injection;
pub mod launcher;
pub mod native;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use address::endpoints_for_service;
pub use address::is_loopback_host;
pub use address::platform_gateway;
pub use artifact::ArtifactResolver;
pub use artifact::resolve_artifact;
pub use diagnostics::capture_diagnostics;
pub use docker::DockerController;
pub use injection::service_env;
pub use launcher::LaunchError;
pub use launcher::ServiceInstance;
pub use launcher::ServiceLauncher;
pub use launcher::ServiceStatus;
pub use native::NativeController;
pub use native::free_port;

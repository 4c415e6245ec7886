// crates/contract-rig-cli/src/lib.rs
// ============================================================================
// Module: Contract Rig Session
// Description: Session lifecycle and run reports behind the CLI.
// Purpose: Expose the lifecycle controller so system tests can drive it with
//          fake components.
// Dependencies: contract-rig-sandbox, contract-rig-launcher,
//               contract-rig-scenario, serde_jcs
// ============================================================================

//! ## Overview
//! [`Session`] owns one run from sandbox start to teardown. [`RunSummary`]
//! records what happened and [`write_reports`] persists it to the run root.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod report;
pub mod session;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use report::RunStatus;
pub use report::RunSummary;
pub use report::SetupFailure;
pub use report::Totals;
pub use report::now_rfc3339;
pub use report::render_markdown;
pub use report::write_reports;
pub use session::Session;
pub use session::SessionError;
pub use session::SessionOutcome;
pub use session::SessionParts;
pub use session::selected_scenarios;

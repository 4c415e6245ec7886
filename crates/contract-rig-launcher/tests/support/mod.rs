// crates/contract-rig-launcher/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Result helpers shared by launcher integration tests.
// ============================================================================
//! ## Overview
//! Result-based assertion helpers so tests read as `ensure(cond, msg)?`.

#![allow(dead_code, reason = "Not every suite uses every helper.")]

use std::error::Error;

/// Standard result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Returns an error carrying `message` when `condition` is false.
///
/// # Errors
/// Returns the message as a boxed error when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition { Ok(()) } else { Err(message.into().into()) }
}

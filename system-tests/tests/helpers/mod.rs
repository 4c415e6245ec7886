// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Result helpers shared by system suites.
// ============================================================================

//! ## Overview
//! Result-based assertion helpers so suites read as `ensure(cond, msg)?`.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

use std::error::Error;

/// Standard result type for system suites.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Returns an error carrying `message` when `condition` is false.
///
/// # Errors
/// Returns the message as a boxed error when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition { Ok(()) } else { Err(message.into().into()) }
}

// crates/contract-rig-scenario/src/error.rs
// ============================================================================
// Module: Step Errors
// Description: Failures scoped to a single scenario.
// Purpose: Abort the remaining steps of one scenario, never the session.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Step failures. Each one aborts the remaining steps of its scenario and
//! never the session.

use contract_rig_core::AssertionError;
use contract_rig_core::NetworkError;
use contract_rig_core::StoreError;
use thiserror::Error;

use crate::matcher::MatcherError;

/// Why a step failed.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// No registered pattern matches the step text.
    #[error("no step definition matches `{0}`")]
    Undefined(String),
    /// The HTTP call failed.
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// A response or store check did not hold.
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    /// A fixture operation failed.
    #[error(transparent)]
    Fixture(#[from] StoreError),
    /// Expectation text could not be parsed.
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    /// The step was used incorrectly (missing table, unknown target, ...).
    #[error("{0}")]
    Invalid(String),
}

impl StepError {
    /// Stable classification label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Undefined(_) => "undefined",
            Self::Network(_) => "network",
            Self::Assertion(_) => "assertion",
            Self::Fixture(_) => "fixture",
            Self::Matcher(_) => "matcher",
            Self::Invalid(_) => "invalid",
        }
    }

    /// Invalid step input.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

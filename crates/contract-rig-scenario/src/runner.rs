// crates/contract-rig-scenario/src/runner.rs
// ============================================================================
// Module: Scenario Runner
// Description: Executes one scenario's steps in order against a world.
// Purpose: Abort a scenario at its first failing step and report the
//          failure without affecting the rest of the session.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! Steps run strictly in order. The first failing step marks the scenario
//! failed and every later step is reported as skipped. The failure is logged
//! together with the last response so it can be diagnosed from the log alone.

use std::time::Instant;

use contract_rig_core::Diagnostics;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::StepError;
use crate::feature::Scenario;
use crate::feature::Step;
use crate::registry::StepCall;
use crate::registry::StepRegistry;
use crate::tags::BACKEND_TAG_PREFIX;
use crate::tags::backend_target;
use crate::tags::creates_user;
use crate::world::ScenarioWorld;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Scenario outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Every step passed.
    Passed,
    /// A step failed.
    Failed,
}

impl ScenarioStatus {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and held.
    Passed,
    /// The step ran and failed.
    Failed,
    /// An earlier step failed.
    Skipped,
}

/// One step in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Keyword and text.
    pub text: String,
    /// One-based source line.
    pub line: usize,
    /// Outcome.
    pub status: StepStatus,
}

/// Why a scenario failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Failing step with its keyword.
    pub step: String,
    /// Error classification, see [`StepError::kind`].
    pub kind: String,
    /// Expected versus actual, or the transport failure.
    pub message: String,
}

/// Result of running one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Owning feature.
    pub feature: String,
    /// Scenario name.
    pub name: String,
    /// Effective tags.
    pub tags: Vec<String>,
    /// Outcome.
    pub status: ScenarioStatus,
    /// Per-step outcomes.
    pub steps: Vec<StepReport>,
    /// Present when the scenario failed.
    pub failure: Option<FailureDetail>,
    /// Service diagnostics attached by the session after a failure.
    pub diagnostics: Option<Diagnostics>,
    /// The scenario is tagged as creating users.
    pub creates_user: bool,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Returns true when the scenario passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs scenarios against a step registry.
#[derive(Clone)]
pub struct ScenarioRunner {
    /// Step definitions.
    registry: StepRegistry,
}

impl ScenarioRunner {
    /// Creates a runner over `registry`.
    #[must_use]
    pub const fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
        }
    }

    /// The registry steps are resolved against.
    #[must_use]
    pub const fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Runs `scenario` in `world`. Never fails; failures land in the report.
    pub async fn run(&self, scenario: &Scenario, world: &mut ScenarioWorld) -> ScenarioReport {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut failure = None;

        if let Some(target) = backend_target(&scenario.tags)
            && let Err(err) = world.select_target(target)
        {
            failure = Some(FailureDetail {
                step: format!("@{BACKEND_TAG_PREFIX}{target}"),
                kind: err.kind().to_string(),
                message: err.to_string(),
            });
        }

        for step in &scenario.steps {
            let text = step_label(step);
            if failure.is_some() {
                steps.push(StepReport {
                    text,
                    line: step.line,
                    status: StepStatus::Skipped,
                });
                continue;
            }
            let status = match self.run_step(step, world).await {
                Ok(()) => StepStatus::Passed,
                Err(err) => {
                    log_failure(scenario, &text, &err, world);
                    failure = Some(FailureDetail {
                        step: text.clone(),
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                    StepStatus::Failed
                }
            };
            steps.push(StepReport {
                text,
                line: step.line,
                status,
            });
        }

        let status = if failure.is_some() { ScenarioStatus::Failed } else { ScenarioStatus::Passed };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            feature = %scenario.feature,
            scenario = %scenario.name,
            status = status.as_str(),
            duration_ms,
            "scenario finished"
        );
        ScenarioReport {
            feature: scenario.feature.clone(),
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            status,
            steps,
            failure,
            diagnostics: None,
            creates_user: creates_user(&scenario.tags),
            duration_ms,
        }
    }

    /// Resolves and runs one step.
    async fn run_step(&self, step: &Step, world: &mut ScenarioWorld) -> Result<(), StepError> {
        let (definition, args) =
            self.registry.resolve(&step.text).ok_or_else(|| StepError::Undefined(step.text.clone()))?;
        let call = StepCall {
            text: step.text.clone(),
            args,
            table: step.table.clone(),
            docstring: step.docstring.clone(),
        };
        let handler = definition.handler();
        handler(world, &call).await
    }
}

/// Keyword and text, as shown in reports.
fn step_label(step: &Step) -> String {
    format!("{} {}", step.keyword.as_str(), step.text)
}

/// Logs a failed step with the last response.
fn log_failure(scenario: &Scenario, step: &str, err: &StepError, world: &ScenarioWorld) {
    let (status, body) = world
        .response()
        .map(|response| (Some(response.status), response.body.as_str()))
        .unwrap_or((None, ""));
    warn!(
        feature = %scenario.feature,
        scenario = %scenario.name,
        step,
        kind = err.kind(),
        error = %err,
        target = world.target().unwrap_or("<none>"),
        last_status = status.map(u32::from),
        last_body = body,
        "scenario step failed"
    );
}

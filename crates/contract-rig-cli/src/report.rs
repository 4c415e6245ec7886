// crates/contract-rig-cli/src/report.rs
// ============================================================================
// Module: Run Reports
// Description: Canonical JSON and Markdown summaries of a session.
// Purpose: Leave a durable, diffable record of every run in the run root.
// Dependencies: serde, serde_jcs, time
// ============================================================================

//! ## Overview
//! A [`RunSummary`] is built either from a completed [`SessionOutcome`] or
//! from the setup failure that prevented any scenario from running. It is
//! written as `summary.json` (RFC 8785 canonical JSON) and `summary.md`.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use contract_rig_sandbox::ApplyReport;
use contract_rig_scenario::ScenarioReport;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::session::SessionError;
use crate::session::SessionOutcome;

/// File name of the canonical JSON summary.
pub const SUMMARY_JSON: &str = "summary.json";
/// File name of the Markdown summary.
pub const SUMMARY_MARKDOWN: &str = "summary.md";

// ============================================================================
// SECTION: Model
// ============================================================================

/// Overall run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Setup succeeded and every scenario passed.
    Passed,
    /// At least one scenario failed.
    Failed,
    /// Setup failed; no scenario ran.
    SetupFailed,
}

impl RunStatus {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::SetupFailed => "setup_failed",
        }
    }
}

/// Why setup failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupFailure {
    /// Lifecycle stage.
    pub stage: String,
    /// Full error text, including captured diagnostics.
    pub message: String,
}

/// Scenario counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Scenarios executed.
    pub scenarios: usize,
    /// Scenarios that passed.
    pub passed: usize,
    /// Scenarios that failed.
    pub failed: usize,
}

/// Serializable record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// RFC 3339 generation time.
    pub generated_at: String,
    /// Overall outcome.
    pub status: RunStatus,
    /// Present when setup failed.
    pub setup_failure: Option<SetupFailure>,
    /// Base URL of the launched service.
    pub service_url: Option<String>,
    /// Provisioning summary.
    pub migrations: Option<ApplyReport>,
    /// Scenario counts.
    pub totals: Totals,
    /// Per-scenario reports.
    pub scenarios: Vec<ScenarioReport>,
}

impl RunSummary {
    /// Summarizes a completed session.
    #[must_use]
    pub fn from_outcome(outcome: &SessionOutcome, generated_at: String) -> Self {
        let failed = outcome.failed();
        let totals = Totals {
            scenarios: outcome.scenarios.len(),
            passed: outcome.scenarios.len() - failed,
            failed,
        };
        Self {
            generated_at,
            status: if failed == 0 { RunStatus::Passed } else { RunStatus::Failed },
            setup_failure: None,
            service_url: Some(outcome.service_url.clone()),
            migrations: Some(outcome.migrations.clone()),
            totals,
            scenarios: outcome.scenarios.clone(),
        }
    }

    /// Summarizes a session whose setup failed.
    #[must_use]
    pub fn from_setup_error(err: &SessionError, generated_at: String) -> Self {
        Self {
            generated_at,
            status: RunStatus::SetupFailed,
            setup_failure: Some(SetupFailure {
                stage: err.stage().to_string(),
                message: err.to_string(),
            }),
            service_url: None,
            migrations: None,
            totals: Totals::default(),
            scenarios: Vec::new(),
        }
    }
}

/// Current time as RFC 3339, or the unix epoch label if formatting fails.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the Markdown summary.
#[must_use]
pub fn render_markdown(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str("# Contract run summary\n\n");
    output.push_str(&format!("- Status: **{}**\n", summary.status.as_str()));
    output.push_str(&format!("- Generated: {}\n", summary.generated_at));
    if let Some(url) = &summary.service_url {
        output.push_str(&format!("- Service: {url}\n"));
    }
    if let Some(migrations) = &summary.migrations {
        output.push_str(&format!(
            "- Migrations: {} applied, {} already applied, {} failed, {} skipped{}\n",
            migrations.applied.len(),
            migrations.benign.len(),
            migrations.failed.len(),
            migrations.skipped.len(),
            if migrations.baseline { " (baseline schema)" } else { "" }
        ));
    }
    output.push_str(&format!(
        "- Scenarios: {} run, {} passed, {} failed\n",
        summary.totals.scenarios, summary.totals.passed, summary.totals.failed
    ));

    if let Some(failure) = &summary.setup_failure {
        output.push_str(&format!("\n## Setup failed ({})\n\n", failure.stage));
        push_fenced(&mut output, &failure.message);
        return output;
    }

    if summary.scenarios.is_empty() {
        output.push_str("\nNo scenarios selected.\n");
        return output;
    }

    output.push_str("\n| Status | Feature | Scenario | Duration (ms) |\n|---|---|---|---|\n");
    for scenario in &summary.scenarios {
        output.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            scenario.status.as_str(),
            escape_cell(&scenario.feature),
            escape_cell(&scenario.name),
            scenario.duration_ms
        ));
    }

    for scenario in summary.scenarios.iter().filter(|scenario| !scenario.passed()) {
        output.push_str(&format!("\n## Failed: {} / {}\n\n", scenario.feature, scenario.name));
        if let Some(failure) = &scenario.failure {
            output.push_str(&format!("- Step: `{}`\n", failure.step));
            output.push_str(&format!("- Kind: {}\n\n", failure.kind));
            push_fenced(&mut output, &failure.message);
        }
        if let Some(diagnostics) = scenario.diagnostics.as_ref().filter(|diagnostics| !diagnostics.is_empty()) {
            output.push_str("\nService diagnostics:\n\n");
            push_fenced(&mut output, &diagnostics.to_string());
        }
    }
    output
}

/// Appends `text` inside a fenced block.
fn push_fenced(output: &mut String, text: &str) {
    output.push_str("```text\n");
    output.push_str(text.trim_end());
    output.push_str("\n```\n");
}

/// Escapes pipes and newlines for a Markdown table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

// ============================================================================
// SECTION: Writing
// ============================================================================

/// Writes `summary.json` and `summary.md` into `run_root`, creating it.
///
/// # Errors
///
/// Returns [`SessionError::Report`] when serialization or a write fails.
pub fn write_reports(run_root: &Path, summary: &RunSummary) -> Result<(PathBuf, PathBuf), SessionError> {
    fs::create_dir_all(run_root)
        .map_err(|err| SessionError::Report(format!("create {}: {err}", run_root.display())))?;
    let mut json = serde_jcs::to_vec(summary).map_err(|err| SessionError::Report(err.to_string()))?;
    json.push(b'\n');
    let json_path = run_root.join(SUMMARY_JSON);
    fs::write(&json_path, json)
        .map_err(|err| SessionError::Report(format!("write {}: {err}", json_path.display())))?;
    let markdown_path = run_root.join(SUMMARY_MARKDOWN);
    fs::write(&markdown_path, render_markdown(summary))
        .map_err(|err| SessionError::Report(format!("write {}: {err}", markdown_path.display())))?;
    Ok((json_path, markdown_path))
}

// crates/contract-rig-launcher/src/diagnostics.rs
// ============================================================================
// Module: Launch Diagnostics
// Description: Log tail, process and listening-port snapshots.
// Purpose: Shortcut root-cause analysis when the service misbehaves.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! Capture never fails: each section that cannot be collected records why
//! instead, so a broken boundary still yields a useful report.

use contract_rig_core::Diagnostics;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use tracing::debug;

/// Process listing command.
const PROCESS_COMMAND: [&str; 2] = ["ps", "aux"];
/// Listening-port listing, falling back across common tools.
const PORTS_COMMAND: [&str; 3] = ["sh", "-c", "netstat -tlnp 2>/dev/null || ss -tlnp"];

/// Collects a diagnostics snapshot for `handle`.
pub async fn capture_diagnostics(
    controller: &dyn ProcessController,
    handle: &ProcessHandle,
    tail: usize,
) -> Diagnostics {
    let log_tail = controller
        .logs(handle, tail)
        .await
        .unwrap_or_else(|err| format!("log capture unavailable: {err}"));
    let processes = controller
        .exec(handle, &PROCESS_COMMAND)
        .await
        .unwrap_or_else(|err| format!("process listing unavailable: {err}"));
    let listening_ports = controller
        .exec(handle, &PORTS_COMMAND)
        .await
        .unwrap_or_else(|err| format!("port listing unavailable: {err}"));
    debug!(instance = %handle.name, "diagnostics captured");
    Diagnostics {
        log_tail,
        processes,
        listening_ports,
    }
}

/// Checks whether `process_name` appears in the process listing.
///
/// Returns `None` when the listing itself could not be taken.
pub async fn primary_process_present(
    controller: &dyn ProcessController,
    handle: &ProcessHandle,
    process_name: &str,
) -> Option<bool> {
    controller
        .exec(handle, &PROCESS_COMMAND)
        .await
        .ok()
        .map(|listing| listing.lines().any(|line| line.contains(process_name)))
}

/// Keeps the last `count` lines of `text`.
#[must_use]
pub fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start ..].join("\n")
}

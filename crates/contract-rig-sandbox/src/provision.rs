// crates/contract-rig-sandbox/src/provision.rs
// ============================================================================
// Module: Schema Provisioner
// Description: Applies an ordered migration manifest to the relational store.
// Purpose: Confine each unit's failure to its own session and classify
//          idempotent re-application noise as benign.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! The manifest lists one unit name per line; blank lines, `#` comments,
//! `%` pragmas and `@` tags are ignored, and only the first token of a line is
//! the name. Each name resolves to `<deploy_dir>/<name>.<extension>`; missing
//! payloads are skipped with a warning.
//!
//! Every unit runs on a fresh connection. A failure whose message says the
//! object already exists, does not exist, or violates a unique key is benign.
//! Other failures follow [`MigrationFailurePolicy`]: `warn` records and
//! continues, `abort` stops with [`MigrationError::UnitFailed`]. Losing the
//! connection itself is always fatal.
//!
//! Without a manifest a minimal baseline schema is applied instead.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use contract_rig_config::MigrationConfig;
use contract_rig_config::MigrationFailurePolicy;
use contract_rig_core::MigrationError;
use contract_rig_core::MigrationUnit;
use contract_rig_core::RelationalEndpoint;
use contract_rig_core::SandboxEndpoints;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::relational::ExecError;
use crate::relational::RelationalConnector;

/// Schema applied when no manifest exists.
pub const BASELINE_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS clientes (
    id BIGSERIAL PRIMARY KEY,
    email VARCHAR(200) NOT NULL UNIQUE,
    senha_sha256 VARCHAR(200),
    nome_completo VARCHAR(200),
    apelido VARCHAR(200),
    status VARCHAR(20) NOT NULL DEFAULT 'setup',
    created_on TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS geo_cache (
    id BIGSERIAL PRIMARY KEY,
    search_term TEXT NOT NULL UNIQUE,
    result TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

/// Error fragments that count as already applied under the lenient policy.
const BENIGN_MARKERS: [&str; 3] = ["already exists", "does not exist", "duplicate key"];

// ============================================================================
// SECTION: Report
// ============================================================================

/// A unit that failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// Unit name.
    pub unit: String,
    /// Server message.
    pub message: String,
}

/// Outcome of one provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Units that ran cleanly, in order.
    pub applied: Vec<String>,
    /// Units that failed with idempotency noise.
    pub benign: Vec<UnitFailure>,
    /// Units that failed for any other reason under the warn policy.
    pub failed: Vec<UnitFailure>,
    /// Units whose payload file was not found.
    pub skipped: Vec<String>,
    /// True when the baseline schema stood in for a missing manifest.
    pub baseline: bool,
}

impl ApplyReport {
    /// Count of successfully applied units.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Returns true when a failure message indicates re-application of work that
/// is already done.
#[must_use]
pub fn is_benign_failure(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    BENIGN_MARKERS.iter().any(|marker| lowered.contains(marker))
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Extracts unit names from manifest text.
#[must_use]
pub fn parse_manifest(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with(['#', '%', '@']))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Reads the manifest and resolves payloads; returns units plus skipped names.
///
/// # Errors
///
/// Returns [`MigrationError::Manifest`] when the manifest exists but cannot be
/// read.
pub fn load_units(
    manifest: &Path,
    deploy_dir: &Path,
    extension: &str,
) -> Result<(Vec<MigrationUnit>, Vec<String>), MigrationError> {
    let text = fs::read_to_string(manifest).map_err(|err| MigrationError::Manifest {
        path: manifest.display().to_string(),
        message: err.to_string(),
    })?;
    let mut units = Vec::new();
    let mut skipped = Vec::new();
    for (ordinal, name) in parse_manifest(&text).into_iter().enumerate() {
        let path = deploy_dir.join(format!("{name}.{extension}"));
        match fs::read_to_string(&path) {
            Ok(payload) => units.push(MigrationUnit {
                name,
                ordinal,
                payload,
            }),
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    warn!(unit = %name, path = %path.display(), "migration payload missing; skipping");
                } else {
                    warn!(unit = %name, path = %path.display(), error = %err, "migration payload unreadable; skipping");
                }
                skipped.push(name);
            }
        }
    }
    Ok((units, skipped))
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Applies migration units one fresh session at a time.
pub struct SchemaProvisioner {
    /// Connector that applies the units.
    connector: Arc<dyn RelationalConnector>,
    /// Migration settings.
    config: MigrationConfig,
}

impl SchemaProvisioner {
    /// Creates a provisioner over `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn RelationalConnector>, config: MigrationConfig) -> Self {
        Self {
            connector,
            config,
        }
    }

    /// Applies the manifest at `manifest` (or the baseline when it is absent).
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Connect`] when the store cannot be reached,
    /// [`MigrationError::Manifest`] when the manifest is unreadable, and
    /// [`MigrationError::UnitFailed`] under the abort policy.
    pub async fn apply(
        &self,
        endpoints: &SandboxEndpoints,
        manifest: &Path,
    ) -> Result<ApplyReport, MigrationError> {
        let endpoint = &endpoints.relational;
        self.connector
            .query_column(endpoint, "SELECT 1")
            .await
            .map_err(|err| connect_error(endpoint, &err))?;

        let mut report = ApplyReport::default();
        if !manifest.exists() {
            warn!(manifest = %manifest.display(), "no migration manifest; applying baseline schema");
            report.baseline = true;
            let unit = MigrationUnit {
                name: "baseline".to_string(),
                ordinal: 0,
                payload: BASELINE_SCHEMA.to_string(),
            };
            self.apply_unit(endpoint, &unit, &mut report).await?;
            return Ok(report);
        }

        let (units, skipped) =
            load_units(manifest, &self.config.deploy_dir, &self.config.extension)?;
        report.skipped = skipped;
        for unit in &units {
            self.apply_unit(endpoint, unit, &mut report).await?;
        }
        info!(
            applied = report.applied.len(),
            benign = report.benign.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "schema provisioning finished"
        );
        Ok(report)
    }

    /// Applies one unit and classifies a failure against the policy.
    async fn apply_unit(
        &self,
        endpoint: &RelationalEndpoint,
        unit: &MigrationUnit,
        report: &mut ApplyReport,
    ) -> Result<(), MigrationError> {
        match self.connector.execute_batch(endpoint, &unit.payload).await {
            Ok(()) => {
                info!(unit = %unit.name, ordinal = unit.ordinal, "migration applied");
                report.applied.push(unit.name.clone());
                Ok(())
            }
            Err(err @ ExecError::Connect(_)) => Err(connect_error(endpoint, &err)),
            Err(ExecError::Statement(message)) => {
                let failure = UnitFailure {
                    unit: unit.name.clone(),
                    message,
                };
                if is_benign_failure(&failure.message) {
                    info!(unit = %failure.unit, message = %failure.message, "migration already applied");
                    report.benign.push(failure);
                    return Ok(());
                }
                match self.config.on_failure {
                    MigrationFailurePolicy::Warn => {
                        warn!(unit = %failure.unit, message = %failure.message, "migration failed; continuing");
                        report.failed.push(failure);
                        Ok(())
                    }
                    MigrationFailurePolicy::Abort => Err(MigrationError::UnitFailed {
                        unit: failure.unit,
                        message: failure.message,
                    }),
                }
            }
        }
    }
}

/// Error for an unreachable store.
fn connect_error(endpoint: &RelationalEndpoint, err: &ExecError) -> MigrationError {
    MigrationError::Connect {
        endpoint: format!("{}:{}", endpoint.host, endpoint.port),
        message: err.to_string(),
    }
}

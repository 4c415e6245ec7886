// crates/contract-rig-launcher/src/artifact.rs
// ============================================================================
// Module: Artifact Resolution
// Description: Local, then remote, then build-from-source fallback chain.
// Purpose: Produce a runnable artifact or explain every attempt that failed.
// Dependencies: async-trait, tracing
// ============================================================================

//! ## Overview
//! Artifact resolution chain: local, then remote, then build from source.

use async_trait::async_trait;
use contract_rig_core::ArtifactOrigin;
use contract_rig_core::ProvisioningError;
use contract_rig_core::ResolvedArtifact;
use tracing::info;
use tracing::warn;

/// One way of obtaining the service artifact per origin.
///
/// Each method returns `Err` with a reason when that source cannot supply the
/// artifact.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    /// Reference reported when every source fails.
    fn artifact_name(&self) -> String;

    /// Looks for an artifact already present on this host.
    async fn find_local(&self) -> Result<ResolvedArtifact, String>;

    /// Fetches the artifact from a remote source.
    async fn fetch_remote(&self) -> Result<ResolvedArtifact, String>;

    /// Builds the artifact from source.
    async fn build_from_source(&self) -> Result<ResolvedArtifact, String>;
}

/// Walks the fallback chain and returns the first artifact obtained.
///
/// # Errors
///
/// Returns [`ProvisioningError::ArtifactUnavailable`] listing every failed
/// attempt when no source produced an artifact.
pub async fn resolve_artifact(
    resolver: &dyn ArtifactResolver,
) -> Result<ResolvedArtifact, ProvisioningError> {
    let mut attempts = Vec::new();
    for origin in [ArtifactOrigin::Local, ArtifactOrigin::Remote, ArtifactOrigin::Built] {
        info!(origin = origin.as_str(), "resolving service artifact");
        let outcome = match origin {
            ArtifactOrigin::Local => resolver.find_local().await,
            ArtifactOrigin::Remote => resolver.fetch_remote().await,
            ArtifactOrigin::Built => resolver.build_from_source().await,
        };
        match outcome {
            Ok(artifact) => {
                info!(origin = origin.as_str(), reference = %artifact.reference, "service artifact resolved");
                return Ok(artifact);
            }
            Err(reason) => {
                warn!(origin = origin.as_str(), %reason, "artifact source unavailable");
                attempts.push(format!("{}: {reason}", origin.as_str()));
            }
        }
    }
    Err(ProvisioningError::ArtifactUnavailable {
        artifact: resolver.artifact_name(),
        attempts: attempts.join("; "),
    })
}

// crates/contract-rig-launcher/src/docker.rs
// ============================================================================
// Module: Docker Controller
// Description: Runs the service under test as a container via the docker CLI.
// Purpose: Implement the process seam and artifact chain for containers.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Containers publish the service port on an ephemeral loopback host port
//! (`-p 127.0.0.1::<port>`). Images resolve local first, then by pull, then by
//! `docker build`. Missing containers map to [`ControllerError::NotFound`].

use std::path::PathBuf;

use async_trait::async_trait;
use contract_rig_config::ServiceConfig;
use contract_rig_core::ArtifactOrigin;
use contract_rig_core::ControllerError;
use contract_rig_core::LaunchSpec;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use contract_rig_core::ResolvedArtifact;
use tokio::process::Command;
use tracing::debug;

use crate::address::platform_gateway;
use crate::artifact::ArtifactResolver;

/// Output of one docker invocation.
struct DockerOutput {
    /// Captured standard output.
    stdout: String,
    /// Captured standard error.
    stderr: String,
}

/// Container controller backed by the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerController {
    /// Docker CLI binary.
    binary: String,
    /// Local image tag.
    image: String,
    /// Registry reference pulled when the local tag is missing.
    remote_image: Option<String>,
    /// Build context for the source fallback.
    build_context: Option<PathBuf>,
    /// Dockerfile for the source fallback.
    dockerfile: Option<PathBuf>,
}

impl DockerController {
    /// Builds a controller from the service configuration.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            binary: "docker".to_string(),
            image: config.image.clone(),
            remote_image: config.remote_image.clone(),
            build_context: config.build_context.clone(),
            dockerfile: config.dockerfile.clone(),
        }
    }

    /// Runs the CLI and captures output. A non-zero exit is an error.
    async fn run(&self, args: &[String]) -> Result<DockerOutput, ControllerError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(%command, "docker invocation");
        let output = Command::new(&self.binary).args(args).output().await.map_err(|err| {
            ControllerError::Command {
                command: command.clone(),
                message: err.to_string(),
            }
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            return Ok(DockerOutput {
                stdout,
                stderr,
            });
        }
        if stderr.contains("No such container") || stderr.contains("No such object") {
            return Err(ControllerError::NotFound(args.last().cloned().unwrap_or_default()));
        }
        Err(ControllerError::Command {
            command,
            message: stderr.trim().to_string(),
        })
    }

    /// Runs the CLI and returns trimmed stdout.
    async fn stdout(&self, args: &[&str]) -> Result<String, ControllerError> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        Ok(self.run(&args).await?.stdout)
    }
}

/// Builds the `docker run` argument list for `spec`.
#[must_use]
pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "-p".to_string(),
        format!("127.0.0.1::{}", spec.internal_port),
    ];
    for host in &spec.extra_hosts {
        args.push("--add-host".to_string());
        args.push(host.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.artifact.reference.clone());
    args
}

/// Extracts the host port from `docker port` output such as `0.0.0.0:49153`.
#[must_use]
pub fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.trim().parse().ok())
}

/// Parses `docker ps --format '{{.ID}} {{.Names}}'` output.
#[must_use]
pub fn parse_listing(output: &str) -> Vec<ProcessHandle> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(id, name)| ProcessHandle {
            id: id.to_string(),
            name: name.trim().to_string(),
        })
        .collect()
}

#[async_trait]
impl ProcessController for DockerController {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ControllerError> {
        let output = self.run(&run_args(spec)).await?;
        Ok(ProcessHandle {
            id: output.stdout.trim().to_string(),
            name: spec.name.clone(),
        })
    }

    async fn stop(&self, handle: &ProcessHandle) -> Result<(), ControllerError> {
        self.stdout(&["rm", "-f", &handle.id]).await.map(|_| ())
    }

    async fn logs(&self, handle: &ProcessHandle, tail: usize) -> Result<String, ControllerError> {
        let tail = tail.to_string();
        let args = ["logs", "--tail", tail.as_str(), handle.id.as_str()].map(str::to_string);
        let output = self.run(&args).await?;
        Ok(format!("{}{}", output.stdout, output.stderr))
    }

    async fn exec(
        &self,
        handle: &ProcessHandle,
        command: &[&str],
    ) -> Result<String, ControllerError> {
        let mut args = vec!["exec", handle.id.as_str()];
        args.extend_from_slice(command);
        self.stdout(&args).await
    }

    async fn is_running(&self, handle: &ProcessHandle) -> Result<bool, ControllerError> {
        let output = self.stdout(&["inspect", "-f", "{{.State.Running}}", &handle.id]).await?;
        Ok(output.trim() == "true")
    }

    async fn external_port(
        &self,
        handle: &ProcessHandle,
        internal_port: u16,
    ) -> Result<Option<u16>, ControllerError> {
        let port = format!("{internal_port}/tcp");
        let output = self.stdout(&["port", &handle.id, &port]).await?;
        Ok(parse_port_mapping(&output))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ProcessHandle>, ControllerError> {
        let filter = format!("name=^{prefix}");
        let output =
            self.stdout(&["ps", "-a", "--filter", &filter, "--format", "{{.ID}} {{.Names}}"]).await?;
        Ok(parse_listing(&output))
    }

    async fn gateway_address(&self) -> Option<String> {
        let os = std::env::consts::OS;
        let inspected = if os == "linux" {
            self.stdout(&[
                "network",
                "inspect",
                "bridge",
                "--format",
                "{{range .IPAM.Config}}{{.Gateway}}{{end}}",
            ])
            .await
            .ok()
        } else {
            None
        };
        Some(platform_gateway(os, inspected.as_deref()))
    }
}

#[async_trait]
impl ArtifactResolver for DockerController {
    fn artifact_name(&self) -> String {
        self.image.clone()
    }

    async fn find_local(&self) -> Result<ResolvedArtifact, String> {
        self.stdout(&["image", "inspect", "--format", "{{.Id}}", &self.image])
            .await
            .map_err(|err| format!("image {} not present locally: {err}", self.image))?;
        Ok(ResolvedArtifact {
            reference: self.image.clone(),
            origin: ArtifactOrigin::Local,
        })
    }

    async fn fetch_remote(&self) -> Result<ResolvedArtifact, String> {
        let remote = self.remote_image.as_deref().unwrap_or(&self.image);
        self.stdout(&["pull", remote]).await.map_err(|err| format!("pull {remote}: {err}"))?;
        Ok(ResolvedArtifact {
            reference: remote.to_string(),
            origin: ArtifactOrigin::Remote,
        })
    }

    async fn build_from_source(&self) -> Result<ResolvedArtifact, String> {
        let context = self.build_context.as_ref().ok_or("no build context configured")?;
        let mut args = vec!["build".to_string(), "-t".to_string(), self.image.clone()];
        if let Some(dockerfile) = &self.dockerfile {
            args.push("-f".to_string());
            args.push(context.join(dockerfile).display().to_string());
        }
        args.push(context.display().to_string());
        self.run(&args).await.map_err(|err| format!("build {}: {err}", context.display()))?;
        Ok(ResolvedArtifact {
            reference: self.image.clone(),
            origin: ArtifactOrigin::Built,
        })
    }
}

// crates/contract-rig-launcher/src/native.rs
// ============================================================================
// Module: Native Controller
// Description: Runs the service under test as a host process.
// Purpose: Offer a controller for hosts without a container runtime.
// Dependencies: reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! The service listens on a free loopback port handed over through `PORT`, so
//! the external port equals the port it binds. Output goes to a per-instance
//! log file under the run directory. Loopback endpoints are reachable as-is,
//! so no gateway rewrite applies.

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use contract_rig_config::ServiceConfig;
use contract_rig_core::ArtifactOrigin;
use contract_rig_core::ControllerError;
use contract_rig_core::LaunchSpec;
use contract_rig_core::ProcessController;
use contract_rig_core::ProcessHandle;
use contract_rig_core::ResolvedArtifact;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::info;

use crate::artifact::ArtifactResolver;
use crate::diagnostics::tail_lines;

/// Environment variable carrying the listen port.
pub const PORT_ENV: &str = "PORT";

/// A spawned service process.
struct NativeChild {
    /// Instance name.
    name: String,
    /// Child process handle.
    child: Child,
    /// Port the service listens on.
    port: u16,
    /// File receiving stdout and stderr.
    log_path: PathBuf,
}

/// Host-process controller.
pub struct NativeController {
    /// Prebuilt executable path.
    executable: Option<PathBuf>,
    /// Download location for the remote fallback.
    download_url: Option<String>,
    /// Build command for the source fallback.
    build_command: Vec<String>,
    /// Working directory for builds and launches.
    working_dir: Option<PathBuf>,
    /// Directory holding per-instance logs.
    log_dir: PathBuf,
    /// Running children by instance name.
    children: Mutex<HashMap<String, NativeChild>>,
}

impl NativeController {
    /// Builds a controller writing instance logs under `log_dir`.
    #[must_use]
    pub fn from_config(config: &ServiceConfig, log_dir: PathBuf) -> Self {
        Self {
            executable: config.executable.clone(),
            download_url: config.download_url.clone(),
            build_command: config.build_command.clone(),
            working_dir: config.working_dir.clone(),
            log_dir,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Configured executable path.
    fn executable(&self) -> Result<&Path, String> {
        self.executable.as_deref().ok_or_else(|| "no executable configured".to_string())
    }
}

/// Reserves a free loopback port by binding and releasing it.
///
/// # Errors
///
/// Returns [`ControllerError::Command`] when no port can be bound.
pub fn free_port() -> Result<u16, ControllerError> {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|err| ControllerError::Command {
            command: "bind 127.0.0.1:0".to_string(),
            message: err.to_string(),
        })
}

/// Wraps a failed command into a controller error.
fn command_error(command: &str, err: impl ToString) -> ControllerError {
    ControllerError::Command {
        command: command.to_string(),
        message: err.to_string(),
    }
}

/// Creates the instance log and a second handle to it for stderr.
async fn open_log(path: &Path) -> Result<(std::fs::File, std::fs::File), ControllerError> {
    let stdout = tokio::fs::File::create(path).await.map_err(|err| command_error("create log", err))?;
    let stderr = stdout.try_clone().await.map_err(|err| command_error("clone log", err))?;
    Ok((stdout.into_std().await, stderr.into_std().await))
}

/// True when `path` names a regular file.
async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}

#[async_trait]
impl ProcessController for NativeController {
    async fn start(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ControllerError> {
        let program = spec.artifact.reference.as_str();
        let port = free_port()?;
        tokio::fs::create_dir_all(&self.log_dir)
            .await
            .map_err(|err| command_error("create log dir", err))?;
        let log_path = self.log_dir.join(format!("{}.log", spec.name));
        let (stdout, stderr) = open_log(&log_path).await?;

        let mut command = Command::new(program);
        command
            .envs(&spec.env)
            .env(PORT_ENV, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|err| command_error(program, err))?;
        let id = child.id().map_or_else(|| spec.name.clone(), |pid| pid.to_string());
        info!(instance = %spec.name, pid = %id, port, "native service spawned");
        self.children.lock().await.insert(
            id.clone(),
            NativeChild {
                name: spec.name.clone(),
                child,
                port,
                log_path,
            },
        );
        Ok(ProcessHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn stop(&self, handle: &ProcessHandle) -> Result<(), ControllerError> {
        let Some(mut entry) = self.children.lock().await.remove(&handle.id) else {
            return Err(ControllerError::NotFound(handle.id.clone()));
        };
        if matches!(entry.child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        entry.child.kill().await.map_err(|err| command_error("kill", err))
    }

    async fn logs(&self, handle: &ProcessHandle, tail: usize) -> Result<String, ControllerError> {
        let log_path = self
            .children
            .lock()
            .await
            .get(&handle.id)
            .map(|entry| entry.log_path.clone())
            .ok_or_else(|| ControllerError::NotFound(handle.id.clone()))?;
        let text = tokio::fs::read_to_string(&log_path)
            .await
            .map_err(|err| command_error("read log", err))?;
        Ok(tail_lines(&text, tail))
    }

    async fn exec(
        &self,
        _handle: &ProcessHandle,
        command: &[&str],
    ) -> Result<String, ControllerError> {
        let Some((program, args)) = command.split_first() else {
            return Err(ControllerError::Unsupported("empty command".to_string()));
        };
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|err| command_error(program, err))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn is_running(&self, handle: &ProcessHandle) -> Result<bool, ControllerError> {
        let mut children = self.children.lock().await;
        let entry =
            children.get_mut(&handle.id).ok_or_else(|| ControllerError::NotFound(handle.id.clone()))?;
        entry.child.try_wait().map(|status| status.is_none()).map_err(|err| command_error("wait", err))
    }

    async fn external_port(
        &self,
        handle: &ProcessHandle,
        _internal_port: u16,
    ) -> Result<Option<u16>, ControllerError> {
        Ok(self.children.lock().await.get(&handle.id).map(|entry| entry.port))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ProcessHandle>, ControllerError> {
        Ok(self
            .children
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| entry.name.starts_with(prefix))
            .map(|(id, entry)| ProcessHandle {
                id: id.clone(),
                name: entry.name.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ArtifactResolver for NativeController {
    fn artifact_name(&self) -> String {
        self.executable
            .as_ref()
            .map_or_else(|| "<unconfigured executable>".to_string(), |path| path.display().to_string())
    }

    async fn find_local(&self) -> Result<ResolvedArtifact, String> {
        let executable = self.executable()?;
        if !is_file(executable).await {
            return Err(format!("{} does not exist", executable.display()));
        }
        Ok(ResolvedArtifact {
            reference: executable.display().to_string(),
            origin: ArtifactOrigin::Local,
        })
    }

    async fn fetch_remote(&self) -> Result<ResolvedArtifact, String> {
        let url = self.download_url.as_deref().ok_or("no download url configured")?;
        let executable = self.executable()?;
        let response = reqwest::get(url).await.map_err(|err| format!("download {url}: {err}"))?;
        if !response.status().is_success() {
            return Err(format!("download {url}: status {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|err| format!("download {url}: {err}"))?;
        if let Some(parent) = executable.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| err.to_string())?;
        }
        tokio::fs::write(executable, &bytes).await.map_err(|err| err.to_string())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(executable, permissions).await.map_err(|err| err.to_string())?;
        }
        Ok(ResolvedArtifact {
            reference: executable.display().to_string(),
            origin: ArtifactOrigin::Remote,
        })
    }

    async fn build_from_source(&self) -> Result<ResolvedArtifact, String> {
        let Some((program, args)) = self.build_command.split_first() else {
            return Err("no build command configured".to_string());
        };
        let executable = self.executable()?;
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let output = command.output().await.map_err(|err| format!("{program}: {err}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{program} exited with {}: {}", output.status, stderr.trim()));
        }
        if !is_file(executable).await {
            return Err(format!("build finished but {} is missing", executable.display()));
        }
        Ok(ResolvedArtifact {
            reference: executable.display().to_string(),
            origin: ArtifactOrigin::Built,
        })
    }
}

//! Container runtime access
//!
//! Environments are built from plain `docker`/`podman` CLI calls. The
//! [`ContainerDriver`] trait is the seam the environment lifecycle talks to,
//! so provisioning and teardown can be exercised without a runtime.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Label carrying the owning environment id
pub const LABEL_ENVIRONMENT: &str = "wpacceptance.environment";

/// Label carrying the snapshot an environment was built from
pub const LABEL_SNAPSHOT: &str = "wpacceptance.snapshot";

/// Container runtime detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect available container runtime
    pub fn detect() -> Option<Self> {
        // Docker first: the WordPress images are published for it
        if Self::available("docker") {
            return Some(Self::Docker);
        }
        if Self::available("podman") {
            return Some(Self::Podman);
        }
        None
    }

    fn available(cmd: &str) -> bool {
        Command::new(cmd)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = E2eError;

    fn from_str(s: &str) -> E2eResult<Self> {
        match s {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(E2eError::ContainerRuntime(format!("unknown runtime '{}'", other))),
        }
    }
}

/// Bind mount from the host into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

/// Everything needed to start one detached container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub env: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    /// Container port published on a random loopback port
    pub publish: Option<u16>,
}

impl ContainerSpec {
    /// Build `run` arguments for the runtime CLI
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];

        if let Some(network) = &self.network {
            args.extend(["--network".to_string(), network.clone()]);
            // Reachable by its name from sibling containers
            args.extend(["--network-alias".to_string(), self.name.clone()]);
        }

        for (key, value) in &self.labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }

        for (key, value) in &self.env {
            args.extend(["--env".to_string(), format!("{}={}", key, value)]);
        }

        for mount in &self.mounts {
            let mode = if mount.read_only { ":ro" } else { "" };
            args.extend([
                "--volume".to_string(),
                format!("{}:{}{}", mount.host.display(), mount.container, mode),
            ]);
        }

        if let Some(port) = self.publish {
            args.extend(["--publish".to_string(), format!("127.0.0.1::{}", port)]);
        }

        args.push(self.image.clone());
        args
    }
}

/// Operations the environment lifecycle needs from a container runtime
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn create_network(&self, name: &str, labels: &[(String, String)]) -> E2eResult<()>;

    /// Remove a network; a missing network is not an error
    async fn remove_network(&self, name: &str) -> E2eResult<()>;

    /// Start a detached container and return its id
    async fn run_container(&self, spec: &ContainerSpec) -> E2eResult<String>;

    /// Force-remove a container; a missing container is not an error
    async fn remove_container(&self, name: &str) -> E2eResult<()>;

    /// Host port a published container port is mapped to
    async fn host_port(&self, name: &str, container_port: u16) -> E2eResult<u16>;

    /// Run a command inside a container and return stdout
    async fn exec(&self, name: &str, cmd: &[String]) -> E2eResult<String>;

    /// Names of containers carrying `label` (`key` or `key=value`)
    async fn list_containers(&self, label: &str) -> E2eResult<Vec<String>>;

    /// Names of networks carrying `label`
    async fn list_networks(&self, label: &str) -> E2eResult<Vec<String>>;

    /// Blocking removal used from `Drop`, where no runtime is available
    fn remove_container_blocking(&self, name: &str);

    fn remove_network_blocking(&self, name: &str);
}

/// [`ContainerDriver`] that shells out to docker or podman
pub struct CliContainerDriver {
    runtime: ContainerRuntime,
}

impl CliContainerDriver {
    pub fn new(runtime: ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Use whichever runtime is installed
    pub fn detect() -> E2eResult<Self> {
        ContainerRuntime::detect()
            .map(Self::new)
            .ok_or(E2eError::RuntimeNotFound)
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    async fn run(&self, args: &[String]) -> E2eResult<String> {
        let cmd = self.runtime.command();
        debug!("{} {}", cmd, args.join(" "));

        let output = AsyncCommand::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| E2eError::ContainerRuntime(format!("failed to run {}: {}", cmd, e)))?;

        if !output.status.success() {
            return Err(E2eError::ContainerRuntime(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_blocking(&self, args: &[&str]) {
        let _ = Command::new(self.runtime.command())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

fn is_missing(err: &E2eError) -> bool {
    match err {
        E2eError::ContainerRuntime(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("no such") || msg.contains("not found")
        }
        _ => false,
    }
}

fn lines(output: String) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `docker port` output such as `127.0.0.1:49153` or `[::]:49153`
pub fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}

#[async_trait]
impl ContainerDriver for CliContainerDriver {
    async fn create_network(&self, name: &str, labels: &[(String, String)]) -> E2eResult<()> {
        let mut args = vec!["network".to_string(), "create".to_string()];
        for (key, value) in labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }
        args.push(name.to_string());
        self.run(&args).await.map(|_| ())
    }

    async fn remove_network(&self, name: &str) -> E2eResult<()> {
        let args = ["network".to_string(), "rm".to_string(), name.to_string()];
        match self.run(&args).await {
            Err(e) if is_missing(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn run_container(&self, spec: &ContainerSpec) -> E2eResult<String> {
        self.run(&spec.run_args()).await
    }

    async fn remove_container(&self, name: &str) -> E2eResult<()> {
        let args = ["rm".to_string(), "--force".to_string(), name.to_string()];
        match self.run(&args).await {
            Err(e) if is_missing(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn host_port(&self, name: &str, container_port: u16) -> E2eResult<u16> {
        let args = [
            "port".to_string(),
            name.to_string(),
            format!("{}/tcp", container_port),
        ];
        let output = self.run(&args).await?;
        parse_port_output(&output).ok_or_else(|| {
            E2eError::ContainerRuntime(format!(
                "could not parse published port for {}: '{}'",
                name, output
            ))
        })
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> E2eResult<String> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend(cmd.iter().cloned());
        self.run(&args).await
    }

    async fn list_containers(&self, label: &str) -> E2eResult<Vec<String>> {
        let args = [
            "ps".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            format!("label={}", label),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        self.run(&args).await.map(lines)
    }

    async fn list_networks(&self, label: &str) -> E2eResult<Vec<String>> {
        let args = [
            "network".to_string(),
            "ls".to_string(),
            "--filter".to_string(),
            format!("label={}", label),
            "--format".to_string(),
            "{{.Name}}".to_string(),
        ];
        self.run(&args).await.map(lines)
    }

    fn remove_container_blocking(&self, name: &str) {
        self.run_blocking(&["rm", "--force", name]);
    }

    fn remove_network_blocking(&self, name: &str) {
        self.run_blocking(&["network", "rm", name]);
    }
}

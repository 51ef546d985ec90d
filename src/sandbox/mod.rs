//! Remote sandboxes for isolated repository search.
//!
//! A sandbox is an ephemeral execution environment with its own filesystem
//! and shell. This module defines the adapter every backend implements, the
//! retrying command executor built on top of it, and the lifecycle manager
//! that bootstraps a sandbox into a searchable clone of the target repo.

mod docker;
mod error;
pub(crate) mod lifecycle;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod retry;

pub(crate) use docker::DockerSandboxClient;
pub use error::SandboxError;
pub(crate) use lifecycle::SandboxLifecycle;
pub(crate) use retry::CommandExecutor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::SandboxConfig;

/// Label attached to every sandbox this tool creates.
pub(crate) const MANAGED_LABEL: &str = "swe-grep.managed";

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SandboxRequest {
    /// Image the sandbox boots from.
    pub image: String,
    /// Working directory commands run in.
    pub workdir: String,
    /// Memory limit (e.g., "4g").
    pub memory: String,
    /// CPU limit (e.g., "2").
    pub cpus: String,
}

impl SandboxRequest {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            image: config.image.clone(),
            workdir: config.workdir.clone(),
            memory: config.memory.clone(),
            cpus: config.cpus.clone(),
        }
    }
}

/// A sandbox returned by the service after creation.
#[derive(Debug, Clone)]
pub(crate) struct SandboxHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Captured output of a command run inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code when the backend reports one. Informational only.
    pub exit_code: Option<i64>,
}

impl CommandOutput {
    /// Output with only stdout populated.
    #[cfg(test)]
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }
}

/// Adapter to a remote sandbox service.
///
/// Exposes exactly the operations the rollout core needs. Timeouts on
/// individual calls are the implementation's responsibility.
#[async_trait]
pub(crate) trait SandboxClient: Send + Sync {
    /// Requests a new sandbox. The sandbox may not be usable until
    /// [`SandboxClient::wait_for_creation`] returns.
    async fn create(&self, request: &SandboxRequest) -> Result<SandboxHandle, SandboxError>;

    /// Suspends until the sandbox is ready or has failed to start.
    async fn wait_for_creation(&self, id: &str) -> Result<(), SandboxError>;

    /// Runs a shell command. A non-zero exit status is not an error; only
    /// transport or provider failures are.
    async fn execute_command(&self, id: &str, command: &str)
        -> Result<CommandOutput, SandboxError>;

    /// Destroys the sandbox.
    async fn delete(&self, id: &str) -> Result<(), SandboxError>;
}

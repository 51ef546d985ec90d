//! CLI command implementations.
//!
//! Each submodule keeps its core logic pure and does IO at the top level.

pub mod clean;
pub mod init;
pub mod run;
pub mod tool;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::metrics::SandboxMetrics;
use crate::observer::Recorder;
use crate::sandbox::lifecycle::SetupSettings;
use crate::sandbox::{CommandExecutor, DockerSandboxClient, SandboxLifecycle, SandboxRequest};
use crate::tools::ToolDispatcher;

/// The sandbox stack shared by commands that run tools.
pub(crate) struct SandboxStack {
    pub metrics: Arc<SandboxMetrics>,
    pub lifecycle: SandboxLifecycle,
    pub tools: ToolDispatcher,
}

impl SandboxStack {
    /// Connects to Docker and wires the executor, lifecycle and tools.
    pub async fn connect(
        config: &Config,
        run_id: &str,
        recorder: Option<Arc<Recorder>>,
    ) -> Result<Self> {
        let client = DockerSandboxClient::connect(Duration::from_secs(
            config.sandbox.creation_timeout_secs,
        ))
        .await
        .context("Failed to connect to the sandbox backend")?;

        let metrics = Arc::new(SandboxMetrics::new());
        let executor = CommandExecutor::new(Arc::new(client), Arc::clone(&metrics))
            .with_recorder(recorder.clone())
            .with_base_delay(Duration::from_millis(config.sandbox.retry_base_delay_ms));

        let lifecycle = SandboxLifecycle::new(
            executor.clone(),
            SetupSettings::from_config(config),
            SandboxRequest::from_config(&config.sandbox),
        )
        .with_recorder(run_id, recorder.clone());

        let tools = ToolDispatcher::new(
            executor,
            config.tools.max_retries,
            &config.sandbox.clone_dir(),
        )
        .with_recorder(recorder);

        Ok(Self {
            metrics,
            lifecycle,
            tools,
        })
    }
}

//! Sandbox setup state machine.
//!
//! A rollout needs one sandbox holding a verified clone of the target
//! repository. Setup runs as whole attempts: any failure after creation
//! throws the sandbox away and starts over on a fresh one, up to
//! `max_setup_retries` attempts.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CommandExecutor, SandboxRequest};
use crate::config::Config;
use crate::metrics::MetricEvent;
use crate::observer::Recorder;

/// Installs the search tooling every tool command relies on.
pub(crate) const INSTALL_COMMAND: &str = "apt-get update && apt-get install -y git ripgrep";

/// Where a sandbox is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetupPhase {
    Creating,
    AwaitingReady,
    Installing,
    Cloning,
    Verifying,
    Ready,
    Failed,
    TornDown,
}

/// A sandbox owned by one rollout.
#[derive(Debug, Clone)]
pub(crate) struct Sandbox {
    pub id: String,
    pub phase: SetupPhase,
    pub created_at: DateTime<Utc>,
}

impl Sandbox {
    fn enter(&mut self, phase: SetupPhase) {
        debug!(sandbox_id = %self.id, from = ?self.phase, to = ?phase, "setup phase");
        self.phase = phase;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SetupError {
    #[error("Sandbox setup failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Retry budgets and bootstrap targets.
#[derive(Debug, Clone)]
pub(crate) struct SetupSettings {
    pub max_setup_retries: u32,
    pub exec_max_retries: u32,
    pub clone_max_retries: u32,
    pub repo_url: String,
    /// Directory `ls` verifies after cloning.
    pub clone_dir: String,
    /// Pass `clone_dir` to `git clone` instead of letting git derive it.
    pub explicit_clone_dir: bool,
    pub log_every: u64,
}

impl SetupSettings {
    pub fn from_config(config: &Config) -> Self {
        let sandbox = &config.sandbox;
        Self {
            max_setup_retries: sandbox.max_setup_retries,
            exec_max_retries: sandbox.exec_max_retries,
            clone_max_retries: sandbox.clone_max_retries,
            repo_url: sandbox.repo_url.clone(),
            clone_dir: sandbox.clone_dir(),
            explicit_clone_dir: sandbox.clone_dir.as_deref().is_some_and(|d| !d.is_empty()),
            log_every: config.metrics.log_every,
        }
    }

    pub fn clone_command(&self) -> String {
        let mut command = format!("git clone --depth 1 {}", shell_words::quote(&self.repo_url));
        if self.explicit_clone_dir {
            command.push(' ');
            command.push_str(&shell_words::quote(&self.clone_dir));
        }
        command
    }

    pub fn verify_command(&self) -> String {
        format!("ls {}", shell_words::quote(&self.clone_dir))
    }
}

/// Creates, bootstraps and destroys sandboxes.
pub(crate) struct SandboxLifecycle {
    executor: CommandExecutor,
    settings: SetupSettings,
    request: SandboxRequest,
    recorder: Option<Arc<Recorder>>,
    run_id: String,
}

impl SandboxLifecycle {
    pub fn new(executor: CommandExecutor, settings: SetupSettings, request: SandboxRequest) -> Self {
        Self {
            executor,
            settings,
            request,
            recorder: None,
            run_id: String::new(),
        }
    }

    /// Reports ready sandboxes to `recorder` under `run_id`.
    #[must_use]
    pub fn with_recorder(mut self, run_id: &str, recorder: Option<Arc<Recorder>>) -> Self {
        self.run_id = run_id.to_string();
        self.recorder = recorder;
        self
    }

    /// Sets up a ready sandbox for `rollout_id`.
    ///
    /// `slot` is updated every time a sandbox is created, so it always names
    /// the most recent one even when setup ultimately fails.
    pub async fn provision(
        &self,
        rollout_id: &str,
        slot: &mut Option<String>,
    ) -> Result<Sandbox, SetupError> {
        let metrics = self.executor.metrics();
        let max_attempts = self.settings.max_setup_retries;
        let mut live: Option<String> = None;
        let mut last_error = String::from("no setup attempts were made");

        for attempt in 0..max_attempts {
            if attempt > 0 {
                metrics.record(MetricEvent::SetupRetry);
                info!(rollout_id, attempt, "Retrying sandbox setup on a fresh sandbox");
                if let Some(id) = live.take() {
                    self.delete_quietly(&id).await;
                }
            }

            let handle = match self.executor.client().create(&self.request).await {
                Ok(handle) => handle,
                Err(e) => {
                    metrics.record(MetricEvent::CreationFailed);
                    warn!(rollout_id, attempt, "Sandbox creation failed: {}", e);
                    last_error = e.to_string();
                    continue;
                }
            };

            *slot = Some(handle.id.clone());
            live = Some(handle.id.clone());
            let mut sandbox = Sandbox {
                id: handle.id,
                phase: SetupPhase::Creating,
                created_at: handle.created_at,
            };

            match self.bootstrap(&mut sandbox).await {
                Ok(()) => {
                    metrics.record(MetricEvent::SetupSuccess);
                    metrics.maybe_log(self.settings.log_every);
                    info!(rollout_id, sandbox_id = %sandbox.id, attempt, "Sandbox ready");
                    if let Some(recorder) = &self.recorder {
                        recorder.attach(&self.run_id, rollout_id, &sandbox.id);
                    }
                    return Ok(sandbox);
                }
                Err(e) => {
                    sandbox.enter(SetupPhase::Failed);
                    warn!(rollout_id, sandbox_id = %sandbox.id, attempt, "Sandbox setup attempt failed: {}", e);
                    last_error = e;
                }
            }
        }

        metrics.record(MetricEvent::SetupFailed);
        metrics.maybe_log(self.settings.log_every);
        if let Some(id) = live {
            self.delete_quietly(&id).await;
        }

        Err(SetupError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Destroys a sandbox at rollout end. Failures are logged, not returned.
    pub async fn teardown(&self, sandbox: &mut Sandbox) {
        if sandbox.phase == SetupPhase::TornDown {
            return;
        }
        if let Some(recorder) = &self.recorder {
            recorder.detach(&sandbox.id);
        }
        self.delete_quietly(&sandbox.id).await;
        sandbox.enter(SetupPhase::TornDown);
        let lifetime = Utc::now() - sandbox.created_at;
        info!(sandbox_id = %sandbox.id, lifetime_secs = lifetime.num_seconds(), "Sandbox torn down");
    }

    async fn bootstrap(&self, sandbox: &mut Sandbox) -> Result<(), String> {
        let metrics = self.executor.metrics();
        let settings = &self.settings;

        sandbox.enter(SetupPhase::AwaitingReady);
        if let Err(e) = self.executor.client().wait_for_creation(&sandbox.id).await {
            metrics.record(MetricEvent::CreationFailed);
            return Err(e.to_string());
        }
        metrics.record(MetricEvent::CreationSuccess);

        sandbox.enter(SetupPhase::Installing);
        let install = self
            .executor
            .run(&sandbox.id, INSTALL_COMMAND, "apt_install", settings.exec_max_retries)
            .await;
        if !install.success {
            return Err(format!("Tool install failed: {}", install.output));
        }

        sandbox.enter(SetupPhase::Cloning);
        let clone = self
            .executor
            .run(
                &sandbox.id,
                &settings.clone_command(),
                "git_clone",
                settings.clone_max_retries,
            )
            .await;
        if !clone.success {
            metrics.record(MetricEvent::CloneFailed);
            return Err(format!("Clone failed: {}", clone.output));
        }

        sandbox.enter(SetupPhase::Verifying);
        let verify = self
            .executor
            .run(
                &sandbox.id,
                &settings.verify_command(),
                "verify_clone",
                settings.exec_max_retries,
            )
            .await;
        if !verify.success {
            return Err(format!("Clone verification failed: {}", verify.output));
        }
        if verify.output.trim().is_empty() {
            return Err(format!(
                "Clone verification failed: {} is empty or missing",
                settings.clone_dir
            ));
        }

        sandbox.enter(SetupPhase::Ready);
        Ok(())
    }

    async fn delete_quietly(&self, sandbox_id: &str) {
        match self.executor.client().delete(sandbox_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(sandbox_id, "Sandbox already gone"),
            Err(e) => warn!(sandbox_id, "Failed to delete sandbox: {}", e),
        }
    }
}

//! Bounded-retry execution of a single sandbox command.
//!
//! The executor knows nothing about what a command means. It runs it,
//! classifies failures by the status code visible in the error text, counts
//! them, and backs off exponentially between attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::{CommandOutput, SandboxClient};
use crate::metrics::{MetricEvent, SandboxMetrics};
use crate::observer::{CommandRecord, Recorder};

/// Longest error excerpt written to logs and tool output.
pub(crate) const ERROR_EXCERPT_CHARS: usize = 100;

/// Coarse class of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// 502-class gateway error, usually transient.
    Gateway,
    /// 409-class conflict.
    Conflict,
    /// Anything else.
    Other,
}

impl ErrorClass {
    /// Classifies an error by the status code in its text.
    pub fn classify(error_text: &str) -> Self {
        if error_text.contains("502") {
            Self::Gateway
        } else if error_text.contains("409") {
            Self::Conflict
        } else {
            Self::Other
        }
    }

    fn metric(self) -> MetricEvent {
        match self {
            Self::Gateway => MetricEvent::Exec502,
            Self::Conflict => MetricEvent::Exec409,
            Self::Other => MetricEvent::ExecOther,
        }
    }
}

/// Result of running a command with retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecOutcome {
    pub success: bool,
    /// Stdout on success, the last error text on failure.
    pub output: String,
    /// Stderr of the successful attempt. Empty on failure.
    pub stderr: String,
}

impl ExecOutcome {
    fn succeeded(output: CommandOutput) -> Self {
        Self {
            success: true,
            output: output.stdout,
            stderr: output.stderr,
        }
    }

    fn failed(error_text: String) -> Self {
        Self {
            success: false,
            output: error_text,
            stderr: String::new(),
        }
    }
}

/// Runs sandbox commands with at most `max_retries + 1` attempts.
#[derive(Clone)]
pub(crate) struct CommandExecutor {
    client: Arc<dyn SandboxClient>,
    metrics: Arc<SandboxMetrics>,
    recorder: Option<Arc<Recorder>>,
    base_delay: Duration,
}

impl CommandExecutor {
    pub fn new(client: Arc<dyn SandboxClient>, metrics: Arc<SandboxMetrics>) -> Self {
        Self {
            client,
            metrics,
            recorder: None,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Reports every executed command to `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<Arc<Recorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Sets the delay before the first retry. Later retries double it.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn client(&self) -> &Arc<dyn SandboxClient> {
        &self.client
    }

    pub fn metrics(&self) -> &Arc<SandboxMetrics> {
        &self.metrics
    }

    /// Runs `command` in `sandbox_id`, retrying failed attempts.
    ///
    /// `operation` labels log lines. Attempt `n` (0-indexed) that fails is
    /// followed by a `base_delay * 2^n` pause when retries remain.
    pub async fn run(
        &self,
        sandbox_id: &str,
        command: &str,
        operation: &str,
        max_retries: u32,
    ) -> ExecOutcome {
        let mut last_error = String::from("Max retries exceeded");

        for attempt in 0..=max_retries {
            let started = Instant::now();
            let result = self.client.execute_command(sandbox_id, command).await;
            let duration = started.elapsed();

            match result {
                Ok(output) => {
                    self.observe(
                        sandbox_id,
                        command,
                        &output.stdout,
                        &output.stderr,
                        duration,
                        None,
                    );
                    return ExecOutcome::succeeded(output);
                }
                Err(e) => {
                    let error_text = e.to_string();
                    self.observe(sandbox_id, command, "", "", duration, Some(&error_text));

                    let class = ErrorClass::classify(&error_text);
                    self.metrics.record(class.metric());
                    let snippet = excerpt(&error_text, ERROR_EXCERPT_CHARS);
                    match class {
                        ErrorClass::Gateway => {
                            error!(operation, sandbox_id, "502 ERROR: {}", snippet);
                        }
                        ErrorClass::Conflict => {
                            error!(operation, sandbox_id, "409 ERROR: {}", snippet);
                        }
                        ErrorClass::Other => error!(operation, sandbox_id, "{}", snippet),
                    }

                    if attempt < max_retries {
                        self.metrics.record(MetricEvent::ExecRetry);
                        let delay = backoff_delay(self.base_delay, attempt);
                        debug!(operation, attempt, ?delay, "retrying sandbox command");
                        tokio::time::sleep(delay).await;
                    }
                    last_error = error_text;
                }
            }
        }

        ExecOutcome::failed(last_error)
    }

    fn observe(
        &self,
        sandbox_id: &str,
        command: &str,
        stdout: &str,
        stderr: &str,
        duration: Duration,
        error: Option<&str>,
    ) {
        if let Some(recorder) = &self.recorder {
            recorder.command(
                sandbox_id,
                &CommandRecord {
                    command,
                    stdout,
                    stderr,
                    duration,
                    error,
                },
            );
        }
    }
}

/// `base * 2^attempt`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
}

/// First `max_chars` characters of `text`.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

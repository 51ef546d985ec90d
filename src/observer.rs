//! Optional observation of rollout activity.
//!
//! Components receive an `Option<Arc<Recorder>>` at construction. When
//! present, the recorder forwards tool calls, commands and responses to an
//! [`Observer`]. Observers only produce side effects; they never change what
//! a tool returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// One command executed inside a sandbox.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandRecord<'a> {
    pub command: &'a str,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub duration: Duration,
    pub error: Option<&'a str>,
}

/// Receiver of rollout events.
pub(crate) trait Observer: Send + Sync {
    /// A rollout finished setup and now owns `sandbox_id`.
    fn on_context(&self, run_id: &str, rollout_id: &str, sandbox_id: &str);

    /// The agent invoked `tool_name` during `turn`.
    fn on_turn(&self, sandbox_id: &str, turn: usize, tool_name: &str, args: &serde_json::Value);

    /// A command ran in the sandbox.
    fn on_command(&self, sandbox_id: &str, record: &CommandRecord<'_>);

    /// A tool produced `tool_output` for the agent.
    fn on_response(&self, sandbox_id: &str, tool_output: &str);

    /// The sandbox is being destroyed after `command_count` observed commands.
    fn on_teardown(&self, sandbox_id: &str, command_count: u64);
}

/// Routes events for attached sandboxes to an [`Observer`].
///
/// Only sandboxes that completed setup are attached, so bootstrap commands
/// are not reported. Each entry is owned by exactly one rollout; the mutex
/// only guards the map itself.
pub(crate) struct Recorder {
    observer: Arc<dyn Observer>,
    command_counts: Mutex<HashMap<String, u64>>,
}

impl Recorder {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer,
            command_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn attach(&self, run_id: &str, rollout_id: &str, sandbox_id: &str) {
        self.counts().insert(sandbox_id.to_string(), 0);
        self.observer.on_context(run_id, rollout_id, sandbox_id);
    }

    pub fn turn(&self, sandbox_id: &str, turn: usize, tool_name: &str, args: &serde_json::Value) {
        if self.is_attached(sandbox_id) {
            self.observer.on_turn(sandbox_id, turn, tool_name, args);
        }
    }

    pub fn command(&self, sandbox_id: &str, record: &CommandRecord<'_>) {
        let attached = match self.counts().get_mut(sandbox_id) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        };
        if attached {
            self.observer.on_command(sandbox_id, record);
        }
    }

    pub fn response(&self, sandbox_id: &str, tool_output: &str) {
        if self.is_attached(sandbox_id) {
            self.observer.on_response(sandbox_id, tool_output);
        }
    }

    /// Forgets the sandbox and reports its command count.
    pub fn detach(&self, sandbox_id: &str) {
        let count = self.counts().remove(sandbox_id);
        if let Some(count) = count {
            self.observer.on_teardown(sandbox_id, count);
        }
    }

    fn is_attached(&self, sandbox_id: &str) -> bool {
        self.counts().contains_key(sandbox_id)
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.command_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer that emits every event as a `tracing` debug record.
#[derive(Debug, Default)]
pub(crate) struct TracingObserver;

impl Observer for TracingObserver {
    fn on_context(&self, run_id: &str, rollout_id: &str, sandbox_id: &str) {
        debug!(event = "rollout_context", run_id, rollout_id, sandbox_id);
    }

    fn on_turn(&self, sandbox_id: &str, turn: usize, tool_name: &str, args: &serde_json::Value) {
        debug!(event = "tool_call", sandbox_id, turn, tool_name, args = %args);
    }

    fn on_command(&self, sandbox_id: &str, record: &CommandRecord<'_>) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = record.duration.as_millis() as u64;
        debug!(
            event = "command",
            sandbox_id,
            command = record.command,
            stdout_bytes = record.stdout.len(),
            stderr_bytes = record.stderr.len(),
            duration_ms,
            error = record.error,
        );
    }

    fn on_response(&self, sandbox_id: &str, tool_output: &str) {
        debug!(
            event = "tool_response",
            sandbox_id,
            lines = tool_output.lines().count()
        );
    }

    fn on_teardown(&self, sandbox_id: &str, command_count: u64) {
        debug!(event = "teardown", sandbox_id, command_count);
    }
}

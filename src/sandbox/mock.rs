//! Scripted sandbox client for testing.
//!
//! Returns configurable results per command prefix and records every call
//! for test assertions, without touching a real sandbox service.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{CommandOutput, SandboxClient, SandboxError, SandboxHandle, SandboxRequest};

/// A single scripted command result.
#[derive(Debug, Clone)]
pub(crate) enum MockExec {
    /// Return the given output.
    Output(CommandOutput),
    /// Fail with an API error carrying `status`.
    Api(u16, String),
    /// Fail with a transport error.
    Unavailable(String),
}

impl MockExec {
    pub fn stdout(stdout: &str) -> Self {
        Self::Output(CommandOutput::stdout(stdout))
    }

    pub fn stderr(stderr: &str) -> Self {
        Self::Output(CommandOutput {
            stderr: stderr.to_string(),
            ..Default::default()
        })
    }

    pub fn api(status: u16, message: &str) -> Self {
        Self::Api(status, message.to_string())
    }

    fn resolve(&self) -> Result<CommandOutput, SandboxError> {
        match self {
            Self::Output(output) => Ok(output.clone()),
            Self::Api(status, message) => Err(SandboxError::api(*status, message.clone())),
            Self::Unavailable(message) => Err(SandboxError::unavailable(message.clone())),
        }
    }
}

/// A sandbox client whose behavior is scripted by the test.
#[derive(Debug, Default)]
pub(crate) struct MockSandboxClient {
    create_failures: Mutex<VecDeque<SandboxError>>,
    wait_failures: Mutex<VecDeque<SandboxError>>,
    /// Command prefix and the results to return in order. The last result
    /// repeats once the queue is down to one entry.
    rules: Mutex<Vec<(String, VecDeque<MockExec>)>>,
    commands: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    delete_fails: AtomicBool,
    next_id: AtomicUsize,
}

impl MockSandboxClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose bootstrap commands all succeed.
    pub fn ready() -> Self {
        let client = Self::new();
        client.on_command("ls vscode", vec![MockExec::stdout("README.md\nsrc\n")]);
        client
    }

    /// Fail the next `create` call with `err`.
    pub fn fail_next_create(&self, err: SandboxError) {
        self.create_failures.lock().unwrap().push_back(err);
    }

    /// Fail the next `wait_for_creation` call with `err`.
    pub fn fail_next_wait(&self, err: SandboxError) {
        self.wait_failures.lock().unwrap().push_back(err);
    }

    /// Make every `delete` call fail.
    pub fn fail_deletes(&self) {
        self.delete_fails.store(true, Ordering::SeqCst);
    }

    /// Script the results for commands starting with `prefix`.
    ///
    /// Later rules take precedence over earlier ones for the same command.
    pub fn on_command(&self, prefix: &str, results: Vec<MockExec>) {
        self.rules
            .lock()
            .unwrap()
            .insert(0, (prefix.to_string(), results.into()));
    }

    /// Every executed command as `(sandbox_id, command)`.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }

    /// Number of executed commands starting with `prefix`.
    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, command)| command.starts_with(prefix))
            .count()
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxClient for MockSandboxClient {
    async fn create(&self, _request: &SandboxRequest) -> Result<SandboxHandle, SandboxError> {
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let id = format!("sbx-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created.lock().unwrap().push(id.clone());
        Ok(SandboxHandle {
            id,
            created_at: Utc::now(),
        })
    }

    async fn wait_for_creation(&self, _id: &str) -> Result<(), SandboxError> {
        match self.wait_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn execute_command(
        &self,
        id: &str,
        command: &str,
    ) -> Result<CommandOutput, SandboxError> {
        self.commands
            .lock()
            .unwrap()
            .push((id.to_string(), command.to_string()));

        let mut rules = self.rules.lock().unwrap();
        let Some((_, results)) = rules
            .iter_mut()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        else {
            return Ok(CommandOutput::default());
        };

        let result = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };

        result.map_or_else(|| Ok(CommandOutput::default()), |r| r.resolve())
    }

    async fn delete(&self, id: &str) -> Result<(), SandboxError> {
        self.deleted.lock().unwrap().push(id.to_string());
        if self.delete_fails.load(Ordering::SeqCst) {
            return Err(SandboxError::api(500, "delete failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SandboxRequest {
        SandboxRequest {
            image: "ubuntu:22.04".to_string(),
            workdir: "/root".to_string(),
            memory: "1g".to_string(),
            cpus: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_assigns_sequential_ids() {
        let client = MockSandboxClient::new();
        let a = client.create(&request()).await.unwrap();
        let b = client.create(&request()).await.unwrap();
        assert_eq!(a.id, "sbx-1");
        assert_eq!(b.id, "sbx-2");
        assert_eq!(client.created(), vec!["sbx-1", "sbx-2"]);
    }

    #[tokio::test]
    async fn test_mock_scripted_results_repeat_last() {
        let client = MockSandboxClient::new();
        client.on_command(
            "echo",
            vec![MockExec::api(502, "bad gateway"), MockExec::stdout("hi")],
        );

        assert!(client.execute_command("sbx", "echo hi").await.is_err());
        let second = client.execute_command("sbx", "echo hi").await.unwrap();
        let third = client.execute_command("sbx", "echo hi").await.unwrap();
        assert_eq!(second.stdout, "hi");
        assert_eq!(third.stdout, "hi");
        assert_eq!(client.count_commands("echo"), 3);
    }

    #[tokio::test]
    async fn test_mock_unscripted_command_is_empty() {
        let client = MockSandboxClient::new();
        let output = client.execute_command("sbx", "true").await.unwrap();
        assert_eq!(output, CommandOutput::default());
    }
}

//! The agent loop and group scoring.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::{Question, RolloutState, ToolInvocation, Turn};
use crate::config::{RewardConfig, RolloutConfig};
use crate::llm::{ChatMessage, ChatModel, ModelError, ToolDefinition};
use crate::reward::{judge_correctness, score_group, Judge, RewardBreakdown};
use crate::sandbox::SandboxLifecycle;
use crate::tools::schema::tool_definitions;
use crate::tools::ToolDispatcher;

/// Serializable outcome of one rollout.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RolloutReport {
    pub trajectory_id: String,
    pub question: String,
    pub answer: String,
    pub sandbox_id: Option<String>,
    pub turns: usize,
    pub tool_calls: usize,
    pub completion: String,
    pub is_correct: bool,
    pub rewards: RewardBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
}

impl RolloutReport {
    fn new(state: RolloutState, rewards: RewardBreakdown) -> Self {
        Self {
            turns: state.trajectory.len(),
            tool_calls: state.tool_call_count(),
            trajectory_id: state.trajectory_id,
            question: state.question,
            answer: state.answer,
            sandbox_id: state.sandbox_id,
            completion: state.completion,
            is_correct: state.is_correct,
            rewards,
            setup_error: state.setup_error,
            model_error: state.model_error,
        }
    }
}

/// Runs rollouts: setup, agent turns, teardown, judging.
pub(crate) struct RolloutDriver {
    model: Arc<dyn ChatModel>,
    judge: Arc<dyn Judge>,
    lifecycle: SandboxLifecycle,
    tools: ToolDispatcher,
    tool_definitions: Vec<ToolDefinition>,
    limit: Semaphore,
    max_turns: usize,
    system_prompt: String,
    weights: RewardConfig,
}

impl RolloutDriver {
    pub fn new(
        model: Arc<dyn ChatModel>,
        judge: Arc<dyn Judge>,
        lifecycle: SandboxLifecycle,
        tools: ToolDispatcher,
        config: &RolloutConfig,
        weights: RewardConfig,
    ) -> Self {
        Self {
            model,
            judge,
            lifecycle,
            tools,
            tool_definitions: tool_definitions(),
            limit: Semaphore::new(config.max_concurrent.max(1)),
            max_turns: config.max_turns,
            system_prompt: config.system_prompt.clone(),
            weights,
        }
    }

    /// Runs `group_size` rollouts for every question and scores each group.
    pub async fn run_all(&self, questions: &[Question], group_size: usize) -> Vec<RolloutReport> {
        let groups = join_all(
            questions
                .iter()
                .map(|question| self.run_group(question, group_size)),
        )
        .await;
        groups.into_iter().flatten().collect()
    }

    /// Runs `group_size` rollouts of one question, then applies group scoring.
    pub async fn run_group(&self, question: &Question, group_size: usize) -> Vec<RolloutReport> {
        let states = join_all((0..group_size).map(|_| self.run_rollout(question))).await;
        let rewards = score_group(&states, &self.weights);

        states
            .into_iter()
            .zip(rewards)
            .map(|(state, rewards)| RolloutReport::new(state, rewards))
            .collect()
    }

    /// Runs one rollout to completion. Never fails; failures are recorded
    /// in the returned state.
    pub async fn run_rollout(&self, question: &Question) -> RolloutState {
        let mut state = RolloutState::new(&question.question, &question.answer);
        // The semaphore is never closed.
        let permit = self.limit.acquire().await.ok();

        let mut sandbox = match self
            .lifecycle
            .provision(&state.trajectory_id, &mut state.sandbox_id)
            .await
        {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!(trajectory_id = %state.trajectory_id, "{}", e);
                state.setup_error = Some(e.to_string());
                return state;
            }
        };

        if let Err(e) = self.agent_loop(&mut state).await {
            warn!(trajectory_id = %state.trajectory_id, "Model call failed: {}", e);
            state.model_error = Some(e.to_string());
        }

        self.lifecycle.teardown(&mut sandbox).await;
        drop(permit);

        judge_correctness(self.judge.as_ref(), &mut state).await;
        info!(
            trajectory_id = %state.trajectory_id,
            turns = state.trajectory.len(),
            tool_calls = state.tool_call_count(),
            correct = state.is_correct,
            "Rollout finished"
        );
        state
    }

    async fn agent_loop(&self, state: &mut RolloutState) -> Result<(), ModelError> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(state.question.clone()),
        ];

        for turn in 0..self.max_turns {
            let reply = self
                .model
                .complete(&messages, &self.tool_definitions)
                .await?;
            state.completion = reply.content_str().to_string();
            debug!(
                trajectory_id = %state.trajectory_id,
                turn,
                tool_calls = reply.tool_calls.len(),
                "Model replied"
            );

            if reply.tool_calls.is_empty() {
                state.trajectory.push(Turn {
                    content: state.completion.clone(),
                    invocations: Vec::new(),
                });
                messages.push(reply);
                return Ok(());
            }

            // Calls within a turn run concurrently; results keep call order.
            let shared: &RolloutState = state;
            let outputs = join_all(reply.tool_calls.iter().map(|call| {
                self.tools
                    .dispatch(shared, &call.function.name, &call.function.arguments)
            }))
            .await;

            let invocations: Vec<ToolInvocation> = reply
                .tool_calls
                .iter()
                .zip(outputs)
                .map(|(call, output)| ToolInvocation {
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    output,
                })
                .collect();

            messages.push(reply);
            for invocation in &invocations {
                messages.push(ChatMessage::tool(
                    invocation.call_id.clone(),
                    invocation.output.clone(),
                ));
            }
            state.trajectory.push(Turn {
                content: state.completion.clone(),
                invocations,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::mock::{tool_calls, MockChatModel};
    use crate::llm::Role;
    use crate::metrics::SandboxMetrics;
    use crate::reward::judge::testing::ContainsJudge;
    use crate::sandbox::lifecycle::SetupSettings;
    use crate::sandbox::mock::{MockExec, MockSandboxClient};
    use crate::sandbox::{CommandExecutor, SandboxError, SandboxRequest};
    use std::time::Duration;

    fn driver(client: &Arc<MockSandboxClient>, model: &Arc<MockChatModel>) -> RolloutDriver {
        let config = Config::default();
        let executor = CommandExecutor::new(client.clone(), Arc::new(SandboxMetrics::new()))
            .with_base_delay(Duration::ZERO);
        let lifecycle = SandboxLifecycle::new(
            executor.clone(),
            SetupSettings::from_config(&config),
            SandboxRequest::from_config(&config.sandbox),
        );
        let tools = ToolDispatcher::new(executor, 0, "vscode");
        RolloutDriver::new(
            model.clone(),
            Arc::new(ContainsJudge),
            lifecycle,
            tools,
            &config.rollout,
            config.reward,
        )
    }

    fn question(answer: &str) -> Question {
        Question {
            question: "Where is the command registry?".to_string(),
            answer: answer.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rollout_runs_tools_then_answers() {
        let client = Arc::new(MockSandboxClient::ready());
        client.on_command("rg", vec![MockExec::stdout("vscode/registry.ts:1:class Registry\n")]);
        client.on_command("ls -la", vec![MockExec::stdout("registry.ts\n")]);
        let model = Arc::new(
            MockChatModel::new("unused")
                .then(tool_calls(&[
                    ("grep_tool", r#"{"pattern": "Registry"}"#),
                    ("list_files", r#"{"path": "vscode"}"#),
                ]))
                .then(ChatMessage::assistant("It is in registry.ts")),
        );
        let driver = driver(&client, &model);

        let state = driver.run_rollout(&question("registry.ts")).await;

        assert_eq!(state.trajectory.len(), 2);
        assert_eq!(state.trajectory[0].tool_call_count(), 2);
        assert_eq!(state.trajectory[0].invocations[0].output, "vscode/registry.ts:1:class Registry");
        assert_eq!(state.trajectory[0].invocations[1].output, "registry.ts");
        assert_eq!(state.completion, "It is in registry.ts");
        assert!(state.is_correct);
        assert_eq!(state.sandbox_id.as_deref(), Some("sbx-1"));
        assert_eq!(client.deleted(), vec!["sbx-1"]);

        let second = &model.requests()[1];
        let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_rollout_stops_at_max_turns() {
        let client = Arc::new(MockSandboxClient::ready());
        let mut model = MockChatModel::new("unused");
        for _ in 0..10 {
            model = model.then(tool_calls(&[("list_files", r#"{"path": "."}"#)]));
        }
        let model = Arc::new(model);
        let driver = driver(&client, &model);

        let state = driver.run_rollout(&question("x")).await;

        assert_eq!(state.trajectory.len(), 5);
        assert_eq!(model.invocation_count(), 5);
        assert!(!state.is_correct);
    }

    #[tokio::test]
    async fn test_setup_exhaustion_skips_agent() {
        let client = Arc::new(MockSandboxClient::ready());
        for _ in 0..3 {
            client.fail_next_wait(SandboxError::unhealthy("exited"));
        }
        let model = Arc::new(MockChatModel::new("answer"));
        let driver = driver(&client, &model);

        let reports = driver.run_group(&question("answer"), 1).await;

        assert_eq!(model.invocation_count(), 0);
        let report = &reports[0];
        assert!(report.setup_error.as_deref().unwrap().contains("after 3 attempts"));
        assert!(!report.is_correct);
        assert!(report.rewards.total.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_model_error_is_recorded_and_sandbox_torn_down() {
        let client = Arc::new(MockSandboxClient::ready());
        let model = Arc::new(MockChatModel::new("unused").then_fail("connection reset"));
        let driver = driver(&client, &model);

        let state = driver.run_rollout(&question("x")).await;

        assert!(state.model_error.as_deref().unwrap().contains("connection reset"));
        assert!(state.trajectory.is_empty());
        assert_eq!(client.deleted(), vec!["sbx-1"]);
    }

    #[tokio::test]
    async fn test_group_scoring() {
        let client = Arc::new(MockSandboxClient::ready());
        let model = Arc::new(MockChatModel::new("The answer is foo.ts"));
        let driver = driver(&client, &model);

        let reports = driver
            .run_all(&[question("foo.ts"), question("bar.ts")], 2)
            .await;

        assert_eq!(reports.len(), 4);
        for report in &reports[..2] {
            assert!(report.is_correct);
            assert!((report.rewards.total - 2.0).abs() < f64::EPSILON);
        }
        for report in &reports[2..] {
            assert!(!report.is_correct);
            assert!(report.rewards.total.abs() < f64::EPSILON);
        }
        assert_eq!(client.created().len(), 4);
        assert_eq!(client.deleted().len(), 4);
    }

    #[test]
    fn test_report_serializes_without_empty_errors() {
        let state = RolloutState::new("q", "a");
        let rewards = RewardBreakdown {
            correct_answer: 0.0,
            parallel_tool_calls: 0.0,
            efficiency_bonus: 0.0,
            total: 0.0,
        };
        let json = serde_json::to_value(RolloutReport::new(state, rewards)).unwrap();

        assert!(json.get("setup_error").is_none());
        assert_eq!(json["turns"], 0);
        assert_eq!(json["rewards"]["total"], 0.0);
    }
}

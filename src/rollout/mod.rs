//! Rollouts: one agent answering one question inside one sandbox.

mod dataset;
mod driver;

pub(crate) use dataset::{load_questions, Question};
pub(crate) use driver::{RolloutDriver, RolloutReport};

use uuid::Uuid;

/// One tool call and the string it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    pub output: String,
}

/// One model response and the tool calls it made. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Turn {
    pub content: String,
    pub invocations: Vec<ToolInvocation>,
}

impl Turn {
    pub fn tool_call_count(&self) -> usize {
        self.invocations.len()
    }
}

/// Everything known about a rollout in progress.
#[derive(Debug, Clone)]
pub(crate) struct RolloutState {
    pub trajectory_id: String,
    pub question: String,
    pub answer: String,
    /// The most recently created sandbox, even if setup later failed.
    pub sandbox_id: Option<String>,
    pub trajectory: Vec<Turn>,
    /// Final assistant text.
    pub completion: String,
    pub is_correct: bool,
    /// Set when sandbox setup was exhausted. The rollout never ran.
    pub setup_error: Option<String>,
    /// Set when a model call failed mid-rollout.
    pub model_error: Option<String>,
}

impl RolloutState {
    pub fn new(question: &str, answer: &str) -> Self {
        Self {
            trajectory_id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            sandbox_id: None,
            trajectory: Vec::new(),
            completion: String::new(),
            is_correct: false,
            setup_error: None,
            model_error: None,
        }
    }

    pub fn tool_call_count(&self) -> usize {
        self.trajectory.iter().map(Turn::tool_call_count).sum()
    }
}

//! Correctness judging.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::is_affirmative;
use crate::llm::{ChatMessage, ChatModel, ModelError};
use crate::rollout::RolloutState;

pub(crate) const JUDGE_PROMPT: &str = "Given a ground truth answer and a response, determine if the answer is correct.

Question:
{question}

Ground truth answer:
{answer}

Response:
{response}

Respond either 'yes' or 'no' only.
";

/// Decides whether a completion answers the question.
#[async_trait]
pub(crate) trait Judge: Send + Sync {
    /// Returns the judge's free-text verdict.
    async fn judge(
        &self,
        question: &str,
        completion: &str,
        answer: &str,
        state: &RolloutState,
    ) -> Result<String, ModelError>;
}

/// Judge backed by a chat model and a fixed yes/no prompt.
pub(crate) struct LlmJudge {
    model: Arc<dyn ChatModel>,
}

impl LlmJudge {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

/// Fills the judge template in one pass. Placeholders are only looked up in
/// the template, never in the values substituted into it.
pub(crate) fn render_prompt(question: &str, answer: &str, response: &str) -> String {
    let fields = [
        ("{question}", question),
        ("{answer}", answer),
        ("{response}", response),
    ];

    let mut out = String::with_capacity(
        JUDGE_PROMPT.len() + question.len() + answer.len() + response.len(),
    );
    let mut rest = JUDGE_PROMPT;
    while let Some((at, placeholder, value)) = fields
        .iter()
        .filter_map(|&(placeholder, value)| rest.find(placeholder).map(|at| (at, placeholder, value)))
        .min_by_key(|&(at, _, _)| at)
    {
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(
        &self,
        question: &str,
        completion: &str,
        answer: &str,
        _state: &RolloutState,
    ) -> Result<String, ModelError> {
        let prompt = render_prompt(question, answer, completion);
        let reply = self
            .model
            .complete(&[ChatMessage::user(prompt)], &[])
            .await?;
        Ok(reply.content_str().to_string())
    }
}

/// Judges `state`, stores the verdict in `is_correct`, and returns the
/// correctness reward. A judge failure counts as incorrect.
pub(crate) async fn judge_correctness(judge: &dyn Judge, state: &mut RolloutState) -> f64 {
    let verdict = judge
        .judge(&state.question, &state.completion, &state.answer, state)
        .await;

    state.is_correct = match verdict {
        Ok(text) => is_affirmative(&text),
        Err(e) => {
            warn!(trajectory_id = %state.trajectory_id, "Judge failed: {}", e);
            false
        }
    };

    if state.is_correct {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Judge that says "yes" when the completion contains the answer.
    #[derive(Debug, Default)]
    pub(crate) struct ContainsJudge;

    #[async_trait]
    impl Judge for ContainsJudge {
        async fn judge(
            &self,
            _question: &str,
            completion: &str,
            answer: &str,
            _state: &RolloutState,
        ) -> Result<String, ModelError> {
            Ok(if completion.contains(answer) { "yes" } else { "no" }.to_string())
        }
    }
}

//! Rollout scoring.
//!
//! Correctness comes from a [`Judge`]. Parallelism is computed per rollout
//! from its trajectory. Efficiency needs the whole group and runs last.

pub(crate) mod judge;

pub(crate) use judge::{judge_correctness, Judge, LlmJudge};

use serde::Serialize;

use crate::config::RewardConfig;
use crate::rollout::{RolloutState, Turn};

/// Tool calls per turn that earn the full parallelism reward.
pub(crate) const MAX_PARALLEL_CALLS: f64 = 8.0;

/// Per-rollout inputs to the aggregate reward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RewardRecord {
    /// 1.0 when judged correct, else 0.0.
    pub correctness: f64,
    pub turn_count: usize,
    /// Parallelism reward in `[0, 1]`.
    pub tool_call_density: f64,
}

impl RewardRecord {
    pub fn from_state(state: &RolloutState) -> Self {
        Self {
            correctness: if state.is_correct { 1.0 } else { 0.0 },
            turn_count: state.trajectory.len(),
            tool_call_density: parallelism_reward(&state.trajectory),
        }
    }
}

/// Each reward component plus their weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct RewardBreakdown {
    pub correct_answer: f64,
    pub parallel_tool_calls: f64,
    pub efficiency_bonus: f64,
    pub total: f64,
}

impl RewardBreakdown {
    pub fn combine(weights: &RewardConfig, record: &RewardRecord, efficiency: f64) -> Self {
        let total = weights.correct_answer * record.correctness
            + weights.parallel_tool_calls * record.tool_call_density
            + weights.efficiency_bonus * efficiency;
        Self {
            correct_answer: record.correctness,
            parallel_tool_calls: record.tool_call_density,
            efficiency_bonus: efficiency,
            total,
        }
    }
}

/// Whether a judge verdict says the answer is correct.
pub(crate) fn is_affirmative(verdict: &str) -> bool {
    verdict.to_lowercase().contains("yes")
}

/// Average tool calls per tool-calling turn, over 8, capped at 1.0.
///
/// Turns without tool calls do not count toward the average.
pub(crate) fn parallelism_reward(trajectory: &[Turn]) -> f64 {
    let per_turn: Vec<usize> = trajectory
        .iter()
        .map(Turn::tool_call_count)
        .filter(|&n| n > 0)
        .collect();
    if per_turn.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let average = per_turn.iter().sum::<usize>() as f64 / per_turn.len() as f64;
    (average / MAX_PARALLEL_CALLS).min(1.0)
}

/// 1.0 for each correct rollout with the fewest turns among correct
/// rollouts, 0.0 for everything else.
pub(crate) fn efficiency_rewards(states: &[RolloutState]) -> Vec<f64> {
    let shortest = states
        .iter()
        .filter(|s| s.is_correct)
        .map(|s| s.trajectory.len())
        .min();

    states
        .iter()
        .map(|s| match shortest {
            Some(min) if s.is_correct && s.trajectory.len() == min => 1.0,
            _ => 0.0,
        })
        .collect()
}

/// Scores a group of rollouts that answered the same question.
pub(crate) fn score_group(states: &[RolloutState], weights: &RewardConfig) -> Vec<RewardBreakdown> {
    efficiency_rewards(states)
        .into_iter()
        .zip(states)
        .map(|(efficiency, state)| {
            RewardBreakdown::combine(weights, &RewardRecord::from_state(state), efficiency)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::ToolInvocation;

    fn turn(calls: usize) -> Turn {
        Turn {
            content: String::new(),
            invocations: (0..calls)
                .map(|i| ToolInvocation {
                    call_id: format!("call_{i}"),
                    name: "grep_tool".to_string(),
                    arguments: "{}".to_string(),
                    output: String::new(),
                })
                .collect(),
        }
    }

    fn rollout(turns: usize, correct: bool) -> RolloutState {
        let mut state = RolloutState::new("q", "a");
        state.trajectory = (0..turns).map(|_| turn(1)).collect();
        state.is_correct = correct;
        state
    }

    #[test]
    fn test_affirmative_verdicts() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative("YES."));
        assert!(is_affirmative("Yes, the response matches."));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_parallelism_zero_without_tool_calls() {
        assert!(parallelism_reward(&[]).abs() < f64::EPSILON);
        assert!(parallelism_reward(&[turn(0), turn(0)]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parallelism_averages_tool_calling_turns() {
        // 4 and 2 calls average to 3; the answer turn is ignored.
        let reward = parallelism_reward(&[turn(4), turn(2), turn(0)]);
        assert!((reward - 3.0 / 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parallelism_capped_at_one() {
        let reward = parallelism_reward(&[turn(12)]);
        assert!((reward - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_efficiency_rewards_shortest_correct() {
        let states = vec![
            rollout(3, true),
            rollout(5, true),
            rollout(3, true),
            rollout(7, true),
            rollout(1, false),
        ];
        assert_eq!(efficiency_rewards(&states), vec![1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_efficiency_rewards_none_correct() {
        let states = vec![rollout(2, false), rollout(4, false)];
        assert_eq!(efficiency_rewards(&states), vec![0.0, 0.0]);
    }

    #[test]
    fn test_score_group_applies_weights() {
        let weights = RewardConfig {
            correct_answer: 1.0,
            parallel_tool_calls: 0.5,
            efficiency_bonus: 2.0,
        };
        let states = vec![rollout(2, true), rollout(4, true), rollout(2, false)];

        let scores = score_group(&states, &weights);

        // One call per turn gives a density of 1/8.
        let density = 1.0 / 8.0;
        assert!((scores[0].total - (1.0 + 0.5 * density + 2.0)).abs() < 1e-9);
        assert!((scores[1].total - (1.0 + 0.5 * density)).abs() < 1e-9);
        assert!((scores[2].total - 0.5 * density).abs() < 1e-9);
        assert!((scores[1].efficiency_bonus).abs() < f64::EPSILON);
    }
}

//! Run grouped rollouts over a dataset and write scored results.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::SandboxStack;
use crate::config::Config;
use crate::llm::OpenAiChatModel;
use crate::metrics::MetricsSnapshot;
use crate::observer::{Recorder, TracingObserver};
use crate::reward::LlmJudge;
use crate::rollout::{load_questions, RolloutDriver, RolloutReport};

/// Options for `swe-grep run`. `None` keeps the configured value.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub dataset: PathBuf,
    pub output: PathBuf,
    pub limit: Option<usize>,
    pub group_size: Option<usize>,
    pub max_concurrent: Option<usize>,
}

/// Aggregate view of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RunSummary {
    pub rollouts: usize,
    pub setup_failures: usize,
    pub correct: usize,
    pub mean_reward: f64,
}

impl RunSummary {
    pub fn from_reports(reports: &[RolloutReport]) -> Self {
        let rollouts = reports.len();
        let total: f64 = reports.iter().map(|r| r.rewards.total).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_reward = if rollouts == 0 {
            0.0
        } else {
            total / rollouts as f64
        };

        Self {
            rollouts,
            setup_failures: reports.iter().filter(|r| r.setup_error.is_some()).count(),
            correct: reports.iter().filter(|r| r.is_correct).count(),
            mean_reward,
        }
    }

    /// Fraction of rollouts judged correct.
    pub fn accuracy(&self) -> f64 {
        if self.rollouts == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let accuracy = self.correct as f64 / self.rollouts as f64;
        accuracy
    }
}

pub(crate) fn format_summary(summary: &RunSummary, metrics: &MetricsSnapshot, output: &Path) -> String {
    let mut out = String::new();

    writeln!(&mut out, "\n{}", "Run complete".green().bold()).unwrap();
    writeln!(&mut out, "  Rollouts:       {}", summary.rollouts).unwrap();
    let failures = summary.setup_failures.to_string();
    writeln!(
        &mut out,
        "  Setup failures: {}",
        if summary.setup_failures > 0 {
            failures.red().to_string()
        } else {
            failures
        }
    )
    .unwrap();
    writeln!(
        &mut out,
        "  Accuracy:       {:.1}% ({}/{})",
        summary.accuracy() * 100.0,
        summary.correct,
        summary.rollouts
    )
    .unwrap();
    writeln!(&mut out, "  Mean reward:    {:.3}", summary.mean_reward).unwrap();
    writeln!(&mut out, "  {}", metrics.to_string().dimmed()).unwrap();
    writeln!(&mut out, "\nResults written to {}", output.display().to_string().cyan()).unwrap();

    out
}

fn write_reports(path: &Path, reports: &[RolloutReport]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create results file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for report in reports {
        let line = serde_json::to_string(report).context("Failed to serialize rollout report")?;
        writeln!(writer, "{line}")
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Entry point: loads the dataset, runs every group and writes results.
pub(crate) async fn run(mut config: Config, options: RunOptions) -> Result<()> {
    let mut questions = load_questions(&options.dataset)?;
    if let Some(limit) = options.limit {
        questions.truncate(limit);
    }
    if let Some(group_size) = options.group_size {
        config.rollout.group_size = group_size;
    }
    if let Some(max_concurrent) = options.max_concurrent {
        config.rollout.max_concurrent = max_concurrent;
    }

    let policy = OpenAiChatModel::from_config(&config.model).context("Failed to set up the agent model")?;
    let judge_model =
        OpenAiChatModel::from_config(&config.judge).context("Failed to set up the judge model")?;

    let run_id = Uuid::new_v4().to_string();
    let recorder = Some(Arc::new(Recorder::new(Arc::new(TracingObserver))));
    let stack = SandboxStack::connect(&config, &run_id, recorder).await?;

    info!(
        run_id = %run_id,
        questions = questions.len(),
        group_size = config.rollout.group_size,
        max_concurrent = config.rollout.max_concurrent,
        "Starting run"
    );

    let driver = RolloutDriver::new(
        Arc::new(policy),
        Arc::new(LlmJudge::new(Arc::new(judge_model))),
        stack.lifecycle,
        stack.tools,
        &config.rollout,
        config.reward,
    );
    let reports = driver.run_all(&questions, config.rollout.group_size).await;

    write_reports(&options.output, &reports)?;

    let summary = RunSummary::from_reports(&reports);
    print!(
        "{}",
        format_summary(&summary, &stack.metrics.snapshot(), &options.output)
    );
    Ok(())
}

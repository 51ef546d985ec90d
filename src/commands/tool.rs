//! Run a single tool against a freshly provisioned sandbox.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::info;
use uuid::Uuid;

use super::SandboxStack;
use crate::config::Config;
use crate::tools::{GrepArgs, ListArgs, ReadArgs, ToolInput};

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum ToolCommand {
    /// Search the repository with ripgrep
    Grep {
        /// Text or regex to search for
        pattern: String,

        /// Directory to search (default: the clone)
        #[arg(short, long)]
        path: Option<String>,

        /// Only search files matching this glob (e.g., .ts, *.py)
        #[arg(short = 'g', long)]
        file_pattern: Option<String>,

        /// Lines of context around each match (0-5)
        #[arg(short = 'C', long, default_value = "2", allow_negative_numbers = true)]
        context_lines: i64,

        /// Ignore case when matching
        #[arg(short = 'i', long)]
        case_insensitive: bool,
    },

    /// List a directory
    List {
        /// Directory path, relative to the sandbox workdir
        path: String,
    },

    /// Read a range of lines from a file
    Read {
        /// Path to the file
        file_path: String,

        /// First line to read (1-indexed)
        #[arg(short, long, default_value = "1")]
        start_line: i64,

        /// Number of lines to read (at most 50)
        #[arg(short, long, default_value = "100")]
        num_lines: i64,
    },
}

impl ToolCommand {
    pub fn into_input(self) -> ToolInput {
        match self {
            Self::Grep {
                pattern,
                path,
                file_pattern,
                context_lines,
                case_insensitive,
            } => ToolInput::Grep(GrepArgs {
                pattern,
                path,
                file_pattern: file_pattern.unwrap_or_default(),
                context_lines,
                case_insensitive,
            }),
            Self::List { path } => ToolInput::List(ListArgs { path }),
            Self::Read {
                file_path,
                start_line,
                num_lines,
            } => ToolInput::Read(ReadArgs {
                file_path,
                start_line,
                num_lines,
            }),
        }
    }
}

/// Provisions one sandbox, runs the tool, prints its output and tears down.
pub(crate) async fn run(config: &Config, command: ToolCommand) -> Result<()> {
    let run_id = Uuid::new_v4().to_string();
    let stack = SandboxStack::connect(config, &run_id, None).await?;
    let input = command.into_input();

    info!("Provisioning sandbox for {}", input.name().as_str());
    let mut slot = None;
    let mut sandbox = stack
        .lifecycle
        .provision(&run_id, &mut slot)
        .await
        .context("Sandbox setup failed")?;

    let output = stack.tools.run(&sandbox.id, &input).await;
    stack.lifecycle.teardown(&mut sandbox).await;

    println!("{output}");
    eprintln!("{}", stack.metrics.snapshot().to_string().dimmed());
    Ok(())
}

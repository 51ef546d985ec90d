use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod llm;
mod metrics;
mod observer;
mod reward;
mod rollout;
mod sandbox;
mod templates;
mod tools;

use config::Config;

#[derive(Parser)]
#[command(name = "swe-grep")]
#[command(
    author,
    version,
    about = "Sandboxed codebase-search rollouts with grep tools and group rewards"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./swe-grep.toml)
    #[arg(long, global = true, env = "SWE_GREP_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default swe-grep.toml and an example dataset
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Run grouped rollouts over a dataset
    Run {
        /// JSONL file with question/answer rows
        #[arg(short, long)]
        dataset: PathBuf,

        /// Where to write one JSON result per rollout
        #[arg(short, long, default_value = "results.jsonl")]
        output: PathBuf,

        /// Only use the first N questions
        #[arg(short, long)]
        limit: Option<usize>,

        /// Rollouts per question (overrides config)
        #[arg(short, long)]
        group_size: Option<usize>,

        /// Rollouts in flight at once (overrides config)
        #[arg(short, long)]
        max_concurrent: Option<usize>,
    },

    /// Provision a sandbox and run one tool in it
    Tool {
        #[command(subcommand)]
        tool: commands::tool::ToolCommand,
    },

    /// Remove sandbox containers left behind by earlier runs
    Clean,
}

fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = if cli.verbose {
        EnvFilter::new("swe_grep=debug")
    } else {
        EnvFilter::new("swe_grep=info")
    };

    let (writer, guard, ansi) = match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(writer).with_ansi(ansi))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(writer))
            .with(filter)
            .init(),
    }

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Config::load(&cwd)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Run {
            dataset,
            output,
            limit,
            group_size,
            max_concurrent,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = commands::run::RunOptions {
                dataset,
                output,
                limit,
                group_size,
                max_concurrent,
            };
            commands::run::run(config, options).await?;
        }
        Commands::Tool { tool } => {
            let config = load_config(cli.config.as_deref())?;
            commands::tool::run(&config, tool).await?;
        }
        Commands::Clean => {
            let config = load_config(cli.config.as_deref())?;
            commands::clean::run(&config).await?;
        }
    }

    Ok(())
}

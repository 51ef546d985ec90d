//! Agent-facing search tools.
//!
//! Each tool becomes one read-only shell command run through the
//! [`CommandExecutor`]. Every path, including failures, ends in a string the
//! agent can read.

pub(crate) mod command;
pub(crate) mod format;
pub(crate) mod schema;

use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::observer::Recorder;
use crate::rollout::RolloutState;
use crate::sandbox::retry::{excerpt, ERROR_EXCERPT_CHARS};
use crate::sandbox::CommandExecutor;

/// The tools an agent may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ToolName {
    Grep,
    List,
    Read,
}

impl ToolName {
    pub const ALL: [Self; 3] = [Self::Grep, Self::List, Self::Read];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grep => "grep_tool",
            Self::List => "list_files",
            Self::Read => "read_file",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct GrepArgs {
    pub pattern: String,
    /// Defaults to the repository clone.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_pattern: String,
    #[serde(default = "default_context_lines", deserialize_with = "context_lines_or_default")]
    pub context_lines: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ListArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ReadArgs {
    pub file_path: String,
    #[serde(default = "default_start_line", deserialize_with = "start_line_or_default")]
    pub start_line: i64,
    #[serde(default = "default_num_lines", deserialize_with = "num_lines_or_default")]
    pub num_lines: i64,
}

fn default_context_lines() -> i64 {
    2
}

fn default_start_line() -> i64 {
    1
}

fn default_num_lines() -> i64 {
    100
}

// Models send `null` for optional parameters as often as they omit them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

fn context_lines_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_context_lines))
}

fn start_line_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_start_line))
}

fn num_lines_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_num_lines))
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolInput {
    Grep(GrepArgs),
    List(ListArgs),
    Read(ReadArgs),
}

impl ToolInput {
    /// Parses model-provided JSON arguments for `tool`.
    pub fn parse(tool: ToolName, args: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match tool {
            ToolName::Grep => Self::Grep(serde_json::from_value(args)?),
            ToolName::List => Self::List(serde_json::from_value(args)?),
            ToolName::Read => Self::Read(serde_json::from_value(args)?),
        })
    }

    pub fn name(&self) -> ToolName {
        match self {
            Self::Grep(_) => ToolName::Grep,
            Self::List(_) => ToolName::List,
            Self::Read(_) => ToolName::Read,
        }
    }
}

/// Routes tool calls to sandboxed commands.
#[derive(Clone)]
pub(crate) struct ToolDispatcher {
    executor: CommandExecutor,
    recorder: Option<Arc<Recorder>>,
    max_retries: u32,
    default_path: String,
}

impl ToolDispatcher {
    /// `default_path` is searched when a grep call names no path.
    pub fn new(executor: CommandExecutor, max_retries: u32, default_path: &str) -> Self {
        Self {
            executor,
            recorder: None,
            max_retries,
            default_path: default_path.to_string(),
        }
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<Arc<Recorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Runs the tool call `name(raw_args)` against the rollout's sandbox.
    pub async fn dispatch(&self, state: &RolloutState, name: &str, raw_args: &str) -> String {
        let Some(tool) = ToolName::parse(name) else {
            return format!("Unknown tool: {name}");
        };
        let Some(sandbox_id) = state.sandbox_id.as_deref() else {
            return "Error: no sandbox is available for this rollout".to_string();
        };

        let raw = if raw_args.trim().is_empty() { "{}" } else { raw_args };
        let output = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(args) => {
                self.record_turn(state, sandbox_id, name, &args);
                match ToolInput::parse(tool, args) {
                    Ok(input) => self.run(sandbox_id, &input).await,
                    Err(e) => format!("Invalid arguments for {name}: {e}"),
                }
            }
            Err(e) => {
                let unparsed = serde_json::Value::String(raw_args.to_string());
                self.record_turn(state, sandbox_id, name, &unparsed);
                format!("Invalid arguments for {name}: {e}")
            }
        };

        if let Some(recorder) = &self.recorder {
            recorder.response(sandbox_id, &output);
        }
        output
    }

    fn record_turn(&self, state: &RolloutState, sandbox_id: &str, name: &str, args: &serde_json::Value) {
        if let Some(recorder) = &self.recorder {
            recorder.turn(sandbox_id, state.trajectory.len(), name, args);
        }
    }

    /// Runs an already-parsed tool call in `sandbox_id`.
    pub async fn run(&self, sandbox_id: &str, input: &ToolInput) -> String {
        match input {
            ToolInput::Grep(args) => self.grep(sandbox_id, args).await,
            ToolInput::List(args) => self.list_files(sandbox_id, args).await,
            ToolInput::Read(args) => self.read_file(sandbox_id, args).await,
        }
    }

    async fn grep(&self, sandbox_id: &str, args: &GrepArgs) -> String {
        let path = args
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_path);
        let cmd = command::grep_command(args, path);
        let outcome = self
            .executor
            .run(sandbox_id, &cmd, ToolName::Grep.as_str(), self.max_retries)
            .await;
        if !outcome.success {
            return error_text(&outcome.output);
        }
        format::format_grep(&outcome.output)
    }

    async fn list_files(&self, sandbox_id: &str, args: &ListArgs) -> String {
        let cmd = command::list_command(&args.path);
        let outcome = self
            .executor
            .run(sandbox_id, &cmd, ToolName::List.as_str(), self.max_retries)
            .await;
        if !outcome.success {
            return error_text(&outcome.output);
        }
        format::format_list(&outcome.output)
    }

    async fn read_file(&self, sandbox_id: &str, args: &ReadArgs) -> String {
        let (cmd, window) = command::read_command(args);
        let outcome = self
            .executor
            .run(sandbox_id, &cmd, ToolName::Read.as_str(), self.max_retries)
            .await;
        if !outcome.success {
            return error_text(&outcome.output);
        }
        format::format_read(&args.file_path, window, &outcome.output, &outcome.stderr)
    }
}

fn error_text(error: &str) -> String {
    format!("Error: {}", excerpt(error, ERROR_EXCERPT_CHARS))
}

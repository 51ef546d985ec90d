use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub(crate) const CONFIG_FILE: &str = "swe-grep.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub judge: ModelConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Sandbox provisioning and bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Image every sandbox boots from (needs apt-get)
    #[serde(default = "default_image")]
    pub image: String,

    /// Working directory inside the sandbox; the repository is cloned here
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Repository the agent searches
    #[serde(default = "default_repo_url")]
    pub repo_url: String,

    /// Directory the clone lands in (default: derived from `repo_url`)
    #[serde(default)]
    pub clone_dir: Option<String>,

    /// Whole-sandbox setup attempts before a rollout fails
    #[serde(default = "default_max_setup_retries")]
    pub max_setup_retries: u32,

    /// Extra attempts for bootstrap commands
    #[serde(default = "default_exec_max_retries")]
    pub exec_max_retries: u32,

    /// Extra attempts for the clone command
    #[serde(default = "default_clone_max_retries")]
    pub clone_max_retries: u32,

    /// Milliseconds before the first command retry; later retries double it
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Seconds to wait for a sandbox to become ready
    #[serde(default = "default_creation_timeout")]
    pub creation_timeout_secs: u64,

    /// Memory limit (e.g., "4g")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CPU limit (e.g., "2")
    #[serde(default = "default_cpus")]
    pub cpus: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            workdir: default_workdir(),
            repo_url: default_repo_url(),
            clone_dir: None,
            max_setup_retries: default_max_setup_retries(),
            exec_max_retries: default_exec_max_retries(),
            clone_max_retries: default_clone_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            creation_timeout_secs: default_creation_timeout(),
            memory: default_memory(),
            cpus: default_cpus(),
        }
    }
}

impl SandboxConfig {
    /// Directory the repository is cloned into, relative to `workdir`.
    pub fn clone_dir(&self) -> String {
        if let Some(dir) = self.clone_dir.as_deref().filter(|d| !d.is_empty()) {
            return dir.to_string();
        }
        let last = self
            .repo_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        last.strip_suffix(".git").unwrap_or(last).to_string()
    }
}

/// Agent-facing tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Extra attempts for tool commands (0 = single attempt)
    #[serde(default)]
    pub max_retries: u32,
}

/// Rollout driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Model turns per rollout
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Rollouts per question (one reward group)
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Upper bound on rollouts in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// System prompt given to the agent
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            group_size: default_group_size(),
            max_concurrent: default_max_concurrent(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion token limit
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Static weights for combining reward components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_correct_weight")]
    pub correct_answer: f64,

    #[serde(default)]
    pub parallel_tool_calls: f64,

    #[serde(default = "default_efficiency_weight")]
    pub efficiency_bonus: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            correct_answer: default_correct_weight(),
            parallel_tool_calls: 0.0,
            efficiency_bonus: default_efficiency_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Log a metrics line every N completed setups (0 = never)
    #[serde(default = "default_log_every")]
    pub log_every: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_every: default_log_every(),
        }
    }
}

// Default value functions
fn default_image() -> String {
    "ubuntu:22.04".to_string()
}

fn default_workdir() -> String {
    "/root".to_string()
}

fn default_repo_url() -> String {
    "https://github.com/microsoft/vscode.git".to_string()
}

fn default_max_setup_retries() -> u32 {
    3
}

fn default_exec_max_retries() -> u32 {
    2
}

fn default_clone_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_creation_timeout() -> u64 {
    300
}

fn default_memory() -> String {
    "4g".to_string()
}

fn default_cpus() -> String {
    "2".to_string()
}

fn default_max_turns() -> usize {
    5
}

fn default_group_size() -> usize {
    4
}

fn default_max_concurrent() -> usize {
    128
}

pub(crate) fn default_system_prompt() -> String {
    "You are a helpful assistant that can answer questions and help with tasks.\n\
     You have access to a set of tools to help you answer questions and help with tasks.\n\
     You can make multiple tool calls in parallel per turn (up to 8), and are encouraged to do so\n\
     in order to answer the question as quickly as possible.\n"
        .to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_correct_weight() -> f64 {
    1.0
}

fn default_efficiency_weight() -> f64 {
    1.0
}

fn default_log_every() -> u64 {
    50
}

impl Config {
    /// Load `swe-grep.toml` from a directory, using defaults if not found
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}

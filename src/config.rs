use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard ceiling on simultaneous judge calls, whatever the caller asks for
pub const MAX_IN_FLIGHT: usize = 24;

/// Settings that shape a grading run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationSettings {
    /// Requested number of simultaneous judge calls (capped at 24)
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Number of rows submitted together before waiting for the batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Grade against the reference answer when a row carries one
    #[serde(default)]
    pub honor_reference: bool,
    /// Summarize tables that already carry a `score` column instead of grading them again
    #[serde(default)]
    pub reuse_scores: bool,
    /// Directory receiving a uniquely named copy of every scored file
    #[serde(default = "default_completed_dir")]
    pub completed_dir: PathBuf,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            honor_reference: false,
            reuse_scores: false,
            completed_dir: default_completed_dir(),
        }
    }
}

impl EvaluationSettings {
    /// Number of semaphore permits actually granted to a run
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_IN_FLIGHT)
    }
}

/// Chat-completions shaped judge endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepseekConfig {
    /// OpenAI compatible base URL
    #[serde(default = "default_deepseek_endpoint")]
    pub api_endpoint: String,
    /// Model identifier served at the endpoint
    #[serde(default = "default_deepseek_model")]
    pub model: String,
    /// Environment variable holding the API key, if the endpoint needs one
    #[serde(default)]
    pub env_var_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Transport timeout for a single judge call
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for DeepseekConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_deepseek_endpoint(),
            model: default_deepseek_model(),
            env_var_api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: None,
        }
    }
}

/// Responses shaped judge endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GptOssConfig {
    #[serde(default = "default_gpt_oss_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_gpt_oss_model")]
    pub model: String,
    #[serde(default)]
    pub env_var_api_key: Option<String>,
    /// System level instructions sent with every request
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for GptOssConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_gpt_oss_endpoint(),
            model: default_gpt_oss_model(),
            env_var_api_key: None,
            instructions: default_instructions(),
            request_timeout_secs: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_batch_size() -> usize {
    4
}

fn default_completed_dir() -> PathBuf {
    PathBuf::from("completed-files")
}

fn default_deepseek_endpoint() -> String {
    "http://192.168.1.111:23333/v1".to_string()
}

fn default_deepseek_model() -> String {
    "/disk2/liweichao/DeepSeek/DeepSeek-R1".to_string()
}

fn default_gpt_oss_endpoint() -> String {
    "http://192.168.1.113:8000/v1".to_string()
}

fn default_gpt_oss_model() -> String {
    "Open-Model/openai-120B".to_string()
}

fn default_temperature() -> f32 {
    0.6
}

fn default_top_p() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_instructions() -> String {
    "You are a helpful assistant.".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    #[serde(default)]
    pub deepseek: DeepseekConfig,
    #[serde(default)]
    pub gpt_oss: GptOssConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        if config.evaluation.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1 in {}", path.display());
        }

        Ok(config)
    }

    /// Load the file when given, fall back to built-in defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolve the API key for a judge profile; local deployments accept any token
pub fn resolve_api_key(env_var: Option<&str>) -> String {
    env_var
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| "EMPTY".to_string())
}

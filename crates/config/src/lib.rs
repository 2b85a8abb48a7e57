//! CONFIG: Configuration management for fusion
//!
//! Loads and saves named model settings plus agent, swarm and server parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir};

/// Name of the settings entry every lookup falls back to
pub const DEFAULT_LLM: &str = "default";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("NO 'default' MODEL SETTINGS CONFIGURED")]
    MissingDefault,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for one completion endpoint/model pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_type")]
    pub api_type: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_type: default_api_type(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            stream_timeout_secs: default_stream_timeout(),
        }
    }
}

impl LlmSettings {
    pub fn is_ollama(&self) -> bool {
        self.api_type.eq_ignore_ascii_case("ollama")
    }
}

fn default_model() -> String {
    "mistral:latest".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_api_type() -> String {
    "ollama".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    120
}

fn default_stream_timeout() -> u64 {
    180
}

fn default_llm_map() -> HashMap<String, LlmSettings> {
    let mut map = HashMap::new();
    map.insert(DEFAULT_LLM.to_string(), LlmSettings::default());
    map
}

/// Think/act loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Observation length cap, in characters
    #[serde(default)]
    pub max_observe: Option<usize>,
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
    #[serde(default = "default_special_tools")]
    pub special_tools: Vec<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub next_step_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_steps: default_max_steps(),
            max_observe: None,
            tool_choice: default_tool_choice(),
            special_tools: default_special_tools(),
            system_prompt: None,
            next_step_prompt: None,
        }
    }
}

fn default_agent_name() -> String {
    "fusion".to_string()
}

fn default_max_steps() -> usize {
    30
}

fn default_tool_choice() -> String {
    "auto".to_string()
}

fn default_special_tools() -> Vec<String> {
    vec!["terminate".to_string()]
}

/// Retry policy for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    6
}

fn default_min_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

/// One role-specialised pipeline agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub model: String,
    pub role: String,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, model: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            role: role.into(),
        }
    }
}

/// Multi-agent pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSettings {
    #[serde(default = "default_profiles")]
    pub agents: Vec<AgentProfile>,
    #[serde(default = "default_agent_temperature")]
    pub agent_temperature: f32,
    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            agents: default_profiles(),
            agent_temperature: default_agent_temperature(),
            synthesis_temperature: default_synthesis_temperature(),
            task_timeout_secs: default_task_timeout(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("browser_navigator", "mistral:latest", "Web Navigation"),
        AgentProfile::new("researcher", "deepseek-r1:latest", "Research"),
        AgentProfile::new("synthesizer", "llama3:8b", "Result Synthesis"),
    ]
}

fn default_agent_temperature() -> f32 {
    0.3
}

fn default_synthesis_temperature() -> f32 {
    0.2
}

fn default_task_timeout() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    100
}

/// REST front-end binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_llm_map")]
    pub llm: HashMap<String, LlmSettings>,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub swarm: SwarmSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: default_llm_map(),
            agent: AgentSettings::default(),
            retry: RetrySettings::default(),
            swarm: SwarmSettings::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG FOUND AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Settings for `name`, falling back to the default entry
    pub fn llm_settings(&self, name: &str) -> Result<&LlmSettings> {
        self.llm
            .get(name)
            .or_else(|| self.llm.get(DEFAULT_LLM))
            .ok_or(ConfigError::MissingDefault)
    }

    /// Settings of the default entry
    pub fn default_llm(&self) -> Result<&LlmSettings> {
        self.llm_settings(DEFAULT_LLM)
    }
}

/// Write a default config (unless one exists) and create the data directory
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG WRITTEN TO {:?}", config_path);
    }

    tokio::fs::create_dir_all(data_dir()).await?;

    Config::load().await
}

//! TOML configuration for `famtree`.
//!
//! ```toml
//! [db]
//! path = "./data/family.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7331"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [side_channel]
//! command = "famtree"
//! args = ["--config", "./config/famtree.toml", "serve", "rpc"]
//!
//! [uploads]
//! cloud_name = "demo"
//! api_key = "1234567890"
//!
//! [tree]
//! root_id = "a1b2c3d4-e5f6-4a1b-8c9d-123456789abc"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub side_channel: Option<SideChannelConfig>,
    #[serde(default)]
    pub uploads: Option<UploadsConfig>,
    #[serde(default)]
    pub tree: TreeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// How to reach the assistant side channel: a command speaking
/// line-delimited JSON-RPC on stdio (usually `famtree serve rpc`).
#[derive(Debug, Deserialize, Clone)]
pub struct SideChannelConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_side_channel_timeout")]
    pub timeout_secs: u64,
}

fn default_side_channel_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    pub cloud_name: String,
    pub api_key: String,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
}

fn default_api_secret_env() -> String {
    "CLOUDINARY_API_SECRET".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TreeConfig {
    #[serde(default)]
    pub root_id: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }

    if let Some(side) = &config.side_channel {
        if side.command.trim().is_empty() {
            anyhow::bail!("side_channel.command must not be empty");
        }
        if side.timeout_secs == 0 {
            anyhow::bail!("side_channel.timeout_secs must be > 0");
        }
    }

    Ok(config)
}

//! Application configuration

pub mod assistant;
pub mod prompts;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use assistant::{
    AssistantConfig, BudgetConfig, ConfigError, LlmConfig, ReminderConfig, RoutingVariant,
    SpeechConfig, WeatherConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub data_dir: PathBuf,
    pub assistant_config_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            ollama_url: env::var("OLLAMA_URL").ok(),
            data_dir: env::var("NEXUS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            assistant_config_path: env::var("NEXUS_CONFIG").ok().map(PathBuf::from),
        })
    }

    /// Load the TOML assistant config, falling back to defaults when none is set
    pub fn load_assistant_config(&self) -> Result<AssistantConfig, ConfigError> {
        match &self.assistant_config_path {
            Some(path) => AssistantConfig::from_file(path),
            None => Ok(AssistantConfig::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            openai_api_key: None,
            ollama_url: None,
            data_dir: PathBuf::from("./data"),
            assistant_config_path: None,
        }
    }
}

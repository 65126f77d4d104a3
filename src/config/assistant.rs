//! Assistant configuration loaded from TOML files
//!
//! A deployment's TOML file defines:
//! - The persona (name and address form used in every reply)
//! - Which modes are on and which routing order applies
//! - LLM provider settings
//! - The monthly token budget
//! - Weather backend, speech output and reminder settings
//!
//! Every section is optional; a missing file yields [`AssistantConfig::default`].

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Root assistant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Persona settings
    #[serde(default)]
    pub assistant: PersonaConfig,

    /// Mode flags and routing order
    #[serde(default)]
    pub modes: ModesConfig,

    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Token budget settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Weather backend settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Speech output settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Daily reminders
    #[serde(default = "default_reminders")]
    pub reminders: Vec<ReminderConfig>,
}

impl AssistantConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: AssistantConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.monthly_budget.partial_cmp(&0.0) != Some(Ordering::Greater) {
            return Err(ConfigError::Validation(
                "budget.monthly_budget must be positive".to_string(),
            ));
        }
        if self.budget.cost_per_1k_tokens < 0.0 {
            return Err(ConfigError::Validation(
                "budget.cost_per_1k_tokens must not be negative".to_string(),
            ));
        }
        for reminder in &self.reminders {
            reminder.parsed_time()?;
        }
        Ok(())
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            assistant: PersonaConfig::default(),
            modes: ModesConfig::default(),
            llm: LlmConfig::default(),
            budget: BudgetConfig::default(),
            weather: WeatherConfig::default(),
            speech: SpeechConfig::default(),
            reminders: default_reminders(),
        }
    }
}

/// Persona settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Assistant display name
    #[serde(default = "default_assistant_name")]
    pub name: String,

    /// Form of address that prefixes apologies ("señor")
    #[serde(default = "default_address_form")]
    pub address_form: String,

    /// Initial user name for a fresh profile
    #[serde(default)]
    pub user_name: Option<String>,
}

fn default_assistant_name() -> String {
    "JARVIS".to_string()
}

fn default_address_form() -> String {
    "señor".to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            address_form: default_address_form(),
            user_name: None,
        }
    }
}

/// Which intent ordering to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingVariant {
    /// Intelligent-mode gate first, then weather, music, image, chat
    #[default]
    Chat,
    /// Weather and music ahead of the gate, shorter image keyword set
    Mcp,
}

/// Mode flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModesConfig {
    /// Default for requests that don't say
    #[serde(default = "default_true")]
    pub intelligent: bool,

    #[serde(default)]
    pub functional: bool,

    #[serde(default)]
    pub routing: RoutingVariant,
}

fn default_true() -> bool {
    true
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            intelligent: true,
            functional: false,
            routing: RoutingVariant::Chat,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "ollama", "openai"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Custom API endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-request timeout; completions are never retried
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Monthly spend ceiling in USD
    #[serde(default = "default_monthly_budget")]
    pub monthly_budget: f64,

    /// Informational daily token allowance
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// USD per 1000 tokens
    #[serde(default = "default_cost_per_1k")]
    pub cost_per_1k_tokens: f64,

    /// Days from ledger creation to its reset date
    #[serde(default = "default_reset_after_days")]
    pub reset_after_days: i64,
}

fn default_monthly_budget() -> f64 {
    10.0
}

fn default_daily_limit() -> u64 {
    50_000
}

fn default_cost_per_1k() -> f64 {
    0.002
}

fn default_reset_after_days() -> i64 {
    12
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_budget: default_monthly_budget(),
            daily_limit: default_daily_limit(),
            cost_per_1k_tokens: default_cost_per_1k(),
            reset_after_days: default_reset_after_days(),
        }
    }
}

/// Weather backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,

    /// Location used when the utterance names none
    #[serde(default = "default_location")]
    pub default_location: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_weather_url() -> String {
    "https://wttr.in".to_string()
}

fn default_location() -> String {
    "Madrid".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            default_location: default_location(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub muted: bool,

    /// How long a muted `speak` waits before resolving
    #[serde(default = "default_muted_delay_ms")]
    pub muted_delay_ms: u64,
}

fn default_muted_delay_ms() -> u64 {
    500
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            muted: false,
            muted_delay_ms: default_muted_delay_ms(),
        }
    }
}

/// A daily reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Local time, "HH:MM"
    pub time: String,
    pub message: String,
}

impl ReminderConfig {
    pub fn parsed_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").map_err(|_| {
            ConfigError::Validation(format!("invalid reminder time '{}'", self.time))
        })
    }
}

fn default_reminders() -> Vec<ReminderConfig> {
    vec![
        ReminderConfig {
            time: "09:00".to_string(),
            message: "Buenos días. Recuerde revisar su agenda de hoy.".to_string(),
        },
        ReminderConfig {
            time: "14:00".to_string(),
            message: "Es hora de comer algo y tomar un descanso.".to_string(),
        },
        ReminderConfig {
            time: "22:00".to_string(),
            message: "Se está haciendo tarde. Le sugiero ir preparándose para descansar."
                .to_string(),
        },
    ]
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[assistant]
name = "NEXUS"
address_form = "señora"
user_name = "Ana"

[modes]
intelligent = true
functional = true
routing = "mcp"

[llm]
provider = "openai"
model = "gpt-4o-mini"
max_tokens = 300

[budget]
monthly_budget = 5.0
cost_per_1k_tokens = 0.002

[speech]
muted = true

[[reminders]]
time = "07:30"
message = "Hora de levantarse"
"#;

    #[test]
    fn test_parse_config() {
        let config = AssistantConfig::from_str(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.assistant.name, "NEXUS");
        assert_eq!(config.assistant.user_name, Some("Ana".to_string()));
        assert!(config.modes.functional);
        assert_eq!(config.modes.routing, RoutingVariant::Mcp);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.max_tokens, 300);
        assert_eq!(config.budget.monthly_budget, 5.0);
        assert_eq!(config.budget.reset_after_days, 12); // Default
        assert!(config.speech.muted);
        assert_eq!(config.reminders.len(), 1);
        assert_eq!(config.reminders[0].time, "07:30");
    }

    #[test]
    fn test_minimal_config() {
        let config = AssistantConfig::from_str("").unwrap();
        assert_eq!(config.assistant.name, "JARVIS");
        assert_eq!(config.assistant.address_form, "señor");
        assert!(config.modes.intelligent);
        assert_eq!(config.modes.routing, RoutingVariant::Chat);
        assert_eq!(config.reminders.len(), 3);
    }

    #[test]
    fn test_rejects_bad_reminder_time() {
        let bad = r#"
[[reminders]]
time = "25:99"
message = "nunca"
"#;
        let err = AssistantConfig::from_str(bad).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_zero_budget() {
        let bad = r#"
[budget]
monthly_budget = 0.0
"#;
        assert!(AssistantConfig::from_str(bad).is_err());
    }

    #[test]
    fn test_rejects_nan_budget() {
        let bad = r#"
[budget]
monthly_budget = nan
"#;
        assert!(matches!(
            AssistantConfig::from_str(bad),
            Err(ConfigError::Validation(_))
        ));
    }
}

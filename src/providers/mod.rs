//! Chat completion providers

mod ollama;
mod openai_compat;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::{Config, LlmConfig};

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("API key not configured: {0}")]
    NotConfigured(String),

    #[error("API key rejected: {0}")]
    Unauthorized(String),

    #[error("Usage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Map an unsuccessful HTTP status to an error variant
    pub(crate) fn from_status(status: StatusCode, detail: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(detail),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
                ProviderError::QuotaExceeded(detail)
            }
            _ => ProviderError::InvalidResponse(format!("{}: {}", status, detail)),
        }
    }
}

/// Text produced by a completion and what it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// A billed text generation backend
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError>;
}

pub enum Provider {
    Ollama(OllamaProvider),
    OpenAI(OpenAICompatProvider),
    /// No usable backend; every call fails with the stored reason
    Unavailable(String),
}

impl Provider {
    pub fn from_config(llm: &LlmConfig, config: &Config) -> Result<Self, ProviderError> {
        match llm.provider.to_lowercase().as_str() {
            "ollama" => {
                let url = llm
                    .endpoint
                    .clone()
                    .or_else(|| config.ollama_url.clone())
                    .unwrap_or_else(|| "http://localhost:11434".into());
                Ok(Provider::Ollama(OllamaProvider::new(url, llm.model.clone())))
            }
            "openai" => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY".into()))?;
                let mut provider_config = OpenAICompatConfig::openai(api_key);
                provider_config.default_model = llm.model.clone();
                provider_config.timeout_secs = llm.timeout_secs;
                if let Some(endpoint) = &llm.endpoint {
                    provider_config.base_url = endpoint.clone();
                }
                Ok(Provider::OpenAI(OpenAICompatProvider::new(provider_config)?))
            }
            "local" => {
                let endpoint = llm
                    .endpoint
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("llm.endpoint".into()))?;
                Ok(Provider::OpenAI(OpenAICompatProvider::new(
                    OpenAICompatConfig::local(endpoint, llm.model.clone()),
                )?))
            }
            _ => Err(ProviderError::UnknownProvider(llm.provider.clone())),
        }
    }
}

#[async_trait]
impl ChatCompletion for Provider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        match self {
            Provider::Ollama(p) => p.complete(system_prompt, user_prompt, max_tokens).await,
            Provider::OpenAI(p) => p.complete(system_prompt, user_prompt, max_tokens).await,
            Provider::Unavailable(reason) => Err(ProviderError::NotConfigured(reason.clone())),
        }
    }
}

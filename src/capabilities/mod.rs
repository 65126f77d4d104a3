//! Capability dispatchers
//!
//! One handler per intent. Every handler returns a [`CapabilityReply`] that is
//! ready to be spoken; upstream failures are turned into apologies at this
//! boundary and never reach the user raw.
//!
//! # Handlers
//!
//! - `weather` - prose summary from a [`WeatherSource`], with one retry
//! - `music` - fuzzy playlist lookup in a [`PlaylistCatalog`]
//! - `image` - deterministic placeholder image synthesis
//! - `chat` - free-form completion through a billed provider

pub mod chat;
pub mod image;
pub mod music;
pub mod weather;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::prompts::{builtin, capitalize};
use crate::providers::ProviderError;

pub use chat::ChatCapability;
pub use image::{ImageCapability, SyntheticImage};
pub use music::{MusicCapability, Playlist, PlaylistCatalog, StoredCatalog};
pub use weather::{HttpWeatherSource, WeatherCapability, WeatherSource};

/// Errors raised inside a capability before they are turned into apologies
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Weather lookup failed: {0}")]
    Weather(String),

    #[error("Request timed out after {0}s (network)")]
    Timeout(u64),

    #[error("Playlist catalog unavailable: {0}")]
    Catalog(String),
}

impl CapabilityError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CapabilityError::Provider(ProviderError::NotConfigured(_))
            | CapabilityError::Provider(ProviderError::Unauthorized(_)) => FailureKind::Configuration,
            CapabilityError::Provider(ProviderError::QuotaExceeded(_)) => FailureKind::Quota,
            CapabilityError::Provider(ProviderError::RequestFailed(e))
                if e.is_connect() || e.is_timeout() =>
            {
                FailureKind::Network
            }
            CapabilityError::Timeout(_) => FailureKind::Network,
            other => FailureKind::from_message(&other.to_string()),
        }
    }
}

/// Coarse classification of an upstream failure, selecting the apology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Configuration,
    Quota,
    Network,
    Unknown,
}

impl FailureKind {
    /// Substring rules over an error message
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("api key") {
            FailureKind::Configuration
        } else if lower.contains("quota") {
            FailureKind::Quota
        } else if lower.contains("network") {
            FailureKind::Network
        } else {
            FailureKind::Unknown
        }
    }
}

/// Apology for a failure: address form first, retry invitation last
pub fn apology(kind: FailureKind, address_form: &str) -> String {
    let body = match kind {
        FailureKind::Configuration => builtin::APOLOGY_CONFIGURATION,
        FailureKind::Quota => builtin::APOLOGY_QUOTA,
        FailureKind::Network => builtin::APOLOGY_NETWORK,
        FailureKind::Unknown => builtin::APOLOGY_UNKNOWN,
    };
    format!(
        "{}, {} {}",
        capitalize(address_form),
        body,
        builtin::RETRY_INVITATION
    )
}

/// Structured side effect a client should carry out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantAction {
    PlayPlaylist { playlist: Playlist },
    ShowImage { image: SyntheticImage },
}

/// Normalized output of every capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReply {
    pub success: bool,
    pub response: String,
    pub has_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AssistantAction>,
}

impl CapabilityReply {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            has_image: false,
            image_url: None,
            action: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.has_image = true;
        self.image_url = Some(url.into());
        self
    }

    pub fn with_action(mut self, action: AssistantAction) -> Self {
        self.action = Some(action);
        self
    }
}

//! Weather capability

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::prompts::{builtin, render};
use crate::config::WeatherConfig;

use super::{CapabilityError, CapabilityReply};

/// Words after which the utterance names a place
const LOCATION_MARKERS: &[&str] = &["en", "in"];

/// Attempts per lookup; weather reads are idempotent so one retry is allowed
const MAX_ATTEMPTS: u32 = 2;

/// Produces a short prose weather summary for a place
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn summary(&self, location: &str) -> Result<String, CapabilityError>;
}

/// Plain-text weather from a wttr.in-compatible service
pub struct HttpWeatherSource {
    client: Client,
    base_url: String,
}

impl HttpWeatherSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
    async fn summary(&self, location: &str) -> Result<String, CapabilityError> {
        let url = format!(
            "{}/{}?format=%C,+%t,+humedad+%h,+viento+%w&lang=es",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(location)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CapabilityError::Weather(format!("network: {}", e)))?;

        if !response.status().is_success() {
            return Err(CapabilityError::Weather(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Weather(e.to_string()))?;
        let body = body.trim();
        if body.is_empty() {
            return Err(CapabilityError::Weather("empty response".to_string()));
        }
        Ok(body.to_string())
    }
}

/// Place named after "en"/"in" in the utterance, if any
pub fn extract_location(utterance: &str) -> Option<String> {
    let words: Vec<&str> = utterance.split_whitespace().collect();
    let marker = words
        .iter()
        .rposition(|w| LOCATION_MARKERS.contains(&w.to_lowercase().as_str()))?;

    let place = words[marker + 1..]
        .join(" ")
        .trim_matches(|c: char| "¿?¡!.,;:".contains(c))
        .trim()
        .to_string();

    Some(place).filter(|p| !p.is_empty())
}

pub struct WeatherCapability {
    source: Arc<dyn WeatherSource>,
    config: WeatherConfig,
}

impl WeatherCapability {
    pub fn new(source: Arc<dyn WeatherSource>, config: WeatherConfig) -> Self {
        Self { source, config }
    }

    pub async fn handle(&self, utterance: &str, assistant_name: &str, address_form: &str) -> CapabilityReply {
        let location =
            extract_location(utterance).unwrap_or_else(|| self.config.default_location.clone());

        match self.lookup(&location).await {
            Ok(summary) => CapabilityReply::text(format!(
                "En {} ahora mismo: {}, {}.",
                location,
                summary.trim_end_matches('.'),
                address_form
            )),
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Weather lookup failed");
                CapabilityReply::text(render(
                    builtin::WEATHER_UNAVAILABLE,
                    assistant_name,
                    address_form,
                    "",
                ))
            }
        }
    }

    async fn lookup(&self, location: &str) -> Result<String, CapabilityError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut last_error = CapabilityError::Timeout(self.config.timeout_secs);

        for attempt in 1..=MAX_ATTEMPTS {
            match tokio::time::timeout(timeout, self.source.summary(location)).await {
                Ok(Ok(summary)) => return Ok(summary),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = CapabilityError::Timeout(self.config.timeout_secs),
            }
            tracing::debug!(attempt, error = %last_error, "Weather attempt failed");
        }

        Err(last_error)
    }
}

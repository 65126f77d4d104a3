//! Assistant engine
//!
//! The engine is the single entry point for an utterance. It:
//! 1. Validates the request and resolves the mode flags
//! 2. Classifies the utterance into one intent
//! 3. Gates free chat on the token budget
//! 4. Dispatches to the capability and turns failures into apologies
//! 5. Records the turn in conversational memory
//! 6. Attaches the current budget alert, if any

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capabilities::chat::build_system_prompt;
use crate::capabilities::{
    apology, AssistantAction, CapabilityReply, ChatCapability, ImageCapability, MusicCapability,
    PlaylistCatalog, WeatherCapability, WeatherSource,
};
use crate::config::assistant::{ModesConfig, PersonaConfig};
use crate::config::prompts::{builtin, capitalize, render};
use crate::config::AssistantConfig;
use crate::conversation::ConversationMessage;
use crate::providers::ChatCompletion;
use crate::storage::MemoryStore;

use super::budget::{BudgetAlert, TokenBudget};
use super::intent::{BlockReason, Intent, IntentClassifier, Modes};
use super::memory::ConversationMemory;

/// Length of a title derived from the opening utterance
const TITLE_CHARS: usize = 50;

/// One utterance from the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub message: String,

    /// Conversation to continue; a new one is started when absent
    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub intelligent_mode: Option<bool>,

    #[serde(default)]
    pub functional_mode: Option<bool>,
}

impl AssistantRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Spoken-ready reply for one utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub success: bool,
    pub response: String,
    pub has_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AssistantAction>,
    /// Absent for blocked requests that never touched memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_alert: Option<BudgetAlert>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),
}

pub struct AssistantEngine {
    persona: PersonaConfig,
    modes: ModesConfig,
    classifier: IntentClassifier,
    memory: Arc<ConversationMemory>,
    budget: Arc<TokenBudget>,
    weather: WeatherCapability,
    music: MusicCapability,
    image: ImageCapability,
    chat: ChatCapability,
}

impl AssistantEngine {
    pub fn new(
        config: &AssistantConfig,
        store: MemoryStore,
        provider: Arc<dyn ChatCompletion>,
        weather_source: Arc<dyn WeatherSource>,
        catalog: Arc<dyn PlaylistCatalog>,
    ) -> Self {
        let memory = ConversationMemory::new(store.clone())
            .with_default_user_name(config.assistant.user_name.clone());

        Self {
            persona: config.assistant.clone(),
            modes: config.modes.clone(),
            classifier: IntentClassifier::new(config.modes.routing),
            memory: Arc::new(memory),
            budget: Arc::new(TokenBudget::new(store, config.budget.clone())),
            weather: WeatherCapability::new(weather_source, config.weather.clone()),
            music: MusicCapability::new(catalog),
            image: ImageCapability::new(),
            chat: ChatCapability::new(provider, &config.llm),
        }
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn budget(&self) -> &Arc<TokenBudget> {
        &self.budget
    }

    pub fn music(&self) -> &MusicCapability {
        &self.music
    }

    /// Handle one utterance end to end
    pub async fn handle(&self, request: AssistantRequest) -> Result<AssistantResponse, EngineError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(EngineError::Validation("message is required".to_string()));
        }

        let modes = Modes {
            intelligent: request.intelligent_mode.unwrap_or(self.modes.intelligent),
            functional: request.functional_mode.unwrap_or(self.modes.functional),
        };
        let intent = self.classifier.classify(message, modes);
        tracing::info!(intent = intent.name(), variant = ?self.classifier.variant(), "Routed utterance");

        if let Intent::Blocked { reason } = intent {
            return Ok(AssistantResponse {
                conversation_id: request.conversation_id,
                ..self.envelope(CapabilityReply::text(self.blocked_text(reason)), intent, None)
            });
        }

        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => {
                let title: String = message.chars().take(TITLE_CHARS).collect();
                self.memory.create_conversation(title).await.id
            }
        };

        let reply = self.dispatch(intent, message, &conversation_id).await;

        self.memory
            .append_message(&conversation_id, ConversationMessage::user(message))
            .await;
        let mut assistant_message = ConversationMessage::assistant(&reply.response);
        if let Some(url) = &reply.image_url {
            assistant_message = assistant_message.with_image(url, message);
        }
        self.memory
            .append_message(&conversation_id, assistant_message)
            .await;
        self.memory.record_interaction(message, &reply.response).await;

        let alert = self.budget.check_limits().await;
        Ok(AssistantResponse {
            conversation_id: Some(conversation_id),
            ..self.envelope(reply, intent, alert)
        })
    }

    async fn dispatch(&self, intent: Intent, message: &str, conversation_id: &str) -> CapabilityReply {
        let name = &self.persona.name;
        let address = &self.persona.address_form;

        match intent {
            Intent::Weather => self.weather.handle(message, name, address).await,
            Intent::Music { genre } => self.music.play(genre.keyword(), name, address).await,
            Intent::Image => self.image.handle(message, name, address),
            Intent::Chat => self.free_chat(message, conversation_id).await,
            Intent::Blocked { reason } => CapabilityReply::text(self.blocked_text(reason)),
        }
    }

    async fn free_chat(&self, message: &str, conversation_id: &str) -> CapabilityReply {
        let permit = self.budget.can_use_tokens().await;
        if !permit.allowed {
            tracing::info!(reason = ?permit.reason, "Free chat denied by budget");
            return CapabilityReply::text(capitalize(&render(
                builtin::BUDGET_EXCEEDED,
                &self.persona.name,
                &self.persona.address_form,
                "",
            )));
        }

        let ctx = self.memory.prompt_context(Some(conversation_id), message).await;
        let system_prompt = build_system_prompt(&self.persona, &ctx);

        match self.chat.complete(&system_prompt, message).await {
            Ok(completion) => {
                self.budget.record_usage(completion.tokens_used).await;
                CapabilityReply::text(completion.text.trim())
            }
            Err(e) => {
                let kind = e.failure_kind();
                tracing::warn!(error = %e, ?kind, "Chat completion failed");
                CapabilityReply::text(apology(kind, &self.persona.address_form))
            }
        }
    }

    fn blocked_text(&self, reason: BlockReason) -> String {
        let template = match reason {
            BlockReason::FunctionalOnly => builtin::BLOCKED_FUNCTIONAL,
            BlockReason::IntelligenceDisabled => builtin::BLOCKED_NORMAL,
        };
        render(template, &self.persona.name, &self.persona.address_form, "")
    }

    fn envelope(
        &self,
        reply: CapabilityReply,
        intent: Intent,
        budget_alert: Option<BudgetAlert>,
    ) -> AssistantResponse {
        AssistantResponse {
            success: reply.success,
            response: reply.response,
            has_image: reply.has_image,
            image_url: reply.image_url,
            action: reply.action,
            conversation_id: None,
            intent,
            budget_alert,
        }
    }
}

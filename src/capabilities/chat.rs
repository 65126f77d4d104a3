//! Free-chat capability
//!
//! Wraps a billed [`ChatCompletion`] provider. Each call is bounded by a
//! timeout and is never retried, so a slow provider can't double-charge.

use std::sync::Arc;
use std::time::Duration;

use crate::config::assistant::PersonaConfig;
use crate::config::prompts::{builtin, render};
use crate::config::LlmConfig;
use crate::core::memory::PromptContext;
use crate::providers::{ChatCompletion, Completion};

use super::CapabilityError;

/// Persona, user name, recalled memories and transcript, in that order
pub fn build_system_prompt(persona: &PersonaConfig, ctx: &PromptContext) -> String {
    let mut sections = vec![render(
        builtin::PERSONA,
        &persona.name,
        &persona.address_form,
        "",
    )];

    if let Some(user) = &ctx.user_name {
        sections.push(render(builtin::USER_NAME, &persona.name, &persona.address_form, user));
    }

    if !ctx.memories.is_empty() {
        let lines = ctx
            .memories
            .iter()
            .map(|m| format!("- {}", m.content))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("{}\n{}", builtin::MEMORIES_HEADER, lines));
    }

    if !ctx.transcript.is_empty() {
        sections.push(format!("{}\n{}", builtin::CONTEXT_HEADER, ctx.transcript));
    }

    sections.join("\n\n")
}

pub struct ChatCapability {
    provider: Arc<dyn ChatCompletion>,
    max_tokens: u32,
    timeout_secs: u64,
}

impl ChatCapability {
    pub fn new(provider: Arc<dyn ChatCompletion>, llm: &LlmConfig) -> Self {
        Self {
            provider,
            max_tokens: llm.max_tokens,
            timeout_secs: llm.timeout_secs,
        }
    }

    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Completion, CapabilityError> {
        let call = self
            .provider
            .complete(system_prompt, user_prompt, self.max_tokens);

        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Ok(result) => {
                let completion = result?;
                tracing::debug!(tokens_used = completion.tokens_used, "Chat completion received");
                Ok(completion)
            }
            Err(_) => Err(CapabilityError::Timeout(self.timeout_secs)),
        }
    }
}

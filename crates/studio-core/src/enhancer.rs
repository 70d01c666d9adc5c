//! Prompt Enhancement
//!
//! Rewrites a short user idea into a richer image-generation prompt with a
//! single completion call. Stateless: no retries, caching or rate limiting.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};

/// Longest prompt accepted, matching the input limit of the generator form
pub const MAX_PROMPT_CHARS: usize = 300;

/// Fixed instruction sent ahead of every user prompt
pub const ENHANCER_SYSTEM_PROMPT: &str = "You are a prompt enhancer for an AI image generator. \
Given a user prompt, rewrite it to be more vivid, creative, and visually detailed for generating \
a stunning YouTube thumbnail. Focus on clarity, vivid imagery, and creative composition.";

pub const INVALID_PROMPT: &str = "Missing or invalid prompt.";

/// Result of a successful enhancement
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedPrompt {
    pub enhanced_prompt: String,
}

/// Prompt enhancer bound to one completion provider
#[derive(Clone)]
pub struct PromptEnhancer {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl PromptEnhancer {
    /// Sampling parameters used for enhancement: short, creative, one choice
    pub fn default_options(model: impl Into<String>) -> GenerationOptions {
        GenerationOptions {
            model: model.into(),
            temperature: 0.9,
            max_tokens: 120,
            choices: 1,
        }
    }

    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            options: Self::default_options(model),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Whether the completion provider answers at all; errors count as down
    pub async fn provider_healthy(&self) -> bool {
        self.provider.health_check().await.unwrap_or(false)
    }

    /// Validate a raw prompt, returning the trimmed text
    pub fn validate(prompt: Option<&str>) -> Result<&str> {
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CoreError::InvalidPrompt(INVALID_PROMPT.into()))?;

        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(CoreError::InvalidPrompt(format!(
                "Prompt must be at most {MAX_PROMPT_CHARS} characters."
            )));
        }
        Ok(prompt)
    }

    /// Enhance a prompt with one completion round trip
    pub async fn enhance(&self, prompt: Option<&str>) -> Result<EnhancedPrompt> {
        let prompt = Self::validate(prompt)?;

        let messages = [Message::system(ENHANCER_SYSTEM_PROMPT), Message::user(prompt)];

        let completion = self
            .provider
            .complete(&messages, &self.options)
            .await
            .inspect_err(|e| {
                tracing::error!(provider = self.provider.name(), error = %e, "Prompt enhancement failed");
            })?;

        let enhanced = completion.content.trim();
        if enhanced.is_empty() {
            tracing::warn!(provider = self.provider.name(), "Completion contained no text");
            return Err(CoreError::EmptyCompletion);
        }

        tracing::debug!(
            model = %completion.model,
            input_chars = prompt.len(),
            output_chars = enhanced.len(),
            "Prompt enhanced"
        );

        Ok(EnhancedPrompt {
            enhanced_prompt: enhanced.to_string(),
        })
    }
}

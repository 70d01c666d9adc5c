//! Completion Provider Strategy
//!
//! Common interface for text-completion backends (OpenAI-compatible APIs,
//! local Ollama) so callers never depend on a concrete vendor client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Sampling configuration for a single completion request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4.1-nano", "llama3.2")
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Number of choices to request
    #[serde(default = "default_choices")]
    pub choices: u32,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> u32 {
    512
}
const fn default_choices() -> u32 {
    1
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-nano".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            choices: default_choices(),
        }
    }
}

/// Response from a completion request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// Text of the first choice
    pub content: String,

    /// Model that produced the text
    pub model: String,

    pub usage: Option<TokenUsage>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Strategy trait for completion providers
///
/// Implementations perform exactly one upstream round trip per call and
/// never retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs and health output
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(&self, messages: &[Message], options: &GenerationOptions)
    -> Result<Completion>;
}

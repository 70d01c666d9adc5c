//! # studio-runtime
//!
//! Concrete providers behind the `studio-core` strategy traits.
//!
//! ## Providers
//!
//! - **OpenAI** (default): any OpenAI-compatible `/chat/completions` endpoint
//! - **Ollama** (`ollama` feature): local inference
//! - **Replicate**: text-to-image predictions for thumbnails
//!
//! ## Usage
//!
//! ```rust,ignore
//! use studio_runtime::{OpenAiConfig, OpenAiProvider};
//! use studio_core::PromptEnhancer;
//!
//! let provider = OpenAiProvider::new(OpenAiConfig::new("sk-..."))?;
//! let enhancer = PromptEnhancer::new(Arc::new(provider), "gpt-4.1-nano");
//! ```

pub mod openai;
pub mod replicate;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use replicate::{ReplicateConfig, ReplicateGenerator};

pub use studio_core::{CoreError, LlmProvider, Result};

/// Map a transport failure onto the provider error taxonomy
pub(crate) fn transport_error(err: &reqwest::Error) -> CoreError {
    if err.is_connect() || err.is_timeout() {
        CoreError::ProviderUnavailable(err.to_string())
    } else {
        CoreError::Provider(err.to_string())
    }
}

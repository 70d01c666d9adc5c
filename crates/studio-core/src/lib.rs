//! # studio-core
//!
//! Completion-provider abstraction and the prompt enhancer used by the
//! thumbnail studio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  PromptEnhancer                       │
//! │  ┌──────────────────┐      ┌──────────────────────┐  │
//! │  │ fixed system     │─────▶│  LlmProvider         │  │
//! │  │ instruction      │      │  (OpenAI, Ollama...) │  │
//! │  └──────────────────┘      └──────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets the server swap between a hosted completion
//! API and a local model, or a fake in tests, without touching handler code.

pub mod enhancer;
pub mod error;
pub mod image;
pub mod message;
pub mod provider;

pub use enhancer::{EnhancedPrompt, INVALID_PROMPT, MAX_PROMPT_CHARS, PromptEnhancer};
pub use error::{CoreError, Result};
pub use image::{GeneratedImage, ImageGenerator, ImageRequest};
pub use message::{Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};

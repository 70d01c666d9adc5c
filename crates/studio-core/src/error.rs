//! Error Types

use thiserror::Error;

/// Result type alias for completion operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Completion and prompt errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller supplied an unusable prompt
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Upstream provider returned an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider answered but produced no usable text
    #[error("Provider returned an empty completion")]
    EmptyCompletion,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether the fault lies with the upstream provider rather than the caller
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderUnavailable(_) | Self::EmptyCompletion
        )
    }

    /// Client-safe message. Provider detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPrompt(msg) => msg.clone(),
            Self::Provider(_) | Self::ProviderUnavailable(_) => "OpenAI API error".into(),
            Self::EmptyCompletion => "No enhanced prompt returned.".into(),
            _ => "Internal server error.".into(),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing-related errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Plan name not in the catalog
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Not enough credits for a paid action
    #[error("Insufficient credits: need {required}, have {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// Credit amounts must be positive
    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data store error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BillingError {
    /// Whether a webhook delivery that failed with this error is worth retrying
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Stripe(_) | Self::Storage(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::InvalidPlan(_) => "Invalid plan",
            Self::Stripe(_) => "Failed to create checkout session.",
            Self::WebhookSignature(_) => "Invalid signature",
            Self::WebhookParse(_) => "Malformed webhook payload",
            Self::InsufficientCredits { .. } => {
                "You do not have enough credits to generate a thumbnail."
            }
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

//! Payment Provider Abstraction
//!
//! The two calls the billing flow makes against the payment provider. Handlers
//! receive an `Arc<dyn BillingProvider>` so tests can substitute a fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::plan::Plan;

/// Parameters for a hosted subscription checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Internal user id, echoed back in the webhook through session metadata
    pub user_id: String,

    pub plan: Plan,

    pub price_id: String,

    #[serde(default)]
    pub customer_email: Option<String>,

    pub success_url: String,

    pub cancel_url: String,
}

/// Hosted checkout session created by the provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,

    /// URL to redirect the user to
    pub url: String,
}

/// Provider-side view of a subscription, fetched by id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,

    pub customer_id: Option<String>,

    /// Price of the first subscription item
    pub price_id: Option<String>,

    pub status: String,
}

/// Whether `id` has the shape of a Stripe subscription id (`sub_` plus
/// ASCII alphanumerics). Anything else is never sent to the provider.
pub fn is_subscription_id(id: &str) -> bool {
    id.strip_prefix("sub_")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot>;
}

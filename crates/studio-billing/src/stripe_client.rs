//! Stripe Implementation of `BillingProvider`
//!
//! Both calls go through `async-stripe`. The price paid is read from the first
//! subscription item, `items.data[0].price.id`.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, Subscription, SubscriptionId,
};

use crate::error::{BillingError, Result};
use crate::provider::{
    BillingProvider, CheckoutRequest, CheckoutSession, SubscriptionSnapshot, is_subscription_id,
};

/// Stripe client wrapper
pub struct StripeBilling {
    client: Client,
}

impl StripeBilling {
    pub fn new(secret_key: &str) -> Result<Self> {
        if secret_key.trim().is_empty() {
            return Err(BillingError::Config("Stripe secret key is empty".into()));
        }
        Ok(Self {
            client: Client::new(secret_key),
        })
    }

    #[cfg(test)]
    fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn parse_subscription_id(subscription_id: &str) -> Result<SubscriptionId> {
    if !is_subscription_id(subscription_id) {
        return Err(BillingError::WebhookParse(format!(
            "invalid subscription id {subscription_id:?}"
        )));
    }
    subscription_id
        .parse()
        .map_err(|e| BillingError::WebhookParse(format!("invalid subscription id: {e}")))
}

impl From<&Subscription> for SubscriptionSnapshot {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            customer_id: Some(sub.customer.id().to_string()).filter(|id| !id.is_empty()),
            price_id: sub
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string()),
            status: sub.status.as_str().to_string(),
        }
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.client_reference_id = Some(&request.user_id);
        params.customer_email = request.customer_email.as_deref();

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), request.user_id.clone());
        metadata.insert("plan".to_string(), request.plan.as_str().to_string());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| BillingError::Stripe(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| BillingError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(
            session_id = %session.id,
            user_id = %request.user_id,
            plan = %request.plan,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot> {
        let id = parse_subscription_id(subscription_id)?;

        let subscription = Subscription::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| BillingError::Stripe(e.to_string()))?;

        Ok(SubscriptionSnapshot::from(&subscription))
    }
}

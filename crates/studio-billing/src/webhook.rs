//! Stripe Webhook Reconciliation
//!
//! Turns a signed `checkout.session.completed` delivery into durable
//! subscription and credit state, at most once per event id.
//!
//! Order of operations:
//! 1. verify the signature over the raw body, before any parsing
//! 2. parse the event envelope
//! 3. skip event ids that were already applied
//! 4. look up the subscription to learn the price actually paid
//! 5. apply event record, subscription row and credit grant as one unit

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{BillingError, Result};
use crate::plan::{Plan, PlanCatalog};
use crate::provider::{BillingProvider, SubscriptionSnapshot, is_subscription_id};
use crate::signature::SignatureVerifier;
use crate::store::{BillingStore, CheckoutGrant, GrantOutcome, SubscriptionRecord};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Status recorded when the subscription could not be looked up
pub const DEFAULT_SUBSCRIPTION_STATUS: &str = "active";

/// Top-level Stripe event
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The fields of a Checkout Session this service reads
#[derive(Debug, Default, Deserialize)]
pub struct CompletedCheckout {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub client_reference_id: Option<String>,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub subscription: Option<String>,
}

impl CompletedCheckout {
    /// Metadata `user_id`, falling back to `client_reference_id`
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn metadata_plan(&self) -> Option<Plan> {
        self.metadata.get("plan").and_then(|p| Plan::parse(p))
    }
}

/// What a delivery did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Granted {
        user_id: String,
        plan: Plan,
        credits: i64,
        balance: i64,
    },
    /// Event id already applied
    Duplicate { event_id: String },
    /// Acknowledged without effect; retrying cannot help
    Unattributed { event_id: String, reason: String },
    /// Event type this service does not handle
    Ignored { event_type: String },
}

struct ResolvedPlan {
    plan: Plan,
    snapshot: Option<SubscriptionSnapshot>,
}

pub struct WebhookProcessor {
    verifier: SignatureVerifier,
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn BillingStore>,
    catalog: Arc<PlanCatalog>,
}

impl WebhookProcessor {
    pub fn new(
        verifier: SignatureVerifier,
        provider: Arc<dyn BillingProvider>,
        store: Arc<dyn BillingStore>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            verifier,
            provider,
            store,
            catalog,
        }
    }

    /// Verify and apply one delivery.
    ///
    /// Signature and parse failures surface as `WebhookSignature` /
    /// `WebhookParse` and touch nothing. Store and provider failures surface
    /// as retryable errors.
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let signature = signature
            .ok_or_else(|| BillingError::WebhookSignature("missing Stripe-Signature header".into()))?;
        self.verifier.verify(payload, signature)?;

        let event: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookParse(e.to_string()))?;

        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing Stripe webhook");

        if event.event_type != CHECKOUT_COMPLETED {
            tracing::debug!(event_type = %event.event_type, "Unhandled webhook event type");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        self.handle_checkout_completed(event).await
    }

    async fn handle_checkout_completed(&self, event: EventEnvelope) -> Result<WebhookOutcome> {
        if self.store.event_processed(&event.id).await? {
            tracing::info!(event_id = %event.id, "Duplicate webhook delivery, skipping");
            return Ok(WebhookOutcome::Duplicate { event_id: event.id });
        }

        let session: CompletedCheckout = serde_json::from_value(event.data.object)
            .map_err(|e| BillingError::WebhookParse(e.to_string()))?;

        let Some(user_id) = session.user_id().map(str::to_string) else {
            tracing::error!(event_id = %event.id, session_id = ?session.id, "Checkout completed without user_id metadata");
            return Ok(WebhookOutcome::Unattributed {
                event_id: event.id,
                reason: "missing user_id".into(),
            });
        };

        let Some(resolved) = self.resolve_plan(&session).await? else {
            tracing::error!(event_id = %event.id, %user_id, "Could not resolve plan for completed checkout");
            return Ok(WebhookOutcome::Unattributed {
                event_id: event.id,
                reason: "unresolvable plan".into(),
            });
        };

        let plan = resolved.plan;
        let credits = self.catalog.credits(plan);
        let now = Utc::now();
        let snapshot = resolved.snapshot;

        let subscription = SubscriptionRecord {
            user_id: user_id.clone(),
            plan,
            stripe_customer_id: session
                .customer
                .clone()
                .or_else(|| snapshot.as_ref().and_then(|s| s.customer_id.clone())),
            stripe_subscription_id: session.subscription.clone(),
            price_id: snapshot
                .as_ref()
                .and_then(|s| s.price_id.clone())
                .or_else(|| Some(self.catalog.price_id(plan).to_string())),
            status: snapshot
                .as_ref()
                .map(|s| s.status.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SUBSCRIPTION_STATUS)
                .to_string(),
            created_at: now,
        };

        let grant = CheckoutGrant {
            event_id: event.id.clone(),
            event_type: event.event_type,
            user_id: user_id.clone(),
            plan,
            credits,
            subscription,
            granted_at: now,
        };

        match self.store.apply_checkout(&grant).await? {
            GrantOutcome::Applied { balance } => {
                tracing::info!(event_id = %event.id, %user_id, plan = %plan, credits, balance, "Credits granted");
                Ok(WebhookOutcome::Granted {
                    user_id,
                    plan,
                    credits,
                    balance,
                })
            }
            GrantOutcome::AlreadyProcessed => {
                tracing::info!(event_id = %event.id, "Event applied concurrently, skipping");
                Ok(WebhookOutcome::Duplicate { event_id: event.id })
            }
        }
    }

    /// The price on the subscription wins over the metadata label; metadata is
    /// only used when the session carries no subscription.
    async fn resolve_plan(&self, session: &CompletedCheckout) -> Result<Option<ResolvedPlan>> {
        let metadata_plan = session.metadata_plan();

        let Some(subscription_id) = session.subscription.as_deref() else {
            return Ok(metadata_plan.map(|plan| ResolvedPlan {
                plan,
                snapshot: None,
            }));
        };

        if !is_subscription_id(subscription_id) {
            tracing::error!(subscription_id, "Checkout carries a malformed subscription id");
            return Ok(None);
        }

        let snapshot = self
            .provider
            .retrieve_subscription(subscription_id)
            .await
            .inspect_err(|e| {
                tracing::error!(subscription_id, error = %e, "Subscription lookup failed");
            })?;

        let Some(price_id) = snapshot.price_id.as_deref() else {
            tracing::error!(subscription_id, "Subscription has no price");
            return Ok(None);
        };

        let Some(plan) = self.catalog.plan_for_price(price_id) else {
            tracing::error!(subscription_id, price_id, "Subscription price is not in the plan catalog");
            return Ok(None);
        };

        if let Some(label) = metadata_plan.filter(|label| *label != plan) {
            tracing::warn!(
                subscription_id,
                metadata_plan = %label,
                price_plan = %plan,
                "Metadata plan disagrees with the subscribed price, using the price"
            );
        }

        Ok(Some(ResolvedPlan {
            plan,
            snapshot: Some(snapshot),
        }))
    }
}

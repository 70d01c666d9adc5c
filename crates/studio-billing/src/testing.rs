//! Shared fixtures for the crate's unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{BillingError, Result};
use crate::plan::{Plan, PlanCatalog, PlanEntry};
use crate::provider::{BillingProvider, CheckoutRequest, CheckoutSession, SubscriptionSnapshot};
use crate::store::{CheckoutGrant, SubscriptionRecord};

pub fn sample_catalog() -> PlanCatalog {
    PlanCatalog::new(vec![
        PlanEntry::new(Plan::Beginner, "price_beginner"),
        PlanEntry::new(Plan::Pro, "price_pro"),
        PlanEntry::new(Plan::Enterprise, "price_enterprise"),
    ])
    .unwrap()
}

pub fn checkout_grant(event_id: &str, user_id: &str, plan: Plan, credits: i64) -> CheckoutGrant {
    let now = Utc::now();
    CheckoutGrant {
        event_id: event_id.to_string(),
        event_type: "checkout.session.completed".to_string(),
        user_id: user_id.to_string(),
        plan,
        credits,
        subscription: SubscriptionRecord {
            user_id: user_id.to_string(),
            plan,
            stripe_customer_id: Some("cus_1".into()),
            stripe_subscription_id: Some("sub_1".into()),
            price_id: Some(format!("price_{plan}")),
            status: "active".into(),
            created_at: now,
        },
        granted_at: now,
    }
}

/// Records every call; subscription lookups answer with `snapshot`
#[derive(Default)]
pub struct FakeBillingProvider {
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub lookups: Mutex<Vec<String>>,
    pub snapshot: Option<SubscriptionSnapshot>,
    pub fail: bool,
}

impl FakeBillingProvider {
    pub fn with_snapshot(price_id: &str, status: &str) -> Self {
        Self {
            snapshot: Some(SubscriptionSnapshot {
                id: "sub_1".into(),
                customer_id: Some("cus_1".into()),
                price_id: Some(price_id.into()),
                status: status.into(),
            }),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn checkout_calls(&self) -> usize {
        self.checkouts.lock().unwrap().len()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl BillingProvider for FakeBillingProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.checkouts.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(BillingError::Stripe("card_declined".into()));
        }
        Ok(CheckoutSession {
            id: format!("cs_test_{}", request.plan),
            url: format!("https://checkout.stripe.test/{}", request.plan),
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionSnapshot> {
        self.lookups.lock().unwrap().push(subscription_id.to_string());
        if self.fail {
            return Err(BillingError::Stripe("api unavailable".into()));
        }
        self.snapshot
            .clone()
            .ok_or_else(|| BillingError::Stripe(format!("no such subscription: {subscription_id}")))
    }
}

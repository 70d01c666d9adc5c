//! Checkout Initiation
//!
//! Turns a plan name chosen by an authenticated user into a hosted
//! subscription checkout URL. The plan is validated against the catalog
//! before anything reaches the payment provider.

use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::plan::{Plan, PlanCatalog};
use crate::provider::{BillingProvider, CheckoutRequest, CheckoutSession};

/// Placeholder the provider substitutes with the real session id on redirect
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
    catalog: Arc<PlanCatalog>,
    public_base_url: String,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        catalog: Arc<PlanCatalog>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            catalog,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!(
            "{}/stripe/success?session_id={SESSION_ID_PLACEHOLDER}",
            self.public_base_url
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/stripe/cancel", self.public_base_url)
    }

    /// Build the provider request for `plan` without sending it
    pub fn request_for(&self, user_id: &str, email: Option<&str>, plan: Plan) -> CheckoutRequest {
        CheckoutRequest {
            user_id: user_id.to_string(),
            plan,
            price_id: self.catalog.price_id(plan).to_string(),
            customer_email: email.map(str::to_string),
            success_url: self.success_url(),
            cancel_url: self.cancel_url(),
        }
    }

    /// Start a subscription checkout.
    ///
    /// `plan` is the raw value from the request body. Anything that is not a
    /// catalog plan fails with `InvalidPlan` and the provider is never called.
    pub async fn start(
        &self,
        user_id: &str,
        email: Option<&str>,
        plan: Option<&str>,
    ) -> Result<CheckoutSession> {
        let raw = plan.unwrap_or_default();
        let plan = Plan::parse(raw).ok_or_else(|| BillingError::InvalidPlan(raw.to_string()))?;

        let request = self.request_for(user_id, email, plan);
        tracing::info!(user_id, plan = %plan, price_id = %request.price_id, "Creating checkout session");

        let session = self.provider.create_checkout_session(&request).await.inspect_err(|e| {
            tracing::error!(user_id, plan = %plan, error = %e, "Checkout session creation failed");
        })?;

        tracing::debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }
}

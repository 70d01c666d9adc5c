//! # studio-billing
//!
//! Subscription checkout, webhook reconciliation and the credit ledger for
//! thumbnail-studio.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  plan   ┌──────────────┐  session   ┌─────────────────┐
//! │  Client  │────────▶│ CheckoutSvc  │───────────▶│ Stripe Checkout │
//! └──────────┘         └──────────────┘            └────────┬────────┘
//!                                                           │ webhook
//!                      ┌──────────────┐  grant     ┌────────▼────────┐
//!                      │ BillingStore │◀───────────│ WebhookProcessor│
//!                      └──────────────┘            └─────────────────┘
//! ```
//!
//! Plans, price ids and credit grants live in one [`PlanCatalog`] built from
//! configuration. Every credit mutation is a single atomic store operation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use studio_billing::{CheckoutService, PlanCatalog, PlanEntry, Plan, StripeBilling};
//!
//! let catalog = Arc::new(PlanCatalog::new(vec![
//!     PlanEntry::new(Plan::Beginner, "price_123"),
//!     PlanEntry::new(Plan::Pro, "price_456"),
//!     PlanEntry::new(Plan::Enterprise, "price_789"),
//! ])?);
//! let checkout = CheckoutService::new(
//!     Arc::new(StripeBilling::new("sk_test_xxx")?),
//!     catalog,
//!     "https://studio.example.com",
//! );
//!
//! let session = checkout.start("user_2abc", Some("me@example.com"), Some("pro")).await?;
//! // Redirect user to: session.url
//! ```

mod checkout;
mod error;
mod ledger;
mod plan;
mod provider;
mod signature;
mod store;
mod stripe_client;
mod webhook;

#[cfg(test)]
mod testing;

pub use checkout::{CheckoutService, SESSION_ID_PLACEHOLDER};
pub use error::{BillingError, Result};
pub use ledger::{
    CreditGate, CreditView, DEFAULT_COST_PER_GENERATION, INSUFFICIENT_CREDITS_WARNING,
};
pub use plan::{Plan, PlanCatalog, PlanEntry};
pub use provider::{BillingProvider, CheckoutRequest, CheckoutSession, SubscriptionSnapshot};
pub use signature::{DEFAULT_TOLERANCE_SECS, SignatureVerifier};
pub use store::{
    BillingStore, CheckoutGrant, CreditBalance, DebitOutcome, GrantOutcome, MemoryBillingStore,
    NewThumbnail, SubscriptionRecord, SupabaseConfig, SupabaseStore, ThumbnailEntry, UserRecord,
};
pub use stripe_client::StripeBilling;
pub use webhook::{
    CHECKOUT_COMPLETED, CompletedCheckout, DEFAULT_SUBSCRIPTION_STATUS, EventEnvelope,
    WebhookOutcome, WebhookProcessor,
};

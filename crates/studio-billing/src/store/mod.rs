//! Billing Data Store
//!
//! Row types and the storage trait behind every credit and subscription
//! mutation. Each mutating method is a single atomic unit in every
//! implementation: the in-memory store holds one lock for the whole
//! operation, the Supabase store calls one Postgres function.

mod memory;
mod supabase;

pub use memory::MemoryBillingStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::plan::Plan;

/// Identity-provider user as mirrored locally
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-user credit balance (`user_credits`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: String,
    pub credits: i64,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub subscribed_at: Option<DateTime<Utc>>,
}

/// One subscription per user (`subscriptions`, unique on `user_id`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub plan: Plan,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Everything a completed checkout event writes, applied as one unit
#[derive(Clone, Debug)]
pub struct CheckoutGrant {
    /// Payment-provider event id; the idempotency key
    pub event_id: String,
    pub event_type: String,
    pub user_id: String,
    pub plan: Plan,
    pub credits: i64,
    pub subscription: SubscriptionRecord,
    pub granted_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// First delivery of this event; `balance` is the new total
    Applied { balance: i64 },
    /// Event id seen before; nothing changed
    AlreadyProcessed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining: i64 },
    Insufficient { available: i64 },
}

/// Append-only generation history (`thumbnail_history`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailEntry {
    pub id: Uuid,
    pub user_id: String,
    pub prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewThumbnail {
    pub user_id: String,
    pub prompt: String,
    pub image_url: String,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Create the user and their starting balance if absent. Never resets an
    /// existing balance.
    async fn ensure_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        starting_credits: i64,
    ) -> Result<CreditBalance>;

    async fn credit_balance(&self, user_id: &str) -> Result<Option<CreditBalance>>;

    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>>;

    async fn event_processed(&self, event_id: &str) -> Result<bool>;

    /// Record the event, replace the subscription row and add the grant.
    async fn apply_checkout(&self, grant: &CheckoutGrant) -> Result<GrantOutcome>;

    /// Subtract `amount` only if the balance covers it
    async fn debit_credits(&self, user_id: &str, amount: i64) -> Result<DebitOutcome>;

    /// Add `amount` back; returns the new balance
    async fn refund_credits(&self, user_id: &str, amount: i64) -> Result<i64>;

    async fn record_thumbnail(&self, entry: NewThumbnail) -> Result<ThumbnailEntry>;

    /// Newest first
    async fn thumbnail_history(&self, user_id: &str, limit: usize) -> Result<Vec<ThumbnailEntry>>;
}

//! In-memory `BillingStore` for development and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BillingStore, CheckoutGrant, CreditBalance, DebitOutcome, GrantOutcome, NewThumbnail,
    SubscriptionRecord, ThumbnailEntry, UserRecord,
};
use crate::error::{BillingError, Result};

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    balances: HashMap<String, CreditBalance>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    processed_events: HashSet<String>,
    thumbnails: Vec<ThumbnailEntry>,
}

impl State {
    fn balance_mut(&mut self, user_id: &str) -> &mut CreditBalance {
        self.balances
            .entry(user_id.to_string())
            .or_insert_with(|| CreditBalance {
                user_id: user_id.to_string(),
                credits: 0,
                plan: None,
                subscribed_at: None,
            })
    }
}

/// Single-lock store: every method runs under one mutex, so each mutation is
/// atomic with respect to the others.
#[derive(Default)]
pub struct MemoryBillingStore {
    state: Mutex<State>,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription rows, for assertions
    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    pub async fn user(&self, user_id: &str) -> Option<UserRecord> {
        self.state.lock().await.users.get(user_id).cloned()
    }
}

fn positive(amount: i64) -> Result<i64> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(BillingError::InvalidAmount(amount))
    }
}

#[async_trait]
impl BillingStore for MemoryBillingStore {
    async fn ensure_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        starting_credits: i64,
    ) -> Result<CreditBalance> {
        let mut state = self.state.lock().await;

        let user = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                id: user_id.to_string(),
                email: None,
                created_at: Utc::now(),
            });
        if user.email.is_none() {
            user.email = email.map(str::to_string);
        }

        let balance = state
            .balances
            .entry(user_id.to_string())
            .or_insert_with(|| CreditBalance {
                user_id: user_id.to_string(),
                credits: starting_credits.max(0),
                plan: None,
                subscribed_at: None,
            });
        Ok(balance.clone())
    }

    async fn credit_balance(&self, user_id: &str) -> Result<Option<CreditBalance>> {
        Ok(self.state.lock().await.balances.get(user_id).cloned())
    }

    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        Ok(self.state.lock().await.subscriptions.get(user_id).cloned())
    }

    async fn event_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.processed_events.contains(event_id))
    }

    async fn apply_checkout(&self, grant: &CheckoutGrant) -> Result<GrantOutcome> {
        let credits = positive(grant.credits)?;
        let mut state = self.state.lock().await;

        if !state.processed_events.insert(grant.event_id.clone()) {
            return Ok(GrantOutcome::AlreadyProcessed);
        }

        state
            .users
            .entry(grant.user_id.clone())
            .or_insert_with(|| UserRecord {
                id: grant.user_id.clone(),
                email: None,
                created_at: grant.granted_at,
            });

        state
            .subscriptions
            .insert(grant.user_id.clone(), grant.subscription.clone());

        let balance = state.balance_mut(&grant.user_id);
        balance.credits += credits;
        balance.plan = Some(grant.plan);
        balance.subscribed_at = Some(grant.granted_at);

        Ok(GrantOutcome::Applied {
            balance: balance.credits,
        })
    }

    async fn debit_credits(&self, user_id: &str, amount: i64) -> Result<DebitOutcome> {
        let amount = positive(amount)?;
        let mut state = self.state.lock().await;

        let Some(balance) = state.balances.get_mut(user_id) else {
            return Ok(DebitOutcome::Insufficient { available: 0 });
        };
        if balance.credits < amount {
            return Ok(DebitOutcome::Insufficient {
                available: balance.credits,
            });
        }
        balance.credits -= amount;
        Ok(DebitOutcome::Debited {
            remaining: balance.credits,
        })
    }

    async fn refund_credits(&self, user_id: &str, amount: i64) -> Result<i64> {
        let amount = positive(amount)?;
        let mut state = self.state.lock().await;
        let balance = state.balance_mut(user_id);
        balance.credits += amount;
        Ok(balance.credits)
    }

    async fn record_thumbnail(&self, entry: NewThumbnail) -> Result<ThumbnailEntry> {
        let row = ThumbnailEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            prompt: entry.prompt,
            image_url: entry.image_url,
            created_at: Utc::now(),
        };
        self.state.lock().await.thumbnails.push(row.clone());
        Ok(row)
    }

    async fn thumbnail_history(&self, user_id: &str, limit: usize) -> Result<Vec<ThumbnailEntry>> {
        let state = self.state.lock().await;
        // insertion order is chronological
        Ok(state
            .thumbnails
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

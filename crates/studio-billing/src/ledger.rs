//! Credit Ledger
//!
//! Read-side view of a user's balance plus the debit/refund pair around a
//! paid action. `assess` is advisory; `charge` is the authoritative check
//! because the store only debits when the balance covers the cost.

use serde::Serialize;

use crate::error::{BillingError, Result};
use crate::plan::Plan;
use crate::store::{BillingStore, CreditBalance, DebitOutcome};

pub const DEFAULT_COST_PER_GENERATION: i64 = 20;

pub const INSUFFICIENT_CREDITS_WARNING: &str =
    "You do not have enough credits to generate a thumbnail.";

/// Balance as shown to the client
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditView {
    pub credits: i64,
    pub plan: Option<Plan>,
    pub cost_per_generation: i64,
    pub can_generate: bool,
    pub warning: Option<&'static str>,
}

#[derive(Clone, Copy, Debug)]
pub struct CreditGate {
    cost: i64,
}

impl Default for CreditGate {
    fn default() -> Self {
        Self::new(DEFAULT_COST_PER_GENERATION)
    }
}

impl CreditGate {
    pub const fn new(cost: i64) -> Self {
        Self { cost }
    }

    pub const fn cost(&self) -> i64 {
        self.cost
    }

    /// A missing balance row counts as zero credits
    pub fn assess(&self, balance: Option<&CreditBalance>) -> CreditView {
        let credits = balance.map_or(0, |b| b.credits);
        let can_generate = credits >= self.cost;
        CreditView {
            credits,
            plan: balance.and_then(|b| b.plan),
            cost_per_generation: self.cost,
            can_generate,
            warning: (!can_generate).then_some(INSUFFICIENT_CREDITS_WARNING),
        }
    }

    /// Debit one action's cost; returns the remaining balance
    pub async fn charge(&self, store: &dyn BillingStore, user_id: &str) -> Result<i64> {
        match store.debit_credits(user_id, self.cost).await? {
            DebitOutcome::Debited { remaining } => {
                tracing::debug!(user_id, cost = self.cost, remaining, "Credits debited");
                Ok(remaining)
            }
            DebitOutcome::Insufficient { available } => {
                tracing::info!(user_id, cost = self.cost, available, "Insufficient credits");
                Err(BillingError::InsufficientCredits {
                    required: self.cost,
                    available,
                })
            }
        }
    }

    /// Return a charge after the paid action failed
    pub async fn refund(&self, store: &dyn BillingStore, user_id: &str) -> Result<i64> {
        let balance = store.refund_credits(user_id, self.cost).await?;
        tracing::info!(user_id, cost = self.cost, balance, "Credits refunded");
        Ok(balance)
    }
}

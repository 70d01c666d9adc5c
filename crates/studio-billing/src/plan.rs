//! Plans and the Price Catalog
//!
//! The single place where subscription plans map to Stripe price ids and to
//! the credits granted per successful payment.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Beginner,
    Pro,
    Enterprise,
}

impl Plan {
    pub const ALL: [Self; 3] = [Self::Beginner, Self::Pro, Self::Enterprise];

    const fn index(self) -> usize {
        match self {
            Self::Beginner => 0,
            Self::Pro => 1,
            Self::Enterprise => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Case-insensitive lookup; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|plan| plan.as_str().eq_ignore_ascii_case(name))
    }

    /// Credits granted per payment when configuration does not override them
    pub const fn default_credits(self) -> i64 {
        match self {
            Self::Beginner => 500,
            Self::Pro => 1_000,
            Self::Enterprise => 10_000,
        }
    }
}

impl FromStr for Plan {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| BillingError::InvalidPlan(s.to_string()))
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    pub plan: Plan,
    pub price_id: String,
    pub credits: i64,
}

impl PlanEntry {
    pub fn new(plan: Plan, price_id: impl Into<String>) -> Self {
        Self {
            plan,
            price_id: price_id.into(),
            credits: plan.default_credits(),
        }
    }

    #[must_use]
    pub const fn with_credits(mut self, credits: i64) -> Self {
        self.credits = credits;
        self
    }
}

/// Validated plan → price → credits table
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    entries: Vec<PlanEntry>,
}

impl PlanCatalog {
    /// Build a catalog; every plan must appear exactly once with a unique,
    /// non-empty price id and a positive grant.
    pub fn new(mut entries: Vec<PlanEntry>) -> Result<Self> {
        let mut prices = HashSet::new();
        for plan in Plan::ALL {
            let count = entries.iter().filter(|e| e.plan == plan).count();
            if count != 1 {
                return Err(BillingError::Config(format!(
                    "plan {plan} must be configured exactly once (found {count})"
                )));
            }
        }
        for entry in &entries {
            if entry.price_id.trim().is_empty() {
                return Err(BillingError::Config(format!("plan {} has no price id", entry.plan)));
            }
            if entry.credits <= 0 {
                return Err(BillingError::Config(format!(
                    "plan {} must grant a positive number of credits",
                    entry.plan
                )));
            }
            if !prices.insert(entry.price_id.as_str()) {
                return Err(BillingError::Config(format!(
                    "price id {} is assigned to more than one plan",
                    entry.price_id
                )));
            }
        }
        entries.sort_by_key(|e| e.plan.index());
        Ok(Self { entries })
    }

    pub fn entry(&self, plan: Plan) -> &PlanEntry {
        // sorted by plan in `new`, one entry per plan
        &self.entries[plan.index()]
    }

    pub fn price_id(&self, plan: Plan) -> &str {
        &self.entry(plan).price_id
    }

    pub fn credits(&self, plan: Plan) -> i64 {
        self.entry(plan).credits
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.entries
            .iter()
            .find(|e| e.price_id == price_id)
            .map(|e| e.plan)
    }
}

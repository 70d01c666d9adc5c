//! Supabase (PostgREST) `BillingStore`
//!
//! Reads go through table endpoints; every mutation is a Postgres function
//! invoked over `/rest/v1/rpc/*` so that it executes as one statement. The
//! functions are defined in `migrations/0001_billing.sql`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use super::{
    BillingStore, CheckoutGrant, CreditBalance, DebitOutcome, GrantOutcome, NewThumbnail,
    SubscriptionRecord, ThumbnailEntry,
};
use crate::error::{BillingError, Result};

#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role key; bypasses row-level security, server-side only
    pub service_role_key: String,

    pub timeout_secs: u64,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
            timeout_secs: 10,
        }
    }
}

pub struct SupabaseStore {
    client: reqwest::Client,
    config: SupabaseConfig,
}

#[derive(Deserialize)]
struct GrantResult {
    applied: bool,
    credits: i64,
}

#[derive(Deserialize)]
struct DebitResult {
    debited: bool,
    credits: i64,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        if config.url.is_empty() || config.service_role_key.is_empty() {
            return Err(BillingError::Config("Supabase URL and service key are required".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BillingError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{path}", self.config.url))
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(%status, detail = %detail, operation = what, "Supabase request failed");
            return Err(BillingError::Storage(format!("{what} failed with HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| BillingError::Storage(format!("{what} returned malformed data: {e}")))
    }

    async fn rpc<T: DeserializeOwned>(&self, function: &str, params: serde_json::Value) -> Result<T> {
        let response = self
            .request(Method::POST, &format!("rpc/{function}"))
            .json(&params)
            .send()
            .await?;
        Self::decode(response, function).await
    }

    async fn select_one<T: DeserializeOwned>(&self, table: &str, user_id: &str) -> Result<Option<T>> {
        let response = self
            .request(Method::GET, table)
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".into())])
            .send()
            .await?;
        let rows: Vec<T> = Self::decode(response, table).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl BillingStore for SupabaseStore {
    async fn ensure_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        starting_credits: i64,
    ) -> Result<CreditBalance> {
        self.rpc(
            "ensure_user",
            json!({
                "p_user_id": user_id,
                "p_email": email,
                "p_starting_credits": starting_credits,
            }),
        )
        .await
    }

    async fn credit_balance(&self, user_id: &str) -> Result<Option<CreditBalance>> {
        self.select_one("user_credits", user_id).await
    }

    async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        self.select_one("subscriptions", user_id).await
    }

    async fn event_processed(&self, event_id: &str) -> Result<bool> {
        let response = self
            .request(Method::GET, "processed_webhook_events")
            .query(&[("event_id", format!("eq.{event_id}")), ("select", "event_id".into())])
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::decode(response, "processed_webhook_events").await?;
        Ok(!rows.is_empty())
    }

    async fn apply_checkout(&self, grant: &CheckoutGrant) -> Result<GrantOutcome> {
        if grant.credits <= 0 {
            return Err(BillingError::InvalidAmount(grant.credits));
        }
        let sub = &grant.subscription;
        let result: GrantResult = self
            .rpc(
                "apply_checkout_grant",
                json!({
                    "p_event_id": grant.event_id,
                    "p_event_type": grant.event_type,
                    "p_user_id": grant.user_id,
                    "p_plan": grant.plan,
                    "p_credits": grant.credits,
                    "p_customer_id": sub.stripe_customer_id,
                    "p_subscription_id": sub.stripe_subscription_id,
                    "p_price_id": sub.price_id,
                    "p_status": sub.status,
                    "p_granted_at": grant.granted_at,
                }),
            )
            .await?;

        Ok(if result.applied {
            GrantOutcome::Applied {
                balance: result.credits,
            }
        } else {
            GrantOutcome::AlreadyProcessed
        })
    }

    async fn debit_credits(&self, user_id: &str, amount: i64) -> Result<DebitOutcome> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(amount));
        }
        let result: DebitResult = self
            .rpc("debit_credits", json!({ "p_user_id": user_id, "p_amount": amount }))
            .await?;
        Ok(if result.debited {
            DebitOutcome::Debited {
                remaining: result.credits,
            }
        } else {
            DebitOutcome::Insufficient {
                available: result.credits,
            }
        })
    }

    async fn refund_credits(&self, user_id: &str, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(amount));
        }
        self.rpc("refund_credits", json!({ "p_user_id": user_id, "p_amount": amount }))
            .await
    }

    async fn record_thumbnail(&self, entry: NewThumbnail) -> Result<ThumbnailEntry> {
        let response = self
            .request(Method::POST, "thumbnail_history")
            .header("Prefer", "return=representation")
            .json(&entry)
            .send()
            .await?;
        let rows: Vec<ThumbnailEntry> = Self::decode(response, "thumbnail_history").await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BillingError::Storage("insert returned no row".into()))
    }

    async fn thumbnail_history(&self, user_id: &str, limit: usize) -> Result<Vec<ThumbnailEntry>> {
        let response = self
            .request(Method::GET, "thumbnail_history")
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "*".into()),
                ("order", "created_at.desc".into()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        Self::decode(response, "thumbnail_history").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;
    use crate::testing::checkout_grant;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> SupabaseStore {
        SupabaseStore::new(SupabaseConfig::new(server.uri(), "service-key")).unwrap()
    }

    #[tokio::test]
    async fn test_credit_balance_reads_first_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_credits"))
            .and(query_param("user_id", "eq.user_1"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "user_id": "user_1",
                "credits": 620,
                "plan": "beginner",
                "subscribed_at": "2025-07-18T09:30:00.123456+00:00"
            }])))
            .mount(&server)
            .await;

        let balance = store_for(&server).credit_balance("user_1").await.unwrap().unwrap();
        assert_eq!(balance.credits, 620);
        assert_eq!(balance.plan, Some(Plan::Beginner));
        assert!(balance.subscribed_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_row_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(store_for(&server).subscription("user_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_checkout_calls_single_rpc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/apply_checkout_grant"))
            .and(body_partial_json(json!({
                "p_event_id": "evt_1",
                "p_user_id": "user_1",
                "p_plan": "beginner",
                "p_credits": 500,
                "p_status": "active"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applied": true, "credits": 600})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = store_for(&server)
            .apply_checkout(&checkout_grant("evt_1", "user_1", Plan::Beginner, 500))
            .await
            .unwrap();
        assert_eq!(outcome, GrantOutcome::Applied { balance: 600 });
    }

    #[tokio::test]
    async fn test_apply_checkout_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/apply_checkout_grant"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applied": false, "credits": 600})))
            .mount(&server)
            .await;

        let outcome = store_for(&server)
            .apply_checkout(&checkout_grant("evt_1", "user_1", Plan::Beginner, 500))
            .await
            .unwrap();
        assert_eq!(outcome, GrantOutcome::AlreadyProcessed);
    }

    #[tokio::test]
    async fn test_debit_insufficient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/debit_credits"))
            .and(body_partial_json(json!({"p_user_id": "user_1", "p_amount": 20})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"debited": false, "credits": 15})))
            .mount(&server)
            .await;

        assert_eq!(
            store_for(&server).debit_credits("user_1", 20).await.unwrap(),
            DebitOutcome::Insufficient { available: 15 }
        );
    }

    #[tokio::test]
    async fn test_http_error_maps_to_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("db down"))
            .mount(&server)
            .await;

        let err = store_for(&server).refund_credits("user_1", 20).await.unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_history_query_is_ordered_and_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/thumbnail_history"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "6f1c2a70-2f39-4a5e-8a0a-0c2b8e8f6d11",
                "user_id": "user_1",
                "prompt": "cat",
                "image_url": "https://img/1.webp",
                "created_at": "2025-07-18T09:30:00+00:00"
            }])))
            .mount(&server)
            .await;

        let history = store_for(&server).thumbnail_history("user_1", 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].image_url, "https://img/1.webp");
    }
}

//! Router
//!
//! Every route answers unsupported methods with a JSON 405.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, enhance_prompt, generate_thumbnail, get_credits, get_subscription,
    health_check, list_thumbnails, method_not_allowed, stripe_webhook, sync_user, test_token,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router: Router<AppState> = Router::new()
        // Health
        .route("/health", get(health_check).fallback(method_not_allowed))
        // Billing
        .route("/api/checkout", post(create_checkout).fallback(method_not_allowed))
        .route("/api/webhooks/stripe", post(stripe_webhook).fallback(method_not_allowed))
        .route("/api/credits", get(get_credits).fallback(method_not_allowed))
        .route("/api/subscription", get(get_subscription).fallback(method_not_allowed))
        // Users
        .route("/api/users/me", post(sync_user).fallback(method_not_allowed))
        // Generation
        .route("/api/enhance-prompt", post(enhance_prompt).fallback(method_not_allowed))
        .route("/api/generate", post(generate_thumbnail).fallback(method_not_allowed))
        .route("/api/thumbnails", get(list_thumbnails).fallback(method_not_allowed));

    if state.expose_diagnostics {
        router = router.route("/api/test-token", get(test_token).fallback(method_not_allowed));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use chrono::Utc;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use studio_billing::{
        BillingProvider, BillingStore, CheckoutRequest, CheckoutService,
        CheckoutSession, CreditGate, MemoryBillingStore, Plan, PlanCatalog, PlanEntry,
        SignatureVerifier, SubscriptionSnapshot, WebhookProcessor,
    };
    use studio_core::{
        Completion, CoreError, GeneratedImage, GenerationOptions, ImageGenerator, ImageRequest,
        LlmProvider, Message, PromptEnhancer,
    };

    use super::*;
    use crate::auth::SessionVerifier;
    use crate::auth::tests::{TEST_SECRET, token_for};
    use crate::config::SessionKey;

    const WEBHOOK_SECRET: &str = "whsec_router";

    #[derive(Default)]
    struct FakeStripe {
        checkouts: Mutex<Vec<CheckoutRequest>>,
    }

    #[async_trait]
    impl BillingProvider for FakeStripe {
        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> studio_billing::Result<CheckoutSession> {
            self.checkouts.lock().unwrap().push(request.clone());
            Ok(CheckoutSession {
                id: "cs_test".into(),
                url: format!("https://checkout.stripe.test/{}", request.price_id),
            })
        }

        async fn retrieve_subscription(
            &self,
            subscription_id: &str,
        ) -> studio_billing::Result<SubscriptionSnapshot> {
            Ok(SubscriptionSnapshot {
                id: subscription_id.into(),
                customer_id: Some("cus_1".into()),
                price_id: Some("price_beginner".into()),
                status: "active".into(),
            })
        }
    }

    /// Replies with `reply`, or an upstream error when `None`
    struct FakeLlm {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        async fn health_check(&self) -> studio_core::Result<bool> {
            Ok(true)
        }

        async fn complete(
            &self,
            _messages: &[Message],
            options: &GenerationOptions,
        ) -> studio_core::Result<Completion> {
            let content = self
                .reply
                .ok_or_else(|| CoreError::Provider("HTTP 500: upstream exploded".into()))?;
            Ok(Completion {
                content: content.into(),
                model: options.model.clone(),
                usage: None,
            })
        }
    }

    struct FakeImages {
        fail: bool,
    }

    #[async_trait]
    impl ImageGenerator for FakeImages {
        fn name(&self) -> &str {
            "fake-images"
        }

        async fn generate(&self, request: &ImageRequest) -> studio_core::Result<GeneratedImage> {
            if self.fail {
                return Err(CoreError::Provider("prediction failed".into()));
            }
            Ok(GeneratedImage {
                urls: vec![format!("https://img.test/{}.webp", request.aspect_ratio)],
            })
        }
    }

    struct Harness {
        app: Router,
        stripe: Arc<FakeStripe>,
        store: Arc<MemoryBillingStore>,
    }

    struct Options {
        reply: Option<&'static str>,
        images: Option<bool>,
        diagnostics: bool,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                reply: Some("  A bold neon thumbnail  "),
                images: Some(false),
                diagnostics: false,
            }
        }
    }

    fn harness(options: Options) -> Harness {
        let stripe = Arc::new(FakeStripe::default());
        let store = Arc::new(MemoryBillingStore::new());
        let catalog = Arc::new(
            PlanCatalog::new(vec![
                PlanEntry::new(Plan::Beginner, "price_beginner"),
                PlanEntry::new(Plan::Pro, "price_pro"),
                PlanEntry::new(Plan::Enterprise, "price_enterprise"),
            ])
            .unwrap(),
        );

        let images: Option<Arc<dyn ImageGenerator>> = options
            .images
            .map(|fail| Arc::new(FakeImages { fail }) as Arc<dyn ImageGenerator>);

        let state = AppState {
            checkout: Arc::new(CheckoutService::new(
                stripe.clone(),
                catalog.clone(),
                "https://studio.test",
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                SignatureVerifier::new(WEBHOOK_SECRET),
                stripe.clone(),
                store.clone(),
                catalog,
            )),
            store: store.clone(),
            gate: CreditGate::new(20),
            enhancer: Arc::new(PromptEnhancer::new(
                Arc::new(FakeLlm {
                    reply: options.reply,
                }),
                "gpt-4.1-nano",
            )),
            images,
            sessions: Arc::new(
                SessionVerifier::new(&SessionKey::Secret(TEST_SECRET.into()), None).unwrap(),
            ),
            starting_credits: 100,
            expose_diagnostics: options.diagnostics,
            replicate_token: Some(Arc::from("r8_abcdef1234")),
        };

        Harness {
            app: router(state),
            stripe,
            store,
        }
    }

    fn authed(method: &str, uri: &str, user_id: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id, Some("me@test.dev"))))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn anonymous(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn signed_webhook(payload: &Value, secret: &str) -> Request<Body> {
        let raw = payload.to_string();
        let signature = SignatureVerifier::new(secret)
            .signature_header(raw.as_bytes(), Utc::now().timestamp())
            .unwrap();
        Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .header("stripe-signature", signature)
            .body(Body::from(raw))
            .unwrap()
    }

    fn beginner_event(event_id: &str, user_id: &str) -> Value {
        json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "user_id": user_id, "plan": "beginner" }
            }}
        })
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(Options::default());
        let (status, body) = send(&h.app, anonymous("GET", "/health", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["imageGeneration"], true);
    }

    #[tokio::test]
    async fn test_wrong_method_is_json_405() {
        let h = harness(Options::default());
        for (method, uri) in [
            ("GET", "/api/checkout"),
            ("GET", "/api/webhooks/stripe"),
            ("PUT", "/api/enhance-prompt"),
            ("POST", "/api/credits"),
        ] {
            let (status, body) = send(&h.app, anonymous(method, uri, Value::Null)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(body["error"], "Method not allowed");
        }
    }

    #[tokio::test]
    async fn test_checkout_requires_session() {
        let h = harness(Options::default());
        let (status, body) =
            send(&h.app, anonymous("POST", "/api/checkout", json!({"plan": "pro"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert!(h.stripe.checkouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_every_plan_yields_url() {
        let h = harness(Options::default());
        for plan in ["beginner", "pro", "enterprise"] {
            let (status, body) =
                send(&h.app, authed("POST", "/api/checkout", "user_1", json!({"plan": plan}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["url"], format!("https://checkout.stripe.test/price_{plan}"));
        }

        let calls = h.stripe.checkouts.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].user_id, "user_1");
        assert_eq!(calls[0].customer_email.as_deref(), Some("me@test.dev"));
        assert_eq!(
            calls[0].success_url,
            "https://studio.test/stripe/success?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    #[tokio::test]
    async fn test_checkout_invalid_plan_is_400_without_provider_call() {
        let h = harness(Options::default());
        for body in [json!({"plan": "free"}), json!({"plan": 7}), json!({}), Value::Null] {
            let (status, _) = send(&h.app, authed("POST", "/api/checkout", "user_1", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(h.stripe.checkouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let h = harness(Options::default());
        let (status, _) =
            send(&h.app, signed_webhook(&beginner_event("evt_1", "user_1"), "whsec_wrong")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unsigned = anonymous("POST", "/api/webhooks/stripe", beginner_event("evt_1", "user_1"));
        let (status, _) = send(&h.app, unsigned).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(h.store.credit_balance("user_1").await.unwrap().is_none());
        assert!(!h.store.event_processed("evt_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_webhook_grants_once_and_feeds_reads() {
        let h = harness(Options::default());
        let (status, _) = send(&h.app, authed("POST", "/api/users/me", "user_1", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.app, authed("GET", "/api/subscription", "user_1", Value::Null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let event = beginner_event("evt_1", "user_1");
        for _ in 0..2 {
            let (status, body) = send(&h.app, signed_webhook(&event, WEBHOOK_SECRET)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["received"], true);
        }

        let (_, credits) = send(&h.app, authed("GET", "/api/credits", "user_1", Value::Null)).await;
        assert_eq!(credits["credits"], 600);
        assert_eq!(credits["plan"], "beginner");
        assert_eq!(credits["canGenerate"], true);

        let (status, sub) = send(&h.app, authed("GET", "/api/subscription", "user_1", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sub["status"], "active");
        assert_eq!(sub["creditsRemaining"], 600);
        assert_eq!(h.store.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let h = harness(Options::default());
        let event = json!({"id": "evt_9", "type": "customer.created", "data": {"object": {}}});
        let (status, body) = send(&h.app, signed_webhook(&event, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
    }

    #[tokio::test]
    async fn test_enhance_prompt() {
        let h = harness(Options::default());
        let (status, body) =
            send(&h.app, anonymous("POST", "/api/enhance-prompt", json!({"prompt": "a cat"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enhancedPrompt"], "A bold neon thumbnail");

        for bad in [json!({}), json!({"prompt": "   "}), json!({"prompt": 42})] {
            let (status, body) = send(&h.app, anonymous("POST", "/api/enhance-prompt", bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Missing or invalid prompt.");
        }

        let long = "x".repeat(301);
        let (status, _) =
            send(&h.app, anonymous("POST", "/api/enhance-prompt", json!({"prompt": long}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_enhance_prompt_upstream_failures() {
        let h = harness(Options {
            reply: None,
            ..Options::default()
        });
        let (status, body) =
            send(&h.app, anonymous("POST", "/api/enhance-prompt", json!({"prompt": "a cat"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "OpenAI API error");

        let h = harness(Options {
            reply: Some("   "),
            ..Options::default()
        });
        let (status, body) =
            send(&h.app, anonymous("POST", "/api/enhance-prompt", json!({"prompt": "a cat"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "No enhanced prompt returned.");
    }

    #[tokio::test]
    async fn test_diagnostics_opt_in() {
        let h = harness(Options::default());
        let (status, _) = send(&h.app, anonymous("GET", "/api/test-token", Value::Null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let h = harness(Options {
            diagnostics: true,
            ..Options::default()
        });
        let (status, body) = send(&h.app, anonymous("GET", "/api/test-token", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"loaded": true, "tokenLength": 13}));
    }

    #[tokio::test]
    async fn test_credits_gate_warning() {
        let h = harness(Options::default());
        h.store.ensure_user("user_1", None, 15).await.unwrap();

        let (status, body) = send(&h.app, authed("GET", "/api/credits", "user_1", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["credits"], 15);
        assert_eq!(body["costPerGeneration"], 20);
        assert_eq!(body["canGenerate"], false);
        assert_eq!(body["warning"], "You do not have enough credits to generate a thumbnail.");
    }

    #[tokio::test]
    async fn test_generate_debits_and_records_history() {
        let h = harness(Options::default());
        send(&h.app, authed("POST", "/api/users/me", "user_1", Value::Null)).await;

        let (status, body) = send(
            &h.app,
            authed("POST", "/api/generate", "user_1", json!({"prompt": "neon cat", "aspect_ratio": "1:1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"], json!(["https://img.test/1:1.webp"]));
        assert_eq!(body["remainingCredits"], 80);

        let (status, history) =
            send(&h.app, authed("GET", "/api/thumbnails?limit=5", "user_1", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().map(Vec::len), Some(1));
        assert_eq!(history[0]["prompt"], "neon cat");
    }

    #[tokio::test]
    async fn test_generate_insufficient_credits_is_402() {
        let h = harness(Options::default());
        h.store.ensure_user("user_1", None, 15).await.unwrap();

        let (status, body) =
            send(&h.app, authed("POST", "/api/generate", "user_1", json!({"prompt": "cat"}))).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
        assert_eq!(h.store.credit_balance("user_1").await.unwrap().unwrap().credits, 15);
    }

    #[tokio::test]
    async fn test_generate_failure_refunds() {
        let h = harness(Options {
            images: Some(true),
            ..Options::default()
        });
        h.store.ensure_user("user_1", None, 100).await.unwrap();

        let (status, _) =
            send(&h.app, authed("POST", "/api/generate", "user_1", json!({"prompt": "cat"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(h.store.credit_balance("user_1").await.unwrap().unwrap().credits, 100);
        assert!(h.store.thumbnail_history("user_1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_without_image_backend_is_503() {
        let h = harness(Options {
            images: None,
            ..Options::default()
        });
        h.store.ensure_user("user_1", None, 100).await.unwrap();

        let (status, _) =
            send(&h.app, authed("POST", "/api/generate", "user_1", json!({"prompt": "cat"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(h.store.credit_balance("user_1").await.unwrap().unwrap().credits, 100);

        let (status, _) =
            send(&h.app, authed("POST", "/api/generate", "user_1", json!({"prompt": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_user_sync_never_resets_balance() {
        let h = harness(Options::default());
        let (_, first) = send(&h.app, authed("POST", "/api/users/me", "user_1", Value::Null)).await;
        assert_eq!(first["credits"], 100);

        h.store.debit_credits("user_1", 40).await.unwrap();
        let (_, again) = send(&h.app, authed("POST", "/api/users/me", "user_1", Value::Null)).await;
        assert_eq!(again["credits"], 60);
    }
}

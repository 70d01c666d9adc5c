//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use studio_billing::{BillingError, NewThumbnail, Plan, ThumbnailEntry, WebhookOutcome};
use studio_core::{EnhancedPrompt, INVALID_PROMPT, ImageRequest};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 200;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub completion_provider: String,
    pub completion_provider_reachable: bool,
    pub image_generation: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReport {
    pub loaded: bool,
    pub token_length: usize,
}

#[derive(Debug, Serialize)]
pub struct UserSyncResponse {
    pub credits: i64,
    pub plan: Option<Plan>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub images: Vec<String>,
    pub remaining_credits: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub plan: Plan,
    pub status: String,
    pub credits_remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

/// Read a string field from a JSON body. Malformed bodies and non-string
/// values read as absent so that handlers answer with their own 400.
fn string_field<'a>(body: &'a Option<Value>, name: &str) -> Option<&'a str> {
    body.as_ref()?.get(name)?.as_str()
}

fn parse_body(body: &Bytes) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        completion_provider: state.enhancer.provider_name().to_string(),
        completion_provider_reachable: state.enhancer.provider_healthy().await,
        image_generation: state.images.is_some(),
    })
}

/// `POST /api/checkout`
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let body = parse_body(&body);
    let plan = string_field(&body, "plan");

    let session = state
        .checkout
        .start(&user.id, user.email.as_deref(), plan)
        .await
        .inspect_err(|e| match e {
            BillingError::InvalidPlan(plan) => {
                tracing::info!(user_id = %user.id, plan = %plan, "Checkout with invalid plan");
            }
            _ => tracing::error!(user_id = %user.id, error = %e, "Checkout error"),
        })?;

    Ok(Json(CheckoutResponse { url: session.url }))
}

/// `POST /api/webhooks/stripe`
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process(&body, signature).await.map_err(|e| {
        if e.is_retryable() {
            tracing::error!(error = %e, "Webhook processing error");
            ApiError::Internal("Webhook processing failed".into())
        } else {
            tracing::warn!(error = %e, "Webhook rejected");
            ApiError::from(e)
        }
    })?;

    match &outcome {
        WebhookOutcome::Granted { user_id, credits, .. } => {
            tracing::debug!(%user_id, credits, "Webhook applied");
        }
        WebhookOutcome::Duplicate { event_id } => tracing::debug!(%event_id, "Webhook duplicate"),
        WebhookOutcome::Unattributed { event_id, reason } => {
            tracing::debug!(%event_id, %reason, "Webhook acknowledged without effect");
        }
        WebhookOutcome::Ignored { .. } => {}
    }

    Ok(Json(WebhookAck { received: true }))
}

/// `POST /api/enhance-prompt`
pub async fn enhance_prompt(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EnhancedPrompt>, ApiError> {
    let body = parse_body(&body);
    let enhanced = state.enhancer.enhance(string_field(&body, "prompt")).await?;
    Ok(Json(enhanced))
}

/// `GET /api/test-token`: whether the image-provider token is loaded
pub async fn test_token(State(state): State<AppState>) -> Json<TokenReport> {
    let token = state.replicate_token.as_deref().unwrap_or_default();
    let report = TokenReport {
        loaded: !token.is_empty(),
        token_length: token.chars().count(),
    };
    tracing::info!(
        loaded = report.loaded,
        length = report.token_length,
        value = %mask_token(token),
        "REPLICATE_API_TOKEN"
    );
    Json(report)
}

/// All but the last four characters replaced with `*`
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "(not set)".into();
    }
    let chars: Vec<char> = token.chars().collect();
    let visible = chars.len().saturating_sub(4);
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { *c })
        .collect()
}

/// `GET /api/credits`
pub async fn get_credits(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<studio_billing::CreditView>, ApiError> {
    let balance = state
        .store
        .credit_balance(&user.id)
        .await
        .inspect_err(|e| tracing::error!(user_id = %user.id, error = %e, "Credit lookup failed"))?;
    Ok(Json(state.gate.assess(balance.as_ref())))
}

/// `POST /api/users/me`: first-sign-in sync
pub async fn sync_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserSyncResponse>, ApiError> {
    let balance = state
        .store
        .ensure_user(&user.id, user.email.as_deref(), state.starting_credits)
        .await
        .inspect_err(|e| tracing::error!(user_id = %user.id, error = %e, "User sync failed"))?;

    Ok(Json(UserSyncResponse {
        credits: balance.credits,
        plan: balance.plan,
    }))
}

/// `POST /api/generate`
///
/// Debits before calling the image provider and refunds if it fails.
pub async fn generate_thumbnail(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    let body = parse_body(&body);
    let prompt = string_field(&body, "prompt")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest(INVALID_PROMPT.into()))?;

    let images = state
        .images
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Image generation is not configured.".into()))?;

    let mut request = ImageRequest::new(prompt);
    if let Some(ratio) = string_field(&body, "aspect_ratio").filter(|r| !r.trim().is_empty()) {
        request.aspect_ratio = ratio.trim().to_string();
    }

    let remaining = state.gate.charge(state.store.as_ref(), &user.id).await?;

    let url = match images.generate(&request).await {
        Ok(image) => image.primary_url().map(str::to_string),
        Err(e) => {
            tracing::error!(user_id = %user.id, provider = images.name(), error = %e, "Image generation failed");
            None
        }
    };

    let Some(url) = url else {
        if let Err(e) = state.gate.refund(state.store.as_ref(), &user.id).await {
            tracing::error!(user_id = %user.id, error = %e, "Refund after failed generation did not apply");
        }
        return Err(ApiError::Upstream("Image generation failed.".into()));
    };

    let entry = NewThumbnail {
        user_id: user.id.clone(),
        prompt: request.prompt,
        image_url: url.clone(),
    };
    if let Err(e) = state.store.record_thumbnail(entry).await {
        tracing::error!(user_id = %user.id, error = %e, "Could not record thumbnail history");
    }

    Ok(Json(GenerateResponse {
        images: vec![url],
        remaining_credits: remaining,
    }))
}

/// `GET /api/thumbnails?limit=N`, newest first
pub async fn list_thumbnails(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ThumbnailEntry>>, ApiError> {
    let limit = query
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let history = state
        .store
        .thumbnail_history(&user.id, limit)
        .await
        .inspect_err(|e| tracing::error!(user_id = %user.id, error = %e, "History lookup failed"))?;
    Ok(Json(history))
}

/// `GET /api/subscription`
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscription = state
        .store
        .subscription(&user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No subscription found".into()))?;
    let credits = state
        .store
        .credit_balance(&user.id)
        .await?
        .map_or(0, |b| b.credits);

    Ok(Json(SubscriptionSummary {
        plan: subscription.plan,
        status: subscription.status,
        credits_remaining: credits,
    }))
}

/// Any unsupported method on a known route
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

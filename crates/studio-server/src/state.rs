//! Application State

use std::sync::Arc;

use studio_billing::{
    BillingStore, CheckoutService, CreditGate, MemoryBillingStore, SignatureVerifier,
    StripeBilling, SupabaseConfig, SupabaseStore, WebhookProcessor,
};
use studio_core::{ImageGenerator, LlmProvider, PromptEnhancer};
use studio_runtime::{OpenAiConfig, OpenAiProvider, ReplicateConfig, ReplicateGenerator};

use crate::auth::SessionVerifier;
use crate::config::{AppConfig, PromptProvider, StoreBackend};

/// Shared application state. Every dependency is constructed once at
/// start-up and injected, so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,

    pub webhooks: Arc<WebhookProcessor>,

    pub store: Arc<dyn BillingStore>,

    pub gate: CreditGate,

    pub enhancer: Arc<PromptEnhancer>,

    /// Image backend (None if Replicate is not configured)
    pub images: Option<Arc<dyn ImageGenerator>>,

    pub sessions: Arc<SessionVerifier>,

    pub starting_credits: i64,

    /// Routes `/api/test-token` when set
    pub expose_diagnostics: bool,

    /// Reported (length only) by the diagnostic endpoint
    pub replicate_token: Option<Arc<str>>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let catalog = Arc::new(config.catalog.clone());
        let stripe = Arc::new(StripeBilling::new(&config.stripe_secret_key)?);

        let store: Arc<dyn BillingStore> = match &config.store {
            StoreBackend::Supabase {
                url,
                service_role_key,
            } => Arc::new(SupabaseStore::new(SupabaseConfig::new(url, service_role_key))?),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; balances are lost on restart");
                Arc::new(MemoryBillingStore::new())
            }
        };

        let llm = prompt_provider(&config.prompt_provider)?;
        tracing::info!(provider = llm.name(), model = %config.prompt_model, "Prompt enhancer configured");

        let images = match &config.replicate_token {
            Some(token) => {
                let mut replicate = ReplicateConfig::new(token.clone());
                if let Some(model) = &config.replicate_model {
                    replicate = replicate.with_model(model.clone());
                }
                let generator: Arc<dyn ImageGenerator> = Arc::new(ReplicateGenerator::new(replicate)?);
                Some(generator)
            }
            None => {
                tracing::warn!("REPLICATE_API_TOKEN not set - image generation disabled");
                None
            }
        };

        Ok(Self {
            checkout: Arc::new(CheckoutService::new(
                stripe.clone(),
                catalog.clone(),
                config.public_base_url.clone(),
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                SignatureVerifier::new(config.stripe_webhook_secret.clone()),
                stripe,
                store.clone(),
                catalog,
            )),
            store,
            gate: CreditGate::new(config.credits_per_generation),
            enhancer: Arc::new(PromptEnhancer::new(llm, config.prompt_model.clone())),
            images,
            sessions: Arc::new(SessionVerifier::new(
                &config.session_key,
                config.session_issuer.as_deref(),
            )?),
            starting_credits: config.starting_credits,
            expose_diagnostics: config.expose_diagnostics,
            replicate_token: config.replicate_token.as_deref().map(Arc::from),
        })
    }
}

fn prompt_provider(config: &PromptProvider) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match config {
        PromptProvider::OpenAi { api_key, base_url } => {
            let mut openai = OpenAiConfig::new(api_key.clone());
            if let Some(base_url) = base_url {
                openai = openai.with_base_url(base_url.clone());
            }
            Ok(Arc::new(OpenAiProvider::new(openai)?))
        }
        #[cfg(feature = "ollama")]
        PromptProvider::Ollama { host, port } => Ok(Arc::new(
            studio_runtime::OllamaProvider::from_config(&studio_runtime::OllamaConfig {
                host: host.clone(),
                port: *port,
            }),
        )),
        #[cfg(not(feature = "ollama"))]
        PromptProvider::Ollama { .. } => {
            anyhow::bail!("PROMPT_PROVIDER=ollama requires building with the `ollama` feature")
        }
    }
}

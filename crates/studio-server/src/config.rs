//! Server Configuration
//!
//! Everything is read from the environment once at start-up. Tests build a
//! config from a map through [`AppConfig::from_lookup`].

use studio_billing::{Plan, PlanCatalog, PlanEntry};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_STARTING_CREDITS: i64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Backend for prompt enhancement
#[derive(Clone)]
pub enum PromptProvider {
    OpenAi {
        api_key: String,
        base_url: Option<String>,
    },
    Ollama {
        host: String,
        port: u16,
    },
}

/// Session-token verification key
#[derive(Clone)]
pub enum SessionKey {
    /// Identity-provider PEM public key (RS256)
    RsaPem(String),
    /// Shared secret (HS256), local development
    Secret(String),
}

#[derive(Clone)]
pub enum StoreBackend {
    Supabase { url: String, service_role_key: String },
    Memory,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub public_base_url: String,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub catalog: PlanCatalog,

    pub prompt_provider: PromptProvider,
    pub prompt_model: String,

    pub replicate_token: Option<String>,
    pub replicate_model: Option<String>,

    pub session_key: SessionKey,
    pub session_issuer: Option<String>,

    pub store: StoreBackend,

    pub credits_per_generation: i64,
    pub starting_credits: i64,
    pub expose_diagnostics: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("public_base_url", &self.public_base_url)
            .field("prompt_model", &self.prompt_model)
            .field("replicate", &self.replicate_token.is_some())
            .field("credits_per_generation", &self.credits_per_generation)
            .field("starting_credits", &self.starting_credits)
            .field("expose_diagnostics", &self.expose_diagnostics)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let catalog = PlanCatalog::new(vec![
            plan_entry(&env, Plan::Beginner, "STRIPE_PRICE_BEGINNER", "PLAN_CREDITS_BEGINNER")?,
            plan_entry(&env, Plan::Pro, "STRIPE_PRICE_PRO", "PLAN_CREDITS_PRO")?,
            plan_entry(&env, Plan::Enterprise, "STRIPE_PRICE_ENTERPRISE", "PLAN_CREDITS_ENTERPRISE")?,
        ])
        .map_err(|e| ConfigError::Invalid {
            name: "STRIPE_PRICE_*",
            reason: e.to_string(),
        })?;

        let prompt_provider = match env.get("PROMPT_PROVIDER").as_deref() {
            None | Some("openai") => PromptProvider::OpenAi {
                api_key: env.require("OPENAI_API_KEY")?,
                base_url: env.get("OPENAI_BASE_URL"),
            },
            Some("ollama") => PromptProvider::Ollama {
                host: env.get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into()),
                port: env.parse("OLLAMA_PORT")?.unwrap_or(11434),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PROMPT_PROVIDER",
                    reason: format!("expected openai or ollama, got {other}"),
                });
            }
        };
        let prompt_model = match prompt_provider {
            PromptProvider::OpenAi { .. } => env
                .get("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
            PromptProvider::Ollama { .. } => env
                .get("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into()),
        };

        let session_key = match (env.get("CLERK_JWT_KEY"), env.get("AUTH_JWT_SECRET")) {
            (Some(pem), _) => SessionKey::RsaPem(pem.replace("\\n", "\n")),
            (None, Some(secret)) => SessionKey::Secret(secret),
            (None, None) => return Err(ConfigError::Missing("CLERK_JWT_KEY")),
        };

        let store = match env.get("STORE_BACKEND").as_deref() {
            None | Some("supabase") => StoreBackend::Supabase {
                url: env.require("SUPABASE_URL")?,
                service_role_key: env.require("SUPABASE_SERVICE_ROLE_KEY")?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    reason: format!("expected supabase or memory, got {other}"),
                });
            }
        };

        let credits_per_generation = env
            .parse("CREDITS_PER_GENERATION")?
            .unwrap_or(studio_billing::DEFAULT_COST_PER_GENERATION);
        if credits_per_generation <= 0 {
            return Err(ConfigError::Invalid {
                name: "CREDITS_PER_GENERATION",
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            bind_addr: env.get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            public_base_url: env.require("PUBLIC_BASE_URL")?,
            stripe_secret_key: env.require("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: env.require("STRIPE_WEBHOOK_SECRET")?,
            catalog,
            prompt_provider,
            prompt_model,
            replicate_token: env.get("REPLICATE_API_TOKEN"),
            replicate_model: env.get("REPLICATE_MODEL"),
            session_key,
            session_issuer: env.get("CLERK_ISSUER"),
            store,
            credits_per_generation,
            starting_credits: env
                .parse("STARTING_CREDITS")?
                .unwrap_or(DEFAULT_STARTING_CREDITS)
                .max(0),
            expose_diagnostics: env.parse("EXPOSE_DIAGNOSTICS")?.unwrap_or(false),
        })
    }
}

fn plan_entry(env: &Env<'_>, plan: Plan, price_var: &'static str, credits_var: &'static str) -> Result<PlanEntry> {
    let entry = PlanEntry::new(plan, env.require(price_var)?);
    Ok(match env.parse(credits_var)? {
        Some(credits) => entry.with_credits(credits),
        None => entry,
    })
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

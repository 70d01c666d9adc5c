//! Replicate Image Provider
//!
//! Implementation of `ImageGenerator` using synchronous Replicate predictions
//! (`Prefer: wait`). One request per thumbnail, no polling.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use studio_core::{
    error::{CoreError, Result},
    image::{GeneratedImage, ImageGenerator, ImageRequest},
};

use crate::transport_error;

pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-schnell";
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

#[derive(Clone, Debug)]
pub struct ReplicateConfig {
    pub api_token: String,

    /// `owner/name` of the model to run
    pub model: String,

    pub base_url: String,

    pub timeout_secs: u64,
}

impl ReplicateConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 120,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct ReplicateGenerator {
    client: reqwest::Client,
    config: ReplicateConfig,
}

impl ReplicateGenerator {
    pub fn new(config: ReplicateConfig) -> Result<Self> {
        if config.api_token.trim().is_empty() {
            return Err(CoreError::Config("Replicate API token is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Output is either a single URL or a list of URLs depending on the model
    fn output_urls(output: Option<serde_json::Value>) -> Vec<String> {
        match output {
            Some(serde_json::Value::String(url)) => vec![url],
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let url = format!("{}/models/{}/predictions", self.config.base_url, self.config.model);
        let body = serde_json::json!({
            "input": {
                "prompt": request.prompt,
                "aspect_ratio": request.aspect_ratio,
                "num_outputs": 1,
            }
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(%status, detail = %detail, "Replicate returned an error");
            return Err(CoreError::Provider(format!("HTTP {status}: {detail}")));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("Malformed prediction: {e}")))?;

        if prediction.status != "succeeded" {
            tracing::warn!(
                prediction_id = ?prediction.id,
                status = %prediction.status,
                error = ?prediction.error,
                "Prediction did not succeed"
            );
            return Err(CoreError::Provider(format!(
                "prediction ended with status {}",
                prediction.status
            )));
        }

        let urls = Self::output_urls(prediction.output);
        if urls.is_empty() {
            return Err(CoreError::EmptyCompletion);
        }

        tracing::info!(prediction_id = ?prediction.id, "Thumbnail generated");
        Ok(GeneratedImage { urls })
    }
}

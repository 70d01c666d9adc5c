//! Image Generation Strategy
//!
//! Interface for text-to-image backends. The server debits credits before
//! calling `generate` and refunds them when it fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Request for a single thumbnail
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.into()
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

/// Generated output; providers may return several URLs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub urls: Vec<String>,
}

impl GeneratedImage {
    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str).filter(|u| !u.is_empty())
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage>;
}

//! Anthropic Messages API text-generation backend.
//!
//! Implements `TextGenerator` against the Messages API:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - Single-turn user message; the response's first text block is the result

use crate::config::EnrichmentConfig;
use crate::enrichment::TextGenerator;
use crate::error::EnrichmentError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages-API-backed generator.
#[derive(Debug)]
pub struct AnthropicGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
    /// Create a generator from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns `NotConfigured` if it is not set, so
    /// callers can fall back to templates instead of failing.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| EnrichmentError::NotConfigured)?;
        Ok(Self::new(api_key, config.model.clone()))
    }

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model,
        }
    }

    /// Point the generator at a non-default API endpoint (proxies, test
    /// servers).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Extract the first text content block from a Messages API response.
    fn extract_text(body: &Value) -> Result<String, EnrichmentError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| EnrichmentError::MalformedResponse {
                message: "response has no content array".into(),
            })?;
        let text = blocks
            .iter()
            .find_map(|block| {
                (block["type"] == "text").then(|| block["text"].as_str().unwrap_or(""))
            })
            .ok_or_else(|| EnrichmentError::MalformedResponse {
                message: "response has no text block".into(),
            })?;
        Ok(text.to_string())
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, EnrichmentError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichmentError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Request {
                message: format!("API returned {status}: {detail}"),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::MalformedResponse {
                message: e.to_string(),
            })?;
        let text = Self::extract_text(&body)?;
        debug!(model = %self.model, chars = text.len(), "generation completed");
        Ok(text)
    }
}

//! Anthropic Messages API provider.

use super::{
    ensure_success, http_client, image_parts, parse_bill_data, BillExtractor, ProviderError,
    EXTRACTION_PROMPT,
};
use crate::config::ProviderCredentials;
use crate::models::BillData;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct ClaudeExtractor {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    client: Client,
}

impl ClaudeExtractor {
    pub fn new(credentials: &ProviderCredentials, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            api_key: credentials.api_key.clone(),
            model: credentials.model.clone(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            client: http_client(timeout)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    "ANTHROPIC_API_KEY environment variable is required".into(),
                )
            })
    }
}

#[async_trait]
impl BillExtractor for ClaudeExtractor {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError> {
        let api_key = self.api_key()?;
        let (media_type, data) = image_parts(image_data_url);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type,
                            data,
                        },
                    },
                    ContentBlock::Text {
                        text: EXTRACTION_PROMPT,
                    },
                ],
            }],
        };

        tracing::debug!(model = %self.model, "Sending receipt to Anthropic API");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "Anthropic").await?;

        let message: MessagesResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let text = message
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ProviderError::InvalidResponse("No text content in response".into()))?;

        parse_bill_data(&text)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.api_key().map(|_| ())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

//! OpenAI chat-completions provider.

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

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiExtractor {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiExtractor {
    pub fn new(credentials: &ProviderCredentials, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            api_key: credentials.api_key.clone(),
            model: credentials.model.clone(),
            base_url: OPENAI_API_BASE.to_string(),
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
                ProviderError::NotConfigured("OPENAI_API_KEY environment variable is required".into())
            })
    }
}

#[async_trait]
impl BillExtractor for OpenAiExtractor {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError> {
        let api_key = self.api_key()?;
        let (mime_type, data) = image_parts(image_data_url);

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    MessagePart::Text {
                        text: EXTRACTION_PROMPT,
                    },
                    MessagePart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", mime_type, data),
                        },
                    },
                ],
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(model = %self.model, "Sending receipt to OpenAI API");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "OpenAI").await?;

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No content in response".into()))?;

        parse_bill_data(&content)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.api_key().map(|_| ())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<MessagePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

//! Local Ollama provider. Needs no credentials.

use super::{
    ensure_success, http_client, image_parts, parse_bill_data, BillExtractor, ProviderError,
    EXTRACTION_PROMPT,
};
use crate::config::OllamaConfig;
use crate::models::BillData;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;

pub struct OllamaExtractor {
    host: String,
    model: String,
    client: Client,
}

impl OllamaExtractor {
    pub fn new(config: &OllamaConfig, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl BillExtractor for OllamaExtractor {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError> {
        let (_, data) = image_parts(image_data_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: EXTRACTION_PROMPT,
                images: vec![data],
            }],
            format: "json",
            stream: false,
        };

        tracing::debug!(model = %self.model, host = %self.host, "Sending receipt to Ollama");

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "Ollama").await?;

        let chat: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        parse_bill_data(&chat.message.content)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.host.is_empty() {
            return Err(ProviderError::NotConfigured("OLLAMA_HOST is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    format: &'static str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

//! Google Gemini provider.
//!
//! Uses `generateContent` with the image as inline data and a response schema
//! so the model answers in JSON.

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
use serde_json::{json, Value};
use service_core::error::AppError;
use std::time::Duration;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiExtractor {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiExtractor {
    pub fn new(credentials: &ProviderCredentials, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            api_key: credentials.api_key.clone(),
            model: credentials.model.clone(),
            base_url: GEMINI_API_BASE.to_string(),
            client: http_client(timeout)?,
        })
    }

    /// Point the client at another endpoint (proxies, local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .ok_or_else(|| {
                ProviderError::NotConfigured("GEMINI_API_KEY environment variable is required".into())
            })
    }
}

#[async_trait]
impl BillExtractor for GeminiExtractor {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError> {
        let api_key = self.api_key()?;
        let (mime_type, data) = image_parts(image_data_url);

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    ContentPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    ContentPart::InlineData {
                        inline_data: InlineData {
                            mime_type,
                            data: data.to_string(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: bill_schema(),
            },
        };

        tracing::debug!(model = %self.model, "Sending receipt to Gemini API");

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "Gemini").await?;

        let api_response: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let text: String = api_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();

        parse_bill_data(&text)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.api_key().map(|_| ())
    }
}

/// OpenAPI-subset schema describing [`BillData`].
fn bill_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "storeName": { "type": "STRING" },
            "date": { "type": "STRING" },
            "subtotal": { "type": "NUMBER" },
            "tax": { "type": "NUMBER" },
            "total": { "type": "NUMBER" },
            "currency": { "type": "STRING" },
            "lineItems": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "description": { "type": "STRING" },
                        "quantity": { "type": "NUMBER" },
                        "price": { "type": "NUMBER" }
                    },
                    "required": ["description", "price"]
                }
            }
        },
        "required": ["storeName", "date", "subtotal", "tax", "total", "lineItems"]
    })
}

// ============================================================================
// Gemini API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

//! Receipt extraction providers.
//!
//! One trait, [`BillExtractor`], turns a receipt image into [`BillData`].
//! The active backend is chosen once at startup from `AI_SERVICE` and shared
//! behind an `Arc<dyn BillExtractor>`.

pub mod claude;
pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;

use crate::config::ExtractionConfig;
use crate::models::{BillData, LineItem};
use crate::services::image_store::parse_data_url;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use service_core::error::AppError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use claude::ClaudeExtractor;
pub use gemini::GeminiExtractor;
pub use mock::MockExtractor;
pub use ollama::OllamaExtractor;
pub use openai::OpenAiExtractor;

/// Instruction sent with every receipt image.
pub const EXTRACTION_PROMPT: &str = r#"Extract the following information from this receipt image: Store Name, Date (YYYY-MM-DD format), Subtotal, Tax, Total Amount, Currency, and a list of line items (description, quantity, price). If a field is not found, estimate reasonably or return 0/null. Normalize prices to numbers.

Return ONLY valid JSON with this exact structure (no markdown, no additional text):
{
  "storeName": "string",
  "date": "YYYY-MM-DD",
  "subtotal": number,
  "tax": number,
  "total": number,
  "currency": "string",
  "lineItems": [
    {
      "description": "string",
      "quantity": number,
      "price": number
    }
  ]
}"#;

/// Fields a provider response must carry.
const REQUIRED_FIELDS: [&str; 6] = ["storeName", "date", "subtotal", "tax", "total", "lineItems"];

/// MIME type assumed when the input has no data-URL prefix.
const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::ExtractionFailed(err.to_string())
    }
}

/// Image-to-bill extraction backend.
#[async_trait]
pub trait BillExtractor: Send + Sync {
    /// Short provider label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Extract structured bill data from a `data:image/...;base64,...` URL.
    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError>;

    /// Whether the provider is usable (credentials present).
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// The selectable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Claude,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "claude" => Ok(ProviderKind::Claude),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid AI_SERVICE: {}. Must be one of: gemini, ollama, openai, claude",
                other
            ))),
        }
    }
}

/// Build the extractor selected by `config.provider`.
pub fn build_extractor(config: &ExtractionConfig) -> Result<Arc<dyn BillExtractor>, AppError> {
    let kind: ProviderKind = config.provider.parse()?;
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    let extractor: Arc<dyn BillExtractor> = match kind {
        ProviderKind::Gemini => Arc::new(GeminiExtractor::new(&config.gemini, timeout)?),
        ProviderKind::OpenAi => Arc::new(OpenAiExtractor::new(&config.openai, timeout)?),
        ProviderKind::Claude => Arc::new(ClaudeExtractor::new(&config.claude, timeout)?),
        ProviderKind::Ollama => Arc::new(OllamaExtractor::new(&config.ollama, timeout)?),
    };

    tracing::info!(provider = kind.as_str(), "Extraction provider selected");
    Ok(extractor)
}

/// Shared HTTP client with the extraction timeout applied.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to create HTTP client: {}", e)))
}

/// Split an image input into MIME type and raw base64.
pub(crate) fn image_parts(image_data_url: &str) -> (String, &str) {
    match parse_data_url(image_data_url) {
        Some(url) => (url.mime_type(), url.payload),
        None => (DEFAULT_MIME_TYPE.to_string(), image_data_url),
    }
}

/// Turn a non-2xx vendor response into a [`ProviderError`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect();
    Err(ProviderError::ApiError(format!(
        "{} API error {}: {}",
        provider, status, body
    )))
}

/// Parse a model's text answer into [`BillData`].
///
/// Markdown fences are stripped, every field in `REQUIRED_FIELDS` must be
/// present, `null` or non-numeric amounts become `0` and a line item without a
/// quantity counts once.
pub fn parse_bill_data(text: &str) -> Result<BillData, ProviderError> {
    let json = strip_code_fences(text);
    if json.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "No content in response".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(json).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse bill data: {}", e))
    })?;
    let object = value.as_object().ok_or_else(|| {
        ProviderError::InvalidResponse("Failed to parse bill data: expected a JSON object".into())
    })?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !has_required_field(object, field))
        .collect();
    if !missing.is_empty() {
        return Err(ProviderError::InvalidResponse(format!(
            "Missing required fields in response: {}",
            missing.join(", ")
        )));
    }

    let line_items = match object.get("lineItems") {
        Some(Value::Array(items)) => items.iter().filter_map(line_item).collect(),
        _ => Vec::new(),
    };

    Ok(BillData {
        store_name: text_field(object, "storeName").unwrap_or_default(),
        date: text_field(object, "date").unwrap_or_default(),
        subtotal: number_field(object, "subtotal").unwrap_or(0.0),
        tax: number_field(object, "tax").unwrap_or(0.0),
        total: number_field(object, "total").unwrap_or(0.0),
        currency: text_field(object, "currency").filter(|c| !c.is_empty()),
        line_items,
    })
}

/// Amounts only need to be present (`null` reads as `0`); the store name and
/// date must be non-empty and `lineItems` must be an array.
fn has_required_field(object: &Map<String, Value>, field: &str) -> bool {
    match field {
        "storeName" | "date" => text_field(object, field).is_some_and(|s| !s.is_empty()),
        "lineItems" => matches!(object.get(field), Some(Value::Array(_))),
        _ => object.contains_key(field),
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

fn line_item(value: &Value) -> Option<LineItem> {
    let object = value.as_object()?;
    Some(LineItem {
        description: text_field(object, "description").unwrap_or_default(),
        quantity: number_field(object, "quantity").unwrap_or(1.0),
        price: number_field(object, "price").unwrap_or(0.0),
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    let number = match object.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

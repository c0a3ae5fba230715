use secrecy::SecretString;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;
use std::env;

/// Largest decoded image the store accepts (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Request body ceiling; leaves room for base64 inflation of a maximal image.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Outbound extraction call timeout in seconds.
pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ReceiptConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Filesystem directory holding `<billId>.<ext>` files.
    pub images_dir: String,
    pub max_image_bytes: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Provider selector (`AI_SERVICE`). Validated when the application is built.
    pub provider: String,
    pub timeout_secs: u64,
    pub gemini: ProviderCredentials,
    pub openai: ProviderCredentials,
    pub claude: ProviderCredentials,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub api_key: Option<SecretString>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
}

impl ReceiptConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        Ok(ReceiptConfig {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "receipt-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://bills.db"), is_prod)?,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 5, false)?,
            },
            storage: StorageConfig {
                images_dir: get_env("IMAGES_DIR", Some("receipts-images"), is_prod)?,
                max_image_bytes: get_env_parsed("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES, false)?,
                max_body_bytes: get_env_parsed("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES, false)?,
            },
            extraction: ExtractionConfig {
                provider: env::var("AI_SERVICE").unwrap_or_else(|_| "gemini".to_string()),
                timeout_secs: get_env_parsed(
                    "EXTRACTION_TIMEOUT_SECS",
                    DEFAULT_EXTRACTION_TIMEOUT_SECS,
                    false,
                )?,
                gemini: ProviderCredentials {
                    api_key: secret_env("GEMINI_API_KEY"),
                    model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
                },
                openai: ProviderCredentials {
                    api_key: secret_env("OPENAI_API_KEY"),
                    model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                },
                claude: ProviderCredentials {
                    api_key: secret_env("ANTHROPIC_API_KEY"),
                    model: env::var("ANTHROPIC_MODEL")
                        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
                },
                ollama: OllamaConfig {
                    host: env::var("OLLAMA_HOST")
                        .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                    model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gemma3".to_string()),
                },
            },
        })
    }
}

fn secret_env(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fills_every_section_from_defaults() {
        let config = ReceiptConfig::load().unwrap();
        let expected_port = env::var("APP__PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        assert_eq!(config.common.port, expected_port);
        assert!(config.storage.max_image_bytes > 0);
        assert!(config.extraction.timeout_secs > 0);
        assert!(!config.extraction.provider.is_empty());
    }
}

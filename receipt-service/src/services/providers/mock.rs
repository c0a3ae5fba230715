//! Canned extractor for tests and offline development.

use super::{BillExtractor, ProviderError};
use crate::models::{BillData, LineItem};
use crate::services::image_store::is_image_data_url;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

enum Behaviour {
    Succeed(BillData),
    Fail(String),
}

/// Returns a fixed [`BillData`] (or a fixed failure) for every image.
pub struct MockExtractor {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new(data: BillData) -> Self {
        Self {
            behaviour: Behaviour::Succeed(data),
            calls: AtomicUsize::new(0),
        }
    }

    /// An extractor whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            behaviour: Behaviour::Fail(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of extraction calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sample_bill() -> BillData {
        BillData {
            store_name: "Mock Grocer".to_string(),
            date: "2024-02-14".to_string(),
            subtotal: 10.0,
            tax: 0.8,
            total: 10.8,
            currency: Some("USD".to_string()),
            line_items: vec![
                LineItem {
                    description: "Coffee beans".to_string(),
                    quantity: 1.0,
                    price: 7.5,
                },
                LineItem {
                    description: "Milk".to_string(),
                    quantity: 1.0,
                    price: 2.5,
                },
            ],
        }
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new(Self::sample_bill())
    }
}

#[async_trait]
impl BillExtractor for MockExtractor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn extract_bill_data(&self, image_data_url: &str) -> Result<BillData, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !is_image_data_url(image_data_url) {
            return Err(ProviderError::InvalidResponse(
                "Mock extractor expects an image data URL".to_string(),
            ));
        }

        match &self.behaviour {
            Behaviour::Succeed(data) => Ok(data.clone()),
            Behaviour::Fail(reason) => Err(ProviderError::ApiError(reason.clone())),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

//! Bill entities shared by the extraction, storage and API layers.

use serde::{Deserialize, Serialize};

/// Prefix that marks an embedded image rather than a stored path.
pub const LEGACY_IMAGE_PREFIX: &str = "data:image/";

/// True when `value` is an inline `data:image/...` payload.
pub fn is_base64_image(value: &str) -> bool {
    value.starts_with(LEGACY_IMAGE_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    pub price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Structured receipt data as returned by an extraction provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillData {
    pub store_name: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// A persisted bill.
///
/// `image_data` is only ever populated on read, for rows written by older
/// clients that stored the image inline in the `imagePath` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    pub id: String,
    pub store_name: String,
    pub date: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    pub created_at: String,
}

impl BillRecord {
    /// Move an inline image out of `image_path` into `image_data`.
    pub fn reclassify_legacy_image(mut self) -> Self {
        if self.image_path.as_deref().is_some_and(is_base64_image) {
            self.image_data = self.image_path.take();
        }
        self
    }
}

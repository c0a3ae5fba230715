use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /api/upload-image`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Bill ID is required"))]
    pub bill_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Image data is required"))]
    pub image_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageResponse {
    pub success: bool,
    pub image_path: String,
}

/// Body of `POST /api/extract-bill`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtractBillRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Image data is required"))]
    pub image_data: String,
}

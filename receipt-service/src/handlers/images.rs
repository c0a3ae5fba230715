use crate::dtos::{SuccessResponse, UploadImageRequest, UploadImageResponse};
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

pub async fn upload_image(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<UploadImageRequest>,
) -> Result<Json<UploadImageResponse>, AppError> {
    let image_path = state
        .images
        .store(&request.bill_id, &request.image_data)
        .await?;

    Ok(Json(UploadImageResponse {
        success: true,
        image_path,
    }))
}

/// Drop the image of an abandoned, never-saved bill.
pub async fn delete_orphan_image(
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.images.delete_orphan(&bill_id, &state.bills).await?;
    Ok(Json(SuccessResponse::ok()))
}

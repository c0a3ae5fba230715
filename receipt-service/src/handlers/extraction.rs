use crate::dtos::ExtractBillRequest;
use crate::models::BillData;
use crate::services::image_store::is_image_data_url;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{extract::State, Json};
use service_core::error::AppError;
use std::time::Instant;

pub async fn extract_bill(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ExtractBillRequest>,
) -> Result<Json<BillData>, AppError> {
    if !is_image_data_url(&request.image_data) {
        return Err(AppError::bad_request(
            "Invalid image data format. Expected data:image/<type>;base64,<data>",
        ));
    }

    let provider = state.extractor.name();
    let start = Instant::now();
    let result = state.extractor.extract_bill_data(&request.image_data).await;

    metrics::histogram!("receipt_extraction_duration_seconds", "provider" => provider)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(data) => {
            metrics::counter!("receipt_extractions_total", "provider" => provider, "outcome" => "success")
                .increment(1);
            tracing::info!(
                provider = provider,
                line_items = data.line_items.len(),
                "Bill data extracted"
            );
            Ok(Json(data))
        }
        Err(e) => {
            metrics::counter!("receipt_extractions_total", "provider" => provider, "outcome" => "failure")
                .increment(1);
            tracing::warn!(provider = provider, error = %e, "Bill extraction failed");
            Err(e.into())
        }
    }
}

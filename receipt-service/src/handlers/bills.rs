use crate::dtos::{
    BillListParams, BillListResponse, PaginatedBills, SaveBillRequest, SaveBillResponse,
    SuccessResponse,
};
use crate::models::{BillRecord, BillStats};
use crate::services::image_store::validate_bill_id;
use crate::services::BillPage;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use service_core::error::AppError;

pub async fn list_bills(
    State(state): State<AppState>,
    Query(params): Query<BillListParams>,
) -> Result<Json<BillListResponse>, AppError> {
    let filter = params.filter()?;
    let sort = params.sort()?;

    let response = match params.page_request()? {
        None => BillListResponse::All(state.bills.list(&filter, sort).await?),
        Some(page) => {
            let BillPage { bills, pagination } = state.bills.query(&filter, sort, page).await?;
            BillListResponse::Page(PaginatedBills { bills, pagination })
        }
    };

    Ok(Json(response))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BillRecord>, AppError> {
    state
        .bills
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill not found")))
}

pub async fn save_bill(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SaveBillRequest>,
) -> Result<Json<SaveBillResponse>, AppError> {
    validate_bill_id(&request.id)?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let record = request.into_record(now);
    let saved = state.bills.upsert(&record).await?;

    let outcome = if saved.created { "created" } else { "updated" };
    metrics::counter!("receipt_bills_saved_total", "outcome" => outcome).increment(1);

    Ok(Json(SaveBillResponse {
        success: true,
        id: saved.id,
    }))
}

/// Remove the bill's images, then its row. Missing bills still succeed.
pub async fn delete_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Err(e) = state.images.delete(&id).await {
        tracing::warn!(bill_id = %id, error = %e, "Failed to delete bill images");
    }

    if state.bills.delete(&id).await? {
        metrics::counter!("receipt_bills_deleted_total").increment(1);
        tracing::info!(bill_id = %id, "Bill deleted");
    }

    Ok(Json(SuccessResponse::ok()))
}

pub async fn bill_stats(
    State(state): State<AppState>,
    Query(params): Query<BillListParams>,
) -> Result<Json<BillStats>, AppError> {
    let filter = params.filter()?;
    Ok(Json(state.bills.stats(&filter).await?))
}

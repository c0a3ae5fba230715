use crate::models::{
    is_base64_image, BillFilter, BillRecord, BillSort, LineItem, PageRequest, Pagination,
};
use crate::utils::validation::finite_number;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::{Validate, ValidationError};

/// Body of `POST /api/bills`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_bill_amounts"))]
pub struct SaveBillRequest {
    #[validate(length(min = 1, message = "Bill ID is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "Store name is required"))]
    pub store_name: String,
    #[validate(length(min = 1, message = "Date is required"))]
    pub date: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[validate(length(min = 1, message = "Currency is required"))]
    pub currency: String,
    #[serde(default)]
    #[validate(nested)]
    pub line_items: Vec<LineItemInput>,
    #[validate(length(min = 1, message = "Image path is required"))]
    pub image_path: String,
    /// Honoured on first insert only.
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_line_item"))]
pub struct LineItemInput {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    pub price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

fn validate_bill_amounts(bill: &SaveBillRequest) -> Result<(), ValidationError> {
    finite_number(bill.subtotal)?;
    finite_number(bill.tax)?;
    finite_number(bill.total)?;
    if is_base64_image(&bill.image_path) {
        let mut err = ValidationError::new("image_path");
        err.message = Some("imagePath must be a stored image path, not inline image data".into());
        return Err(err);
    }
    Ok(())
}

fn validate_line_item(item: &LineItemInput) -> Result<(), ValidationError> {
    finite_number(item.quantity)?;
    finite_number(item.price)
}

impl SaveBillRequest {
    /// Convert into a record, stamping `created_at` with `now` when absent.
    pub fn into_record(self, now: String) -> BillRecord {
        let created_at = self
            .created_at
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(now);

        BillRecord {
            id: self.id,
            store_name: self.store_name,
            date: self.date,
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
            currency: self.currency,
            line_items: self
                .line_items
                .into_iter()
                .map(|item| LineItem {
                    description: item.description,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            image_path: Some(self.image_path),
            image_data: None,
            created_at,
        }
    }
}

/// Query string of `GET /api/bills` and `GET /api/stats`.
///
/// Fields stay raw strings so that bad values become JSON 400s with a
/// field-specific message. Empty strings count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillListParams {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub store_name: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub search_term: Option<String>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl BillListParams {
    pub fn filter(&self) -> Result<BillFilter, AppError> {
        Ok(BillFilter {
            date_from: present(&self.date_from).map(str::to_string),
            date_to: present(&self.date_to).map(str::to_string),
            store_name: present(&self.store_name).map(str::to_string),
            min_amount: parse_amount("minAmount", &self.min_amount)?,
            max_amount: parse_amount("maxAmount", &self.max_amount)?,
            search_term: present(&self.search_term).map(str::to_string),
        })
    }

    pub fn sort(&self) -> Result<BillSort, AppError> {
        let mut sort = BillSort::default();
        if let Some(field) = present(&self.sort_field) {
            sort.field = field.parse().map_err(AppError::bad_request)?;
        }
        if let Some(direction) = present(&self.sort_direction) {
            sort.direction = direction.parse().map_err(AppError::bad_request)?;
        }
        Ok(sort)
    }

    /// `None` when the caller asked for neither `page` nor `pageSize`.
    pub fn page_request(&self) -> Result<Option<PageRequest>, AppError> {
        let page = parse_positive("page", &self.page)?;
        let page_size = parse_positive("pageSize", &self.page_size)?;
        if page.is_none() && page_size.is_none() {
            return Ok(None);
        }
        Ok(Some(PageRequest::new(
            page.unwrap_or(1),
            page_size.unwrap_or(PageRequest::DEFAULT_PAGE_SIZE),
        )))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_amount(name: &str, value: &Option<String>) -> Result<Option<f64>, AppError> {
    present(value)
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| AppError::bad_request(format!("Invalid {}: must be a number", name)))
        })
        .transpose()
}

fn parse_positive(name: &str, value: &Option<String>) -> Result<Option<u32>, AppError> {
    present(value)
        .map(|raw| {
            raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                AppError::bad_request(format!("Invalid {}: must be a positive integer", name))
            })
        })
        .transpose()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBillResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedBills {
    pub bills: Vec<BillRecord>,
    pub pagination: Pagination,
}

/// Plain array when unpaginated, `{bills, pagination}` otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BillListResponse {
    All(Vec<BillRecord>),
    Page(PaginatedBills),
}

pub mod bills;
pub mod images;

pub use bills::{
    BillListParams, BillListResponse, LineItemInput, PaginatedBills, SaveBillRequest,
    SaveBillResponse, SuccessResponse,
};
pub use images::{ExtractBillRequest, UploadImageRequest, UploadImageResponse};

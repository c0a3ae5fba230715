pub mod bill;
pub mod query;

pub use bill::{is_base64_image, BillData, BillRecord, LineItem, LEGACY_IMAGE_PREFIX};
pub use query::{
    BillFilter, BillSort, BillStats, PageRequest, Pagination, SortDirection, SortField,
};

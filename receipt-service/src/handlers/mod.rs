pub mod bills;
pub mod extraction;
pub mod health;
pub mod images;

pub use bills::{bill_stats, delete_bill, get_bill, list_bills, save_bill};
pub use extraction::extract_bill;
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use images::{delete_orphan_image, upload_image};

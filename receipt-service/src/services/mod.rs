pub mod database;
pub mod image_store;
pub mod providers;

pub use database::{BillPage, BillRepository, SavedBill};
pub use image_store::{ImageStore, IMAGES_URL_PREFIX};
pub use providers::{build_extractor, BillExtractor, MockExtractor, ProviderError};

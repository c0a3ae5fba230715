#![allow(dead_code)]

use receipt_service::config::ReceiptConfig;
use receipt_service::models::BillRecord;
use receipt_service::services::{BillExtractor, BillRepository, MockExtractor};
use receipt_service::startup::Application;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// 1x1 transparent PNG.
pub const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub fn data_url(subtype: &str) -> String {
    format!("data:image/{};base64,{}", subtype, PNG_1X1)
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub bills: BillRepository,
    pub images_dir: PathBuf,
    pub client: reqwest::Client,
    // Dropped last; removes the database and image directory.
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_extractor(Arc::new(MockExtractor::default())).await
    }

    pub async fn spawn_with_extractor(extractor: Arc<dyn BillExtractor>) -> Self {
        Self::spawn_configured(extractor, |_| {}).await
    }

    pub async fn spawn_configured(
        extractor: Arc<dyn BillExtractor>,
        configure: impl FnOnce(&mut ReceiptConfig),
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_config(dir.path());
        configure(&mut config);
        let images_dir = PathBuf::from(&config.storage.images_dir);

        let app = Application::build_with_extractor(config, extractor)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let bills = app.bills().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            bills,
            images_dir,
            client,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn upload_image(&self, bill_id: &str, image_data: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/upload-image"))
            .json(&json!({ "billId": bill_id, "imageData": image_data }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn save_bill(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/bills"))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub fn image_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.images_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

pub fn test_config(root: &Path) -> ReceiptConfig {
    let mut config = ReceiptConfig::load().expect("Failed to load configuration");
    config.common.port = 0;
    config.database.url = format!("sqlite://{}", root.join("bills.db").display());
    config.database.max_connections = 5;
    config.storage.images_dir = root.join("receipts-images").display().to_string();
    config
}

/// Open a repository on a fresh database in `dir`.
pub async fn repository(dir: &TempDir) -> BillRepository {
    let url = format!("sqlite://{}", dir.path().join("bills.db").display());
    let bills = BillRepository::connect(&url, 2)
        .await
        .expect("Failed to open database");
    bills.run_migrations().await.expect("Failed to migrate");
    bills
}

pub fn bill_json(id: &str, store_name: &str, date: &str, total: f64) -> Value {
    json!({
        "id": id,
        "storeName": store_name,
        "date": date,
        "subtotal": total,
        "tax": 0.0,
        "total": total,
        "currency": "USD",
        "lineItems": [],
        "imagePath": format!("/receipts-images/{}.jpeg", id)
    })
}

pub fn bill_record(id: &str, store_name: &str, date: &str, total: f64) -> BillRecord {
    BillRecord {
        id: id.to_string(),
        store_name: store_name.to_string(),
        date: date.to_string(),
        subtotal: total,
        tax: 0.0,
        total,
        currency: "USD".to_string(),
        line_items: vec![],
        image_path: Some(format!("/receipts-images/{}.jpeg", id)),
        image_data: None,
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
    }
}

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{bill_json, data_url, TestApp, PNG_1X1};
use receipt_service::services::MockExtractor;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn uploaded_image_is_served_back() {
    let app = TestApp::spawn().await;

    let body: Value = app
        .upload_image("served", &data_url("png"))
        .await
        .json()
        .await
        .unwrap();
    let path = body["imagePath"].as_str().unwrap();
    assert_eq!(path, "/receipts-images/served.png");

    let response = app.get(path).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), STANDARD.decode(PNG_1X1).unwrap().as_slice());
}

#[tokio::test]
async fn jpg_is_stored_as_jpeg_and_bare_base64_defaults_to_jpeg() {
    let app = TestApp::spawn().await;

    let body: Value = app
        .upload_image("a", &data_url("jpg"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["imagePath"], "/receipts-images/a.jpeg");

    let body: Value = app.upload_image("b", PNG_1X1).await.json().await.unwrap();
    assert_eq!(body["imagePath"], "/receipts-images/b.jpeg");

    assert_eq!(app.image_files(), vec!["a.jpeg", "b.jpeg"]);
}

#[tokio::test]
async fn reupload_in_new_format_replaces_old_file() {
    let app = TestApp::spawn().await;

    app.upload_image("x", &data_url("jpeg")).await;
    let body: Value = app
        .upload_image("x", &data_url("png"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["imagePath"], "/receipts-images/x.png");
    assert_eq!(app.image_files(), vec!["x.png"]);
}

#[tokio::test]
async fn traversal_ids_are_rejected_before_touching_disk() {
    let app = TestApp::spawn().await;

    for bill_id in ["../escape", "a/b", "a\\b", ".."] {
        let response = app.upload_image(bill_id, &data_url("png")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "id: {bill_id}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Invalid bill ID");
    }

    let response = app.delete("/api/delete-image/..%5Cescape").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.image_files().is_empty());
}

#[tokio::test]
async fn missing_fields_and_bad_formats_are_400() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/upload-image"))
        .json(&json!({ "billId": "only-id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.upload_image("svg", &data_url("svg+xml")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Allowed formats"));

    let response = app
        .upload_image("garbage", "data:image/png;base64,@@not-base64@@")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(app.image_files().is_empty());
}

#[tokio::test]
async fn oversized_image_is_rejected_and_nothing_written() {
    let app = TestApp::spawn_configured(Arc::new(MockExtractor::default()), |config| {
        config.storage.max_image_bytes = 1024;
    })
    .await;

    let payload = STANDARD.encode(vec![0u8; 4096]);
    let response = app
        .upload_image("big", &format!("data:image/png;base64,{}", payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("exceeds maximum allowed size"));

    assert!(app.image_files().is_empty());
}

#[tokio::test]
async fn orphan_delete_depends_on_bill_existence() {
    let app = TestApp::spawn().await;

    // Unknown bill: images are removed (or were never there).
    app.upload_image("orphan", &data_url("png")).await;
    let response = app.delete("/api/delete-image/orphan").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true}));
    assert!(app.image_files().is_empty());

    let response = app.delete("/api/delete-image/never-uploaded").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Saved bill: the image belongs to it and stays.
    app.upload_image("kept", &data_url("png")).await;
    app.save_bill(&bill_json("kept", "Acme", "2024-03-01", 3.0)).await;

    let response = app.delete("/api/delete-image/kept").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Cannot delete image for existing bill");
    assert_eq!(app.image_files(), vec!["kept.png"]);
}

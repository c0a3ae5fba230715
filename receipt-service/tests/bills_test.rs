mod common;

use common::{bill_json, data_url, TestApp};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn upload_save_and_fetch_round_trip() {
    let app = TestApp::spawn().await;

    let response = app.upload_image("b1", &data_url("jpeg")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["imagePath"], "/receipts-images/b1.jpeg");

    let mut bill = bill_json("b1", "Acme", "2024-03-01", 11.0);
    bill["subtotal"] = json!(10.0);
    bill["tax"] = json!(1.0);
    let response = app.save_bill(&bill).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true, "id": "b1"}));

    let fetched: Value = app.get("/api/bills/b1").await.json().await.unwrap();
    assert_eq!(fetched["id"], "b1");
    assert_eq!(fetched["storeName"], "Acme");
    assert_eq!(fetched["total"], 11.0);
    assert_eq!(fetched["imagePath"], "/receipts-images/b1.jpeg");
    assert_eq!(fetched["lineItems"], json!([]));
    assert!(fetched.get("imageData").is_none());
    assert!(!fetched["createdAt"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn resave_overwrites_fields_but_keeps_created_at() {
    let app = TestApp::spawn().await;

    let mut first = bill_json("b2", "Acme", "2024-03-01", 11.0);
    first["createdAt"] = json!("2024-03-01T09:00:00.000Z");
    assert_eq!(app.save_bill(&first).await.status(), StatusCode::OK);

    let mut second = bill_json("b2", "Acme Market", "2024-03-02", 42.5);
    second["createdAt"] = json!("2030-01-01T00:00:00.000Z");
    second["lineItems"] = json!([{"description": "Cheese", "quantity": 2, "price": 21.25}]);
    assert_eq!(app.save_bill(&second).await.status(), StatusCode::OK);

    let fetched: Value = app.get("/api/bills/b2").await.json().await.unwrap();
    assert_eq!(fetched["storeName"], "Acme Market");
    assert_eq!(fetched["date"], "2024-03-02");
    assert_eq!(fetched["total"], 42.5);
    assert_eq!(fetched["lineItems"][0]["description"], "Cheese");
    assert_eq!(fetched["createdAt"], "2024-03-01T09:00:00.000Z");
}

#[tokio::test]
async fn missing_bill_is_404() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/bills/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bill not found");
}

#[tokio::test]
async fn invalid_save_bodies_are_rejected_with_json_errors() {
    let app = TestApp::spawn().await;

    let mut no_id = bill_json("x", "Acme", "2024-03-01", 1.0);
    no_id["id"] = json!("");
    let mut inline_image = bill_json("y", "Acme", "2024-03-01", 1.0);
    inline_image["imagePath"] = json!("data:image/png;base64,AAAA");
    let mut text_total = bill_json("z", "Acme", "2024-03-01", 1.0);
    text_total["total"] = json!("eleven");
    let mut no_store = bill_json("w", "Acme", "2024-03-01", 1.0);
    no_store["storeName"] = json!("");

    for body in [no_id, inline_image, text_total, no_store] {
        let response = app.save_bill(&body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }

    let response = app
        .client
        .post(app.url("/api/bills"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = response.json().await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("Invalid request body"));

    let listed: Value = app.get("/api/bills").await.json().await.unwrap();
    assert_eq!(listed, json!([]));
}

async fn seed_months(app: &TestApp) {
    let bills = [
        ("jan-1", "Corner Market", "2024-01-15", 20.0),
        ("feb-1", "Bakery", "2024-02-03", 8.5),
        ("feb-2", "Corner Market", "2024-02-20", 31.0),
        ("feb-3", "Hardware Hub", "2024-02-11", 54.25),
        ("mar-1", "Bakery", "2024-03-09", 12.0),
        ("apr-1", "Hardware Hub", "2024-04-30", 99.99),
    ];
    for (id, store, date, total) in bills {
        let response = app.save_bill(&bill_json(id, store, date, total)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

fn ids(bills: &Value) -> Vec<String> {
    bills
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn february_range_returns_only_february_in_requested_order() {
    let app = TestApp::spawn().await;
    seed_months(&app).await;

    let body: Value = app
        .get("/api/bills?dateFrom=2024-02-01&dateTo=2024-02-29&sortField=date&sortDirection=asc")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ids(&body), vec!["feb-1", "feb-3", "feb-2"]);

    let body: Value = app
        .get("/api/bills?dateFrom=2024-02-01&dateTo=2024-02-29&sortField=total&sortDirection=desc")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ids(&body), vec!["feb-3", "feb-2", "feb-1"]);
}

#[tokio::test]
async fn list_defaults_to_newest_first() {
    let app = TestApp::spawn().await;
    seed_months(&app).await;

    let body: Value = app.get("/api/bills").await.json().await.unwrap();
    assert_eq!(
        ids(&body),
        vec!["apr-1", "mar-1", "feb-2", "feb-3", "feb-1", "jan-1"]
    );
}

#[tokio::test]
async fn filters_combine() {
    let app = TestApp::spawn().await;
    seed_months(&app).await;

    let body: Value = app
        .get("/api/bills?storeName=corner&sortDirection=asc")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ids(&body), vec!["jan-1", "feb-2"]);

    let body: Value = app
        .get("/api/bills?minAmount=10&maxAmount=50&sortField=total&sortDirection=asc")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ids(&body), vec!["mar-1", "jan-1", "feb-2"]);

    let body: Value = app
        .get("/api/bills?searchTerm=2024-03&storeName=")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ids(&body), vec!["mar-1"]);
}

#[tokio::test]
async fn pages_concatenate_to_the_full_sorted_set() {
    let app = TestApp::spawn().await;
    seed_months(&app).await;

    let full: Value = app
        .get("/api/bills?sortField=storeName&sortDirection=asc")
        .await
        .json()
        .await
        .unwrap();

    let mut collected = Vec::new();
    for page in 1..=3 {
        let body: Value = app
            .get(&format!(
                "/api/bills?sortField=storeName&sortDirection=asc&page={}&pageSize=4",
                page
            ))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(body["pagination"]["currentPage"], page);
        assert_eq!(body["pagination"]["pageSize"], 4);
        assert_eq!(body["pagination"]["totalCount"], 6);
        assert_eq!(body["pagination"]["totalPages"], 2);
        collected.extend(ids(&body["bills"]));
    }

    assert_eq!(collected, ids(&full));
}

#[tokio::test]
async fn empty_result_has_zero_pages() {
    let app = TestApp::spawn().await;

    let body: Value = app.get("/api/bills?page=1").await.json().await.unwrap();
    assert_eq!(body["bills"], json!([]));
    assert_eq!(body["pagination"]["totalCount"], 0);
    assert_eq!(body["pagination"]["totalPages"], 0);
    assert_eq!(body["pagination"]["pageSize"], 20);
}

#[tokio::test]
async fn invalid_query_parameters_are_400() {
    let app = TestApp::spawn().await;

    for query in [
        "minAmount=abc",
        "maxAmount=1e999",
        "page=0",
        "pageSize=-1",
        "sortField=color",
        "sortDirection=sideways",
    ] {
        let response = app.get(&format!("/api/bills?{}", query)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query: {query}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn stats_sum_the_filtered_set() {
    let app = TestApp::spawn().await;
    seed_months(&app).await;

    let body: Value = app
        .get("/api/stats?dateFrom=2024-02-01&dateTo=2024-02-29")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 3);
    assert_eq!(body["total"], 93.75);

    let body: Value = app.get("/api/stats?storeName=nowhere").await.json().await.unwrap();
    assert_eq!(body, json!({"total": 0.0, "count": 0}));
}

#[tokio::test]
async fn delete_removes_row_and_images() {
    let app = TestApp::spawn().await;

    app.upload_image("gone", &data_url("png")).await;
    app.save_bill(&bill_json("gone", "Acme", "2024-03-01", 5.0)).await;
    assert_eq!(app.image_files(), vec!["gone.png"]);

    let response = app.delete("/api/bills/gone").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true}));

    assert_eq!(app.get("/api/bills/gone").await.status(), StatusCode::NOT_FOUND);
    assert!(app.image_files().is_empty());

    // Deleting again is still a success.
    assert_eq!(app.delete("/api/bills/gone").await.status(), StatusCode::OK);
}

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use common::{location, site};
use mysite::models::UserFlags;
use serde_json::{json, Value};

const MIB: usize = 1024 * 1024;

fn csv_file(data: String) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(data.into_bytes()).file_name("data.csv").mime_type("text/csv"),
    )
}

fn png(name: &str, size: usize) -> Part {
    Part::bytes(vec![0x89u8; size]).file_name(name).mime_type("image/png")
}

#[tokio::test]
async fn test_rest_product_writes_need_login() {
    let site = site().await;

    let response = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Laptop", "price": "1999.00", "description": "Fast" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_rest_product_lifecycle() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;

    let response = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Laptop", "price": "1999.00", "description": "Fast", "discount": 5 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let pk = created["pk"].as_i64().expect("pk");
    assert_eq!(created["price"], "1999.00");
    assert_eq!(created["created_by"], alice.id);

    let listed: Value = site.server.get("/shop/api/products/?search=lapt").await.json();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let patched: Value = site
        .server
        .patch(&format!("/shop/api/products/{}/", pk))
        .json(&json!({ "discount": 10 }))
        .await
        .json();
    assert_eq!(patched["discount"], 10);
    assert_eq!(patched["name"], "Laptop");

    // Writes drop the cached listing
    let listed: Value = site.server.get("/shop/api/products/?search=lapt").await.json();
    assert_eq!(listed[0]["discount"], 10);

    site.server
        .delete(&format!("/shop/api/products/{}/", pk))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    site.server
        .get(&format!("/shop/api/products/{}/", pk))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rest_product_validation() {
    let site = site().await;
    site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;

    let response = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Laptop", "price": "abc", "discount": 500 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"]["details"]["price"].is_array());
    assert!(body["error"]["details"]["discount"].is_array());
}

#[tokio::test]
async fn test_products_csv_download_has_header() {
    let site = site().await;

    let response = site.server.get("/shop/api/products/download_csv/").await;
    response.assert_status_ok();
    assert!(response
        .text()
        .starts_with("name,description,price,discount,created_by"));
}

#[tokio::test]
async fn test_rest_orders_filter() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;

    let product: Value = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Phone", "price": "999.00", "description": "" }))
        .await
        .json();

    let response = site
        .server
        .post("/shop/api/orders/")
        .json(&json!({
            "delivery_address": "123 Main st",
            "promocode": "SALE",
            "user": alice.id,
            "products": [product["pk"]],
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let found: Value = site.server.get("/shop/api/orders/?promocode=SALE").await.json();
    assert_eq!(found.as_array().map(Vec::len), Some(1));
    assert_eq!(found[0]["products"], json!([product["pk"]]));

    let none: Value = site.server.get("/shop/api/orders/?promocode=OTHER").await.json();
    assert_eq!(none, json!([]));

    site.server
        .get("/shop/api/orders/?user=abc")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_create_page_needs_permission() {
    let site = site().await;
    site.create_user("alice", UserFlags::default(), &[]).await;

    let response = site.server.get("/shop/products/create/").await;
    response.assert_status(StatusCode::FOUND);
    assert!(location(&response).starts_with("/myauth/login/?next="));

    site.login("alice").await;
    site.server
        .get("/shop/products/create/")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_orders_export_is_staff_only() {
    let site = site().await;
    site.create_user("alice", UserFlags::default(), &[]).await;
    site.create_user(
        "boss",
        UserFlags {
            is_staff: true,
            is_superuser: false,
        },
        &[],
    )
    .await;

    site.login("alice").await;
    site.server
        .get("/shop/orders/export/")
        .await
        .assert_status(StatusCode::FORBIDDEN);

    site.login("boss").await;
    let body: Value = site.server.get("/shop/orders/export/").await.json();
    assert_eq!(body["orders"], json!([]));
}

#[tokio::test]
async fn test_feeds_and_sitemap() {
    let site = site().await;
    site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;
    site.server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Tablet", "price": "499.00", "description": "Big screen" }))
        .await
        .assert_status(StatusCode::CREATED);

    let feed = site.server.get("/shop/products/latest/feed/").await;
    feed.assert_status_ok();
    assert_eq!(
        feed.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/rss+xml; charset=utf-8")
    );
    assert!(feed.text().contains("<title>Tablet</title>"));

    let sitemap = site.server.get("/sitemap.xml").await;
    sitemap.assert_status_ok();
    assert!(sitemap.text().contains("http://localhost:8000/shop/products/"));
    assert!(sitemap.text().contains("<changefreq>weekly</changefreq>"));
}

#[tokio::test]
async fn test_missing_page_renders_error_template() {
    let site = site().await;

    let response = site.server.get("/shop/products/424242/").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.text().contains("<html"));
}

#[tokio::test]
async fn test_products_csv_upload() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;

    let csv = format!(
        "name,description,price,discount,created_by\nPhone,{},199.99,5,{}\nCase,,9,0,\n",
        "d".repeat(5 * MIB / 2),
        alice.id
    );
    site.server
        .post("/shop/api/products/upload_csv/")
        .multipart(csv_file(csv.clone()))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    site.login("alice").await;
    let response = site
        .server
        .post("/shop/api/products/upload_csv/")
        .multipart(csv_file(csv))
        .await;
    response.assert_status_ok();
    let created: Value = response.json();
    assert_eq!(created.as_array().map(Vec::len), Some(2));
    assert_eq!(created[0]["name"], "Phone");
    assert_eq!(created[0]["created_by"], alice.id);
    assert_eq!(created[1]["created_by"], Value::Null);

    let listed: Value = site.server.get("/shop/api/products/").await.json();
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_products_csv_upload_errors() {
    let site = site().await;
    site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;

    let missing = site
        .server
        .post("/shop/api/products/upload_csv/")
        .multipart(MultipartForm::new().add_text("note", "no file"))
        .await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = missing.json();
    assert_eq!(body["error"]["message"], "No file was submitted.");

    let bad = "name,description,price,discount,created_by\nOk,,1,0,\nBad,,abc,0,\n".to_string();
    let response = site
        .server
        .post("/shop/api/products/upload_csv/")
        .multipart(csv_file(bad))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let listed: Value = site.server.get("/shop/api/products/").await.json();
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_orders_csv_upload() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;
    site.login("alice").await;

    let mut pks = Vec::new();
    for name in ["Phone", "Case"] {
        let product: Value = site
            .server
            .post("/shop/api/products/")
            .json(&json!({ "name": name, "price": "10.00", "description": "" }))
            .await
            .json();
        pks.push(product["pk"].as_i64().expect("pk"));
    }

    let csv = format!(
        "delivery_address,promocode,user,product\n\"1 Main st\",SALE,{user},\"{a},{b}\"\n\"2 Side st\",,{user},{a}\n",
        user = alice.id,
        a = pks[0],
        b = pks[1]
    );
    let response = site
        .server
        .post("/shop/api/orders/upload_csv/")
        .multipart(csv_file(csv))
        .await;
    response.assert_status_ok();
    let created: Value = response.json();
    assert_eq!(created.as_array().map(Vec::len), Some(2));
    assert_eq!(created[0]["delivery_address"], "1 Main st");
    assert_eq!(created[0]["products"], json!(pks));
    assert_eq!(created[1]["products"], json!([pks[0]]));

    let unknown = format!("delivery_address,promocode,user,product\nx,,{},424242\n", alice.id);
    site.server
        .post("/shop/api/orders/upload_csv/")
        .multipart(csv_file(unknown))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let all: Value = site.server.get("/shop/api/orders/").await.json();
    assert_eq!(all.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_product_update_with_preview_and_images() {
    let site = site().await;
    site.create_user(
        "owner",
        UserFlags::default(),
        &["shopapp.add_product", "shopapp.change_product"],
    )
    .await;
    site.login("owner").await;

    let product: Value = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Laptop", "price": "10.00", "description": "Old" }))
        .await
        .json();
    let pk = product["pk"].as_i64().expect("pk");

    // Together above the framework's default body limit, each below the media limit
    let form = MultipartForm::new()
        .add_text("name", "Laptop Pro")
        .add_text("price", "20.50")
        .add_text("description", "New")
        .add_text("discount", "5")
        .add_part("preview", png("cover.png", 3 * MIB / 2))
        .add_part("images", png("front.png", 3 * MIB / 2))
        .add_part("images", png("back.png", 3 * MIB / 2));
    let response = site
        .server
        .post(&format!("/shop/products/{}/update/", pk))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), format!("/shop/products/{}/", pk));

    let updated = site
        .state
        .product_service
        .get_with_images(pk)
        .await
        .expect("product");
    assert_eq!(updated.product.name, "Laptop Pro");
    assert_eq!(updated.product.discount, 5);
    assert_eq!(
        updated.product.preview.as_deref(),
        Some(format!("products/product_{}/preview/cover.png", pk).as_str())
    );
    assert_eq!(updated.images.len(), 2);

    let served = site.server.get(&format!("/media/{}", updated.images[0].image)).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().len(), 3 * MIB / 2);
}

#[tokio::test]
async fn test_product_update_rejects_bad_image() {
    let site = site().await;
    site.create_user(
        "owner",
        UserFlags::default(),
        &["shopapp.add_product", "shopapp.change_product"],
    )
    .await;
    site.login("owner").await;

    let product: Value = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Laptop", "price": "10.00", "description": "Old" }))
        .await
        .json();
    let pk = product["pk"].as_i64().expect("pk");

    let script = Part::bytes(b"#!/bin/sh".to_vec())
        .file_name("run.sh")
        .mime_type("application/x-sh");
    let form = MultipartForm::new()
        .add_text("name", "Renamed")
        .add_text("price", "20")
        .add_part("images", script);
    site.server
        .post(&format!("/shop/products/{}/update/", pk))
        .multipart(form)
        .await
        .assert_status_ok();

    let unchanged = site
        .state
        .product_service
        .get_with_images(pk)
        .await
        .expect("product");
    assert_eq!(unchanged.product.name, "Laptop");
    assert!(unchanged.images.is_empty());
}

#[tokio::test]
async fn test_order_detail_needs_view_permission() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;
    site.create_user("clerk", UserFlags::default(), &["shopapp.view_order"]).await;

    site.login("alice").await;
    let product: Value = site
        .server
        .post("/shop/api/products/")
        .json(&json!({ "name": "Phone", "price": "999.00", "description": "" }))
        .await
        .json();
    let order: Value = site
        .server
        .post("/shop/api/orders/")
        .json(&json!({
            "delivery_address": "123 Main st",
            "promocode": "SALE",
            "user": alice.id,
            "products": [product["pk"]],
        }))
        .await
        .json();
    let url = format!("/shop/orders/{}/", order["pk"]);

    site.server.get(&url).await.assert_status(StatusCode::FORBIDDEN);

    site.server.get("/myauth/logout/").await;
    let anonymous = site.server.get(&url).await;
    anonymous.assert_status(StatusCode::FOUND);
    assert!(location(&anonymous).starts_with("/myauth/login/?next="));

    site.login("clerk").await;
    let page = site.server.get(&url).await;
    page.assert_status_ok();
    assert!(page.text().contains("Delivery address: 123 Main st"));
    assert!(page.text().contains("Phone for $999.00"));

    site.server
        .get("/shop/orders/424242/")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_orders_missing_user() {
    let site = site().await;
    let alice = site.create_user("alice", UserFlags::default(), &[]).await;

    let anonymous = site.server.get("/shop/users/424242/orders/").await;
    anonymous.assert_status(StatusCode::FOUND);

    site.login("alice").await;
    site.server
        .get("/shop/users/424242/orders/")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    site.server
        .get("/shop/users/424242/orders/export")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    site.server
        .get(&format!("/shop/users/{}/orders/", alice.id))
        .await
        .assert_status_ok();
    let export: Value = site
        .server
        .get(&format!("/shop/users/{}/orders/export", alice.id))
        .await
        .json();
    assert_eq!(export["username"], "alice");
    assert_eq!(export["orders"], json!([]));
}

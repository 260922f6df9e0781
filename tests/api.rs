mod common;

use axum::http::StatusCode;
use common::site;
use serde_json::{json, Value};

#[tokio::test]
async fn test_hello() {
    let site = site().await;
    site.server
        .get("/api/hello/")
        .await
        .assert_json(&json!({ "message": "Hello world!" }));
}

#[tokio::test]
async fn test_groups_create_and_list() {
    let site = site().await;

    let response = site.server.post("/api/groups/").json(&json!({ "name": "editors" })).await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["name"], "editors");

    let groups: Value = site.server.get("/api/groups/").await.json();
    assert_eq!(groups, json!([{ "pk": created["pk"], "name": "editors" }]));

    let duplicate = site.server.post("/api/groups/").json(&json!({ "name": "editors" })).await;
    duplicate.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = duplicate.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_groups_name_required() {
    let site = site().await;
    site.server
        .post("/api/groups/")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

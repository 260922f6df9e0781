//! Small JSON API
//!
//! - GET /api/hello/ - Greeting
//! - GET,POST /api/groups/ - List or create groups

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Group;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/hello/", get(hello))
        .route("/api/groups/", get(list_groups).post(create_group))
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "Hello world!" }))
}

async fn list_groups(State(state): State<AppState>) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(state.user_service.list_groups().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub name: String,
}

async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = state.user_service.create_group(&req.name).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

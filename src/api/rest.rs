//! Shop REST API
//!
//! Products:
//! - GET,POST /shop/api/products/
//! - GET,PUT,PATCH,DELETE /shop/api/products/{pk}/
//! - GET /shop/api/products/download_csv/
//! - POST /shop/api/products/upload_csv/
//!
//! Orders:
//! - GET,POST /shop/api/orders/
//! - GET,PUT,PATCH,DELETE /shop/api/orders/{pk}/
//! - POST /shop/api/orders/upload_csv/
//!
//! Reads are public, writes need an authenticated session.

use axum::{
    extract::{Multipart, Path, Query, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::forms::MultipartForm;
use crate::api::middleware::{ApiError, AppState, CurrentUser};
use crate::api::responses::csv_attachment;
use crate::models::{Order, OrderForm, OrderQuery, Product, ProductForm, ProductQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop/api/products/", get(list_products).post(create_product))
        .route("/shop/api/products/download_csv/", get(download_products_csv))
        .route("/shop/api/products/upload_csv/", post(upload_products_csv))
        .route(
            "/shop/api/products/{pk}/",
            get(get_product)
                .put(replace_product)
                .patch(patch_product)
                .delete(delete_product),
        )
        .route("/shop/api/orders/", get(list_orders).post(create_order))
        .route("/shop/api/orders/upload_csv/", post(upload_orders_csv))
        .route(
            "/shop/api/orders/{pk}/",
            get(get_order).put(replace_order).patch(patch_order).delete(delete_order),
        )
}

/// Query parameters for product listings
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
}

impl ProductListParams {
    fn query(&self) -> ProductQuery {
        ProductQuery::from_params(self.search.as_deref(), self.ordering.as_deref())
    }
}

/// Query parameters for order listings
#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub delivery_address: Option<String>,
    pub promocode: Option<String>,
    pub user: Option<String>,
    pub ordering: Option<String>,
}

impl OrderListParams {
    fn query(&self) -> Result<OrderQuery, ApiError> {
        let user_id = match self.user.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                ApiError::with_details(
                    "VALIDATION_ERROR",
                    "Invalid filter",
                    serde_json::json!({ "user": ["Select a valid choice."] }),
                )
            })?),
        };

        Ok(OrderQuery {
            delivery_address: self.delivery_address.clone().filter(|v| !v.is_empty()),
            promocode: self.promocode.clone().filter(|v| !v.is_empty()),
            user_id,
            ordering: OrderQuery::parse_ordering(self.ordering.as_deref()),
        })
    }
}

/// The `file` part of a multipart upload
async fn uploaded_csv(multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let form = MultipartForm::read(multipart).await?;
    form.file("file")
        .map(|f| f.data)
        .ok_or_else(|| {
            ApiError::with_details(
                "VALIDATION_ERROR",
                "No file was submitted.",
                serde_json::json!({ "file": ["No file was submitted."] }),
            )
        })
}

// ============================================================================
// Products
// ============================================================================

/// GET /shop/api/products/ - cached per query string
async fn list_products(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    Query(params): Query<ProductListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = state
        .product_service
        .list_cached(raw.as_deref().unwrap_or(""), &params.query())
        .await?;
    Ok(Json(body))
}

async fn create_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ProductForm>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let actor = current.require_api_user()?;
    let product = state.product_service.create(&form, Some(actor.id)).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.product_service.get(pk).await?))
}

async fn replace_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Json(form): Json<ProductForm>,
) -> Result<Json<Product>, ApiError> {
    current.require_api_user()?;
    Ok(Json(state.product_service.update(pk, &form, false).await?))
}

async fn patch_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Json(form): Json<ProductForm>,
) -> Result<Json<Product>, ApiError> {
    current.require_api_user()?;
    Ok(Json(state.product_service.update(pk, &form, true).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<StatusCode, ApiError> {
    current.require_api_user()?;
    state.product_service.delete(pk).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /shop/api/products/download_csv/ - same filters as the listing
async fn download_products_csv(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<Response, ApiError> {
    let products = state.product_service.list(&params.query()).await?;
    let data = state.product_service.to_csv(&products)?;
    Ok(csv_attachment("products-export.csv", data))
}

async fn upload_products_csv(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Vec<Product>>, ApiError> {
    current.require_api_user()?;
    let data = uploaded_csv(multipart).await?;
    Ok(Json(state.product_service.import_csv(&data).await?))
}

// ============================================================================
// Orders
// ============================================================================

async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.order_service.list(&params.query()?).await?))
}

async fn create_order(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<OrderForm>,
) -> Result<Response, ApiError> {
    current.require_api_user()?;
    let order = state.order_service.create(&form).await?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

async fn get_order(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.order_service.get(pk).await?))
}

async fn replace_order(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Json(form): Json<OrderForm>,
) -> Result<Json<Order>, ApiError> {
    current.require_api_user()?;
    Ok(Json(state.order_service.update(pk, &form, false).await?))
}

async fn patch_order(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Json(form): Json<OrderForm>,
) -> Result<Json<Order>, ApiError> {
    current.require_api_user()?;
    Ok(Json(state.order_service.update(pk, &form, true).await?))
}

async fn delete_order(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<StatusCode, ApiError> {
    current.require_api_user()?;
    state.order_service.delete(pk).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_orders_csv(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Vec<Order>>, ApiError> {
    current.require_api_user()?;
    let data = uploaded_csv(multipart).await?;
    Ok(Json(state.order_service.import_csv(&data).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderOrderField;

    #[test]
    fn test_order_params_query() {
        let params = OrderListParams {
            delivery_address: Some(String::new()),
            promocode: Some("SALE".into()),
            user: Some("3".into()),
            ordering: Some("-created_at".into()),
        };
        let query = params.query().unwrap();
        assert_eq!(query.delivery_address, None);
        assert_eq!(query.promocode.as_deref(), Some("SALE"));
        assert_eq!(query.user_id, Some(3));
        assert_eq!(query.ordering, vec![(OrderOrderField::CreatedAt, true)]);
    }

    #[test]
    fn test_order_params_bad_user() {
        let params = OrderListParams {
            user: Some("abc".into()),
            ..Default::default()
        };
        assert!(params.query().is_err());
    }
}

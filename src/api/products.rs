//! Shop product pages
//!
//! - GET /shop/ - Shop index
//! - GET /shop/products/ - Non-archived products
//! - GET,POST /shop/products/create/ - Create (needs `shopapp.add_product`)
//! - GET /shop/products/export/ - Cached products export (JSON)
//! - GET /shop/products/latest/feed/ - RSS feed of the newest products
//! - GET /shop/products/{pk}/ - Product with images
//! - GET,POST /shop/products/{pk}/update/ - Update (owner with change permission, or superuser)
//! - GET,POST /shop/products/{pk}/confirm-archive/ - Archive

use axum::{
    extract::{Multipart, Path, State},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::forms::{echo, product_form, MultipartForm};
use crate::api::middleware::{found, require_perm, AppState, CurrentUser, PageError};
use crate::api::responses::{render, render_form, rss};
use crate::models::Product;
use crate::services::{FormErrors, ProductServiceError, ProductsExport, PERM_ADD_PRODUCT};

const FORM_FIELDS: [&str; 4] = ["name", "price", "description", "discount"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop/", get(shop_index))
        .route("/shop/products/", get(products_list))
        .route("/shop/products/create/", get(create_form).post(create_submit))
        .route("/shop/products/export/", get(export_data))
        .route("/shop/products/latest/feed/", get(latest_feed))
        .route("/shop/products/{pk}/", get(product_detail))
        .route("/shop/products/{pk}/update/", get(update_form).post(update_submit))
        .route("/shop/products/{pk}/confirm-archive/", get(archive_confirm).post(archive_submit))
}

async fn shop_index(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let products = [("Laptop", 1999), ("Desktop", 2999), ("Smartphone", 999)]
        .iter()
        .map(|(name, price)| json!({ "name": name, "price": price }))
        .collect::<Vec<_>>();

    let mut context = TeraContext::new();
    context.insert("products", &products);
    render(&state, &current, "shopapp/shop_index.html", &context)
}

async fn products_list(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let products = state.product_service.list_active().await?;
    let can_create = match &current.user {
        Some(user) => state.product_service.can_create(user).await?,
        None => false,
    };

    let mut context = TeraContext::new();
    context.insert("products", &products);
    context.insert("can_create", &can_create);
    render(&state, &current, "shopapp/products_list.html", &context)
}

async fn create_form(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    require_perm(&state, &current, PERM_ADD_PRODUCT).await?;

    let mut context = TeraContext::new();
    context.insert("form", &echo(&[], &FORM_FIELDS));
    render_form(&state, &current, "shopapp/product_form.html", context, &FormErrors::new())
}

async fn create_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let actor = require_perm(&state, &current, PERM_ADD_PRODUCT).await?;
    let submitted = MultipartForm::read(multipart)
        .await
        .map_err(|e| PageError::BadRequest(e.error.message))?;

    let form = product_form(&submitted.fields);
    match state
        .product_service
        .create_as(actor, &form, submitted.file("preview"))
        .await
    {
        Ok(_) => Ok(found("/shop/products/")),
        Err(ProductServiceError::ValidationError(errors)) => {
            let mut context = TeraContext::new();
            context.insert("form", &echo(&submitted.fields, &FORM_FIELDS));
            Ok(render_form(&state, &current, "shopapp/product_form.html", context, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn export_data(State(state): State<AppState>) -> Result<Json<ProductsExport>, PageError> {
    Ok(Json(state.product_service.export_data().await?))
}

async fn latest_feed(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    let feed = state.product_service.latest_feed().await?;
    rss(&state, &current, &feed)
}

async fn product_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let product = state.product_service.get_with_images(pk).await?;
    let can_change = match &current.user {
        Some(user) => state.product_service.can_change(user, &product.product).await?,
        None => false,
    };

    let mut context = TeraContext::new();
    context.insert("product", &product);
    context.insert("can_change", &can_change);
    render(&state, &current, "shopapp/product_detail.html", &context)
}

/// The product, if the visitor may change it
async fn editable_product(state: &AppState, current: &CurrentUser, pk: i64) -> Result<Product, PageError> {
    let actor = current.require_login(&state.config.auth.login_url)?;
    let product = state.product_service.get(pk).await?;
    if !state.product_service.can_change(actor, &product).await? {
        return Err(PageError::Forbidden("You may not change this product".into()));
    }
    Ok(product)
}

fn product_echo(product: &Product) -> serde_json::Value {
    json!({
        "name": product.name,
        "price": product.price.to_string(),
        "description": product.description,
        "discount": product.discount.to_string(),
    })
}

async fn update_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let product = editable_product(&state, &current, pk).await?;

    let mut context = TeraContext::new();
    context.insert("form", &product_echo(&product));
    context.insert("product", &product);
    render_form(&state, &current, "shopapp/product_form.html", context, &FormErrors::new())
}

async fn update_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let product = editable_product(&state, &current, pk).await?;
    let actor = current.require_login(&state.config.auth.login_url)?;
    let submitted = MultipartForm::read(multipart)
        .await
        .map_err(|e| PageError::BadRequest(e.error.message))?;

    let form = product_form(&submitted.fields);
    match state
        .product_service
        .update_as(actor, pk, &form, submitted.file("preview"), submitted.files("images"))
        .await
    {
        Ok(updated) => Ok(found(&updated.product.url())),
        Err(ProductServiceError::ValidationError(errors)) => {
            let mut context = TeraContext::new();
            context.insert("form", &echo(&submitted.fields, &FORM_FIELDS));
            context.insert("product", &product);
            Ok(render_form(&state, &current, "shopapp/product_form.html", context, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn archive_confirm(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let product = state.product_service.get(pk).await?;

    let mut context = TeraContext::new();
    context.insert("product", &product);
    render(&state, &current, "shopapp/product_confirm_archive.html", &context)
}

async fn archive_submit(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<Response, PageError> {
    state.product_service.archive(pk).await?;
    Ok(found("/shop/products/"))
}

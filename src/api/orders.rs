//! Shop order pages
//!
//! - GET /shop/orders/ - All orders (login required)
//! - GET,POST /shop/orders/create/ - Create
//! - GET /shop/orders/export/ - Orders export (staff only)
//! - GET /shop/orders/{pk}/ - Order detail (needs `shopapp.view_order`)
//! - GET,POST /shop/orders/{pk}/update/ - Update
//! - GET,POST /shop/orders/{pk}/confirm-delete/ - Delete
//! - GET /shop/users/{pk}/orders/ - Orders of one user (login required)
//! - GET /shop/users/{pk}/orders/export - Cached orders export of one user

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::forms::order_form;
use crate::api::middleware::{found, require_perm, AppState, CurrentUser, PageError};
use crate::api::responses::{render, render_form};
use crate::models::{Order, OrderWithRelations, Price, Product, User};
use crate::services::{FormErrors, OrderServiceError, OrdersExport, PERM_VIEW_ORDER};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop/orders/", get(orders_list))
        .route("/shop/orders/create/", get(create_form).post(create_submit))
        .route("/shop/orders/export/", get(export_data))
        .route("/shop/orders/{pk}/", get(order_detail))
        .route("/shop/orders/{pk}/update/", get(update_form).post(update_submit))
        .route("/shop/orders/{pk}/confirm-delete/", get(delete_confirm).post(delete_submit))
        .route("/shop/users/{pk}/orders/", get(user_orders))
        .route("/shop/users/{pk}/orders/export", get(user_orders_export))
}

/// An order as shown on pages: relations plus its total
#[derive(Debug, Serialize)]
struct OrderView<'a> {
    order: &'a Order,
    user: &'a User,
    products: &'a [Product],
    total: Price,
}

impl<'a> From<&'a OrderWithRelations> for OrderView<'a> {
    fn from(entry: &'a OrderWithRelations) -> Self {
        Self {
            order: &entry.order,
            user: &entry.user,
            products: &entry.products,
            total: entry.total(),
        }
    }
}

async fn orders_list(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    current.require_login(&state.config.auth.login_url)?;
    let orders = state.order_service.list_all().await?;
    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();

    let mut context = TeraContext::new();
    context.insert("orders", &views);
    render(&state, &current, "shopapp/orders_list.html", &context)
}

/// Order form page with its choices
async fn render_order_form(
    state: &AppState,
    current: &CurrentUser,
    form: serde_json::Value,
    order: Option<&Order>,
    errors: &FormErrors,
) -> Result<Response, PageError> {
    let users = state.user_service.list_users().await?;
    // Existing orders may keep archived products
    let products = match order {
        Some(_) => state.product_service.list(&Default::default()).await?,
        None => state.product_service.list_active().await?,
    };

    let mut context = TeraContext::new();
    context.insert("form", &form);
    context.insert("users", &users);
    context.insert("products", &products);
    if let Some(order) = order {
        context.insert("order", order);
    }
    Ok(render_form(state, current, "shopapp/order_form.html", context, errors)?.into_response())
}

fn order_echo(pairs: &[(String, String)]) -> serde_json::Value {
    let text = |name: &str| {
        pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let products: Vec<i64> = pairs
        .iter()
        .filter(|(n, _)| n == "products")
        .filter_map(|(_, v)| v.trim().parse().ok())
        .collect();

    json!({
        "delivery_address": text("delivery_address"),
        "promocode": text("promocode"),
        "user": text("user").trim().parse::<i64>().ok(),
        "products": products,
    })
}

async fn create_form(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    let form = json!({ "delivery_address": "", "promocode": "", "user": null, "products": [] });
    render_order_form(&state, &current, form, None, &FormErrors::new()).await
}

async fn create_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let result = match order_form(&pairs) {
        Ok(form) => state.order_service.create(&form).await,
        Err(errors) => Err(OrderServiceError::ValidationError(errors)),
    };

    match result {
        Ok(_) => Ok(found("/shop/orders/")),
        Err(OrderServiceError::ValidationError(errors)) => {
            render_order_form(&state, &current, order_echo(&pairs), None, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn export_data(State(state): State<AppState>, current: CurrentUser) -> Result<Json<OrdersExport>, PageError> {
    let user = current.require_login(&state.config.auth.login_url)?;
    if !user.is_staff {
        return Err(PageError::Forbidden("Staff only".into()));
    }
    Ok(Json(state.order_service.export_all().await?))
}

async fn order_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    require_perm(&state, &current, PERM_VIEW_ORDER).await?;
    let entry = state.order_service.get_with_relations(pk).await?;

    let mut context = TeraContext::new();
    context.insert("entry", &OrderView::from(&entry));
    render(&state, &current, "shopapp/order_detail.html", &context)
}

async fn update_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Response, PageError> {
    let order = state.order_service.get(pk).await?;
    let form = json!({
        "delivery_address": order.delivery_address,
        "promocode": order.promocode,
        "user": order.user_id,
        "products": order.product_ids,
    });
    render_order_form(&state, &current, form, Some(&order), &FormErrors::new()).await
}

async fn update_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, PageError> {
    let order = state.order_service.get(pk).await?;
    let result = match order_form(&pairs) {
        Ok(form) => state.order_service.update(pk, &form, false).await,
        Err(errors) => Err(OrderServiceError::ValidationError(errors)),
    };

    match result {
        Ok(updated) => Ok(found(&format!("/shop/orders/{}/", updated.id))),
        Err(OrderServiceError::ValidationError(errors)) => {
            render_order_form(&state, &current, order_echo(&pairs), Some(&order), &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_confirm(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let order = state.order_service.get(pk).await?;

    let mut context = TeraContext::new();
    context.insert("order", &order);
    render(&state, &current, "shopapp/order_confirm_delete.html", &context)
}

async fn delete_submit(State(state): State<AppState>, Path(pk): Path<i64>) -> Result<Response, PageError> {
    state.order_service.delete(pk).await?;
    Ok(found("/shop/orders/"))
}

async fn user_orders(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    current.require_login(&state.config.auth.login_url)?;
    let (owner, orders) = state.order_service.list_for_user(pk).await?;
    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();

    let mut context = TeraContext::new();
    context.insert("owner", &owner);
    context.insert("orders", &views);
    render(&state, &current, "shopapp/user_orders.html", &context)
}

async fn user_orders_export(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Json<serde_json::Value>, PageError> {
    current.require_login(&state.config.auth.login_url)?;
    Ok(Json(state.order_service.export_for_user(pk).await?))
}

//! GET /sitemap.xml

use axum::{extract::State, response::Response, routing::get, Router};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, CurrentUser, PageError};
use crate::api::responses::{with_content_type, XML_CONTENT_TYPE};

pub fn router() -> Router<AppState> {
    Router::new().route("/sitemap.xml", get(sitemap))
}

async fn sitemap(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    let entries = state.sitemap_service.entries().await?;

    let mut context = TeraContext::new();
    context.insert("entries", &entries);
    context.insert("base_url", state.config.server.base_url.trim_end_matches('/'));

    let body = state
        .templates
        .render_page("sitemap.xml", &context, &current.template_vars())?;
    Ok(with_content_type(body, XML_CONTENT_TYPE))
}

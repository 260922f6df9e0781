//! Shared response helpers
//!
//! Rendering of HTML pages, RSS feeds and file downloads.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, CurrentUser, PageError};
use crate::models::Feed;
use crate::services::FormErrors;

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Render an HTML page with the standard variables for `current`
pub fn render(
    state: &AppState,
    current: &CurrentUser,
    template: &str,
    context: &TeraContext,
) -> Result<Html<String>, PageError> {
    let html = state
        .templates
        .render_page(template, context, &current.template_vars())?;
    Ok(Html(html))
}

/// Re-render a form page next to its field errors
pub fn render_form(
    state: &AppState,
    current: &CurrentUser,
    template: &str,
    mut context: TeraContext,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    context.insert("errors", errors);
    render(state, current, template, &context)
}

/// Render a feed as RSS 2.0
pub fn rss(state: &AppState, current: &CurrentUser, feed: &Feed) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("feed", feed);
    context.insert("base_url", state.config.server.base_url.trim_end_matches('/'));

    let body = state
        .templates
        .render_page("feed.xml", &context, &current.template_vars())?;
    Ok(with_content_type(body, RSS_CONTENT_TYPE))
}

/// Response with an explicit content type
pub fn with_content_type(body: impl Into<axum::body::Body>, content_type: &'static str) -> Response {
    let mut response = Response::new(body.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// CSV file download
pub fn csv_attachment(filename: &str, data: Vec<u8>) -> Response {
    let mut response = with_content_type(data, "text/csv; charset=utf-8");
    let disposition = format!("attachment; filename=\"{}\"", filename);
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }
        Err(_) => tracing::warn!("Invalid attachment name: {}", filename),
    }
    response
}

/// Plain text body
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

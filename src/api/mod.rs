//! API layer - HTTP handlers and routing
//!
//! - Blog pages and feed (`/blog/`)
//! - Shop pages, feeds and exports (`/shop/`)
//! - Shop REST API (`/shop/api/`)
//! - Account pages (`/myauth/`)
//! - Misc JSON API (`/api/`)
//! - Sitemap and uploaded media

pub mod blog;
pub mod forms;
pub mod groups;
pub mod middleware;
pub mod myauth;
pub mod orders;
pub mod products;
pub mod responses;
pub mod rest;
pub mod sitemap;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use crate::config::MediaConfig;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{ApiError, AppState, CurrentUser, PageError};

/// Files one product form may carry at full size (preview plus images)
const FILES_PER_REQUEST: u64 = 4;
/// Room for multipart boundaries, headers and text fields
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Request body limit derived from the per-file media limit
pub fn body_limit(media: &MediaConfig) -> usize {
    let limit = media
        .max_file_size
        .saturating_mul(FILES_PER_REQUEST)
        .saturating_add(MULTIPART_OVERHEAD);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// CORS for the configured origin, with cookie credentials
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);

    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Invalid CORS origin '{}', cross-origin requests disabled", cors_origin);
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let media = ServeDir::new(state.media.root());
    let upload_limit = body_limit(&state.config.media);

    Router::new()
        .merge(blog::router())
        .merge(products::router())
        .merge(orders::router())
        .merge(rest::router())
        .merge(myauth::router())
        .merge(groups::router())
        .merge(sitemap::router())
        .nest_service("/media", media)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_pages,
        ))
        // Runs first so error pages see the visitor
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_current_user,
        ))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_exceeds_media_limit() {
        let media = MediaConfig::default();
        assert!(body_limit(&media) as u64 > media.max_file_size * FILES_PER_REQUEST);

        let huge = MediaConfig {
            max_file_size: u64::MAX,
            ..MediaConfig::default()
        };
        assert_eq!(body_limit(&huge), usize::MAX);
    }
}

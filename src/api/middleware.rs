//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - Session resolution (`CurrentUser`)
//! - JSON errors (`ApiError`) and HTML errors (`PageError`)
//! - Rendering of HTML error pages

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{create_cache, Cache};
use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxAuthorRepository, SqlxCategoryRepository, SqlxGroupRepository,
    SqlxOrderRepository, SqlxProductRepository, SqlxProfileRepository, SqlxSessionRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DbPool;
use crate::models::User;
use crate::services::{
    BlogService, BlogServiceError, FormErrors, MediaStorage, OrderService, OrderServiceError,
    ProductService, ProductServiceError, SitemapService, UserService, UserServiceError,
};
use crate::templates::{StandardTemplateVars, TemplateEngine, TemplateUser};

// ============================================================================
// Application state
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub templates: Arc<TemplateEngine>,
    pub cache: Arc<Cache>,
    pub media: Arc<MediaStorage>,
    pub user_service: Arc<UserService>,
    pub blog_service: Arc<BlogService>,
    pub product_service: Arc<ProductService>,
    pub order_service: Arc<OrderService>,
    pub sitemap_service: Arc<SitemapService>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: DbPool, config: Config) -> anyhow::Result<Self> {
        let templates = TemplateEngine::new(config.templates.override_path.as_deref())?;
        let cache = create_cache(&config.cache);
        let media = Arc::new(MediaStorage::new(config.media.clone()));

        let user_service = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxProfileRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
            config.auth.session_days,
        ));
        let blog_service = Arc::new(BlogService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxAuthorRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
        ));
        let product_service = Arc::new(ProductService::new(
            SqlxProductRepository::boxed(pool.clone()),
            user_service.clone(),
            cache.clone(),
            media.clone(),
        ));
        let order_service = Arc::new(OrderService::new(
            SqlxOrderRepository::boxed(pool),
            user_service.clone(),
            product_service.clone(),
            cache.clone(),
        ));
        let sitemap_service = Arc::new(SitemapService::new(blog_service.clone(), product_service.clone()));

        Ok(Self {
            config: Arc::new(config),
            templates: Arc::new(templates),
            cache,
            media,
            user_service,
            blog_service,
            product_service,
            order_service,
            sitemap_service,
        })
    }
}

// ============================================================================
// Current user
// ============================================================================

/// The visitor of the current request, resolved from the session cookie
#[derive(Debug, Clone, Default)]
pub struct CurrentUser {
    pub user: Option<User>,
    /// Token of a valid session, if any
    pub session_id: Option<String>,
    /// Path and query of the request, used for `next` redirects
    pub path: String,
}

impl CurrentUser {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The logged-in user, or a redirect to the login page
    pub fn require_login(&self, login_url: &str) -> Result<&User, PageError> {
        self.user
            .as_ref()
            .ok_or_else(|| PageError::Redirect(login_redirect(login_url, &self.path)))
    }

    /// The logged-in user, or 401 for JSON endpoints
    pub fn require_api_user(&self) -> Result<&User, ApiError> {
        self.user
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }

    /// Standard template variables for this visitor
    pub fn template_vars(&self) -> StandardTemplateVars {
        let path = self.path.split('?').next().unwrap_or("/");
        let vars = StandardTemplateVars::new(path);
        match &self.user {
            Some(user) => vars.with_user(TemplateUser {
                id: user.id,
                username: user.username.clone(),
                is_staff: user.is_staff,
                is_superuser: user.is_superuser,
            }),
            None => vars,
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned().unwrap_or_else(|| CurrentUser {
            path: parts.uri.path().to_string(),
            ..Default::default()
        }))
    }
}

/// `login_url?next=<path>`
pub fn login_redirect(login_url: &str, next: &str) -> String {
    format!("{}?next={}", login_url, urlencoding::encode(next))
}

/// Value of a cookie from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Session middleware
///
/// Resolves the session cookie into a [`CurrentUser`] and stores it in the
/// request extensions. Unknown or expired sessions yield an anonymous user.
pub async fn load_current_user(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let mut current = CurrentUser {
        path,
        ..Default::default()
    };

    if let Some(token) = cookie_value(request.headers(), &state.config.auth.cookie_name) {
        match state.user_service.resolve_session(&token).await {
            Ok(Some((user, session))) => {
                current.user = Some(user);
                current.session_id = Some(session.id);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to resolve session: {}", e),
        }
    }

    request.extensions_mut().insert(current);
    next.run(request).await
}

// ============================================================================
// JSON errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Validation error carrying per-field messages
    pub fn invalid(errors: &FormErrors) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            "Invalid input",
            serde_json::to_value(errors).unwrap_or_default(),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    fn internal(e: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", e);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(what) => Self::not_found(format!("No {} found", what)),
            UserServiceError::ValidationError(errors) => Self::invalid(&errors),
            UserServiceError::PermissionDenied(perm) => Self::forbidden(format!("Missing permission {}", perm)),
            UserServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ProductServiceError> for ApiError {
    fn from(e: ProductServiceError) -> Self {
        match e {
            ProductServiceError::NotFound(id) => Self::not_found(format!("No product {} found", id)),
            ProductServiceError::ValidationError(errors) => Self::invalid(&errors),
            ProductServiceError::PermissionDenied(perm) => {
                Self::forbidden(format!("Missing permission {}", perm))
            }
            ProductServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<OrderServiceError> for ApiError {
    fn from(e: OrderServiceError) -> Self {
        match e {
            OrderServiceError::NotFound(what) => Self::not_found(format!("No {} found", what)),
            OrderServiceError::ValidationError(errors) => Self::invalid(&errors),
            OrderServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// HTML errors
// ============================================================================

/// Error raised by HTML page handlers
#[derive(Debug)]
pub enum PageError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    /// 302 to the given location (login required)
    Redirect(String),
    Internal(anyhow::Error),
}

/// Marker left on error responses; [`render_error_pages`] turns it into
/// the HTML error page
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub message: String,
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PageError::Redirect(location) => return found(&location),
            PageError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            PageError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            PageError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            PageError::Internal(e) => {
                tracing::error!("Page error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let mut response = (status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Internal(e)
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(what) => PageError::NotFound(format!("No {} found", what)),
            UserServiceError::ValidationError(errors) => PageError::BadRequest(errors.to_string()),
            UserServiceError::PermissionDenied(_) => PageError::Forbidden("Permission denied".into()),
            UserServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<BlogServiceError> for PageError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound(id) => PageError::NotFound(format!("No article {} found", id)),
            BlogServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<ProductServiceError> for PageError {
    fn from(e: ProductServiceError) -> Self {
        match e {
            ProductServiceError::NotFound(id) => PageError::NotFound(format!("No product {} found", id)),
            ProductServiceError::ValidationError(errors) => PageError::BadRequest(errors.to_string()),
            ProductServiceError::PermissionDenied(_) => PageError::Forbidden("Permission denied".into()),
            ProductServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<OrderServiceError> for PageError {
    fn from(e: OrderServiceError) -> Self {
        match e {
            OrderServiceError::NotFound(what) => PageError::NotFound(format!("No {} found", what)),
            OrderServiceError::ValidationError(errors) => PageError::BadRequest(errors.to_string()),
            OrderServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

/// Error page middleware
///
/// Replaces the plain-text body of [`PageError`] responses with the
/// rendered `error.html` page.
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let current = request.extensions().get::<CurrentUser>().cloned().unwrap_or_default();
    let mut response = next.run(request).await;

    let Some(page) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };

    let status = response.status();
    let html = state
        .templates
        .render_error(status.as_u16(), &page.message, &current.template_vars());
    (status, Html(html)).into_response()
}

/// 302 Found redirect
pub fn found(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => tracing::warn!("Invalid redirect location: {}", location),
    }
    response
}

// ============================================================================
// Permission helpers
// ============================================================================

/// Anonymous visitors are sent to the login page, users without the
/// permission get 403
pub async fn require_perm<'a>(
    state: &AppState,
    current: &'a CurrentUser,
    codename: &str,
) -> Result<&'a User, PageError> {
    let user = current.require_login(&state.config.auth.login_url)?;
    if !state.user_service.has_perm(user, codename).await? {
        return Err(PageError::Forbidden(format!("Missing permission {}", codename)));
    }
    Ok(user)
}

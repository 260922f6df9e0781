//! Account pages
//!
//! - GET /myauth/about-me/ - Current user info
//! - GET,POST /myauth/about-me/avatar-update/ - Avatar upload (login required)
//! - GET,POST /myauth/login/ - Form login
//! - GET /myauth/logout/ - End the session
//! - GET,POST /myauth/register/ - Sign up
//! - GET /myauth/cookie/get/, /myauth/cookie/set/ - Cookie demo
//! - GET /myauth/session/get/, /myauth/session/set/ - Session demo
//! - GET /myauth/users/ - Users ordered by username
//! - GET /myauth/users/{pk}/ - User profile
//! - GET,POST /myauth/users/{pk}/update/ - Profile update (staff or self)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tera::Context as TeraContext;

use crate::api::forms::{profile_form, MultipartForm};
use crate::api::middleware::{cookie_value, found, AppState, CurrentUser, PageError};
use crate::api::responses::{render, render_form, text};
use crate::cache::CacheLayer;
use crate::models::{Profile, Session, UpdateProfileInput, UserWithProfile};
use crate::services::media::avatar_dir;
use crate::services::{
    can_edit_user, FormErrors, MediaError, RegisterInput, UploadedFile, UserServiceError, NON_FIELD_ERRORS,
};

pub const PERM_VIEW_PROFILE: &str = "myauth.view_profile";

const DEMO_COOKIE: &str = "fizz";
const COOKIE_PAGE_TTL: Duration = Duration::from_secs(120);
const LOGIN_ERROR: &str = "Invalid login credentials!";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/myauth/about-me/", get(about_me))
        .route("/myauth/about-me/avatar-update/", get(avatar_form).post(avatar_submit))
        .route("/myauth/login/", get(login_form).post(login_submit))
        .route("/myauth/logout/", get(logout))
        .route("/myauth/register/", get(register_form).post(register_submit))
        .route("/myauth/cookie/get/", get(get_cookie))
        .route("/myauth/cookie/set/", get(set_cookie))
        .route("/myauth/session/get/", get(get_session))
        .route("/myauth/session/set/", get(set_session))
        .route("/myauth/users/", get(users_list))
        .route("/myauth/users/{pk}/", get(user_profile))
        .route("/myauth/users/{pk}/update/", get(user_update_form).post(user_update_submit))
}

/// Set-Cookie header for a new session
fn session_cookie(state: &AppState, session: &Session) -> HeaderMap {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.config.auth.cookie_name,
        session.id,
        state.config.auth.session_days.max(0) * 24 * 60 * 60
    );

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// Only local absolute paths are followed after login
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

/// Media problems with an uploaded avatar become field errors
fn avatar_error(e: MediaError) -> Result<FormErrors, PageError> {
    match e {
        MediaError::Io(e) => Err(PageError::Internal(e.into())),
        other => Ok(FormErrors::single("avatar", other.to_string())),
    }
}

// ============================================================================
// About me
// ============================================================================

async fn about_me(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let me = match &current.user {
        Some(user) => Some(state.user_service.get_user_with_profile(user.id).await?),
        None => None,
    };

    let mut context = TeraContext::new();
    context.insert("me", &me);
    render(&state, &current, "myauth/about_me.html", &context)
}

async fn avatar_form(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    current.require_login(&state.config.auth.login_url)?;
    render_form(&state, &current, "myauth/avatar_update.html", TeraContext::new(), &FormErrors::new())
}

async fn avatar_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let user = current.require_login(&state.config.auth.login_url)?;
    let submitted = MultipartForm::read(multipart)
        .await
        .map_err(|e| PageError::BadRequest(e.error.message))?;

    let errors = match submitted.file("avatar") {
        None => FormErrors::single("avatar", "This field is required."),
        Some(file) => match state.media.save(&avatar_dir(user.id), &file).await {
            Ok(path) => {
                state.user_service.set_avatar(user.id, &path).await?;
                return Ok(found("/myauth/about-me/"));
            }
            Err(e) => avatar_error(e)?,
        },
    };

    Ok(render_form(&state, &current, "myauth/avatar_update.html", TeraContext::new(), &errors)?.into_response())
}

// ============================================================================
// Login, logout, registration
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct NextParam {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

fn login_page(
    state: &AppState,
    current: &CurrentUser,
    username: &str,
    next: Option<&str>,
    errors: &FormErrors,
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("next", next.unwrap_or(""));
    render_form(state, current, "myauth/login.html", context, errors)
}

async fn login_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<NextParam>,
) -> Result<Response, PageError> {
    if current.is_authenticated() {
        let target = safe_next(params.next.as_deref()).unwrap_or(&state.config.auth.login_redirect_url);
        return Ok(found(target));
    }
    Ok(login_page(&state, &current, "", params.next.as_deref(), &FormErrors::new())?.into_response())
}

async fn login_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let Some(user) = state
        .user_service
        .authenticate(form.username.trim(), &form.password)
        .await?
    else {
        tracing::info!("Failed login for {}", form.username);
        let errors = FormErrors::single(NON_FIELD_ERRORS, LOGIN_ERROR);
        return Ok(login_page(&state, &current, &form.username, form.next.as_deref(), &errors)?.into_response());
    };

    if let Some(old) = &current.session_id {
        state.user_service.logout(old).await?;
    }
    let session = state.user_service.login(&user).await?;
    let target = safe_next(form.next.as_deref()).unwrap_or(&state.config.auth.login_redirect_url);

    Ok((session_cookie(&state, &session), found(target)).into_response())
}

async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    if let Some(token) = &current.session_id {
        state.user_service.logout(token).await?;
    }

    let clear = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.config.auth.cookie_name
    );
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&clear) {
        headers.insert(header::SET_COOKIE, value);
    }

    Ok((headers, found(&state.config.auth.login_url)).into_response())
}

async fn register_form(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("username", "");
    render_form(&state, &current, "myauth/register.html", context, &FormErrors::new())
}

async fn register_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(input): Form<RegisterInput>,
) -> Result<Response, PageError> {
    let username = input.username.clone();
    match state.user_service.register(input).await {
        Ok((_, session)) => Ok((session_cookie(&state, &session), found("/myauth/about-me/")).into_response()),
        Err(UserServiceError::ValidationError(errors)) => {
            let mut context = TeraContext::new();
            context.insert("username", &username);
            Ok(render_form(&state, &current, "myauth/register.html", context, &errors)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Cookie and session demo
// ============================================================================

/// Cached for two minutes per cookie value
async fn get_cookie(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, PageError> {
    let value = cookie_value(&headers, DEMO_COOKIE).unwrap_or_else(|| "default value".to_string());
    let key = format!("cookie_get:{}", value);

    if let Some(body) = state.cache.get::<String>(&key).await? {
        tracing::debug!("Cache hit for {}", key);
        return Ok(text(StatusCode::OK, body));
    }

    let body = format!("Cookie value: '{}'", value);
    state.cache.set(&key, &body, COOKIE_PAGE_TTL).await?;
    Ok(text(StatusCode::OK, body))
}

async fn set_cookie() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("fizz=buzz; Path=/; Max-Age=3600"),
    );
    (headers, "Cookie set").into_response()
}

async fn get_session(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    current.require_login(&state.config.auth.login_url)?;

    let stored = match &current.session_id {
        Some(token) => state.user_service.session_get(token, "foobar").await?,
        None => None,
    };
    let value = match stored {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "default".to_string(),
    };
    Ok(text(StatusCode::OK, format!("Session value: '{}'", value)))
}

/// 403 without the permission, anonymous visitors included
async fn set_session(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    let (Some(user), Some(token)) = (&current.user, &current.session_id) else {
        return Err(PageError::Forbidden("Permission denied".into()));
    };
    if !state.user_service.has_perm(user, PERM_VIEW_PROFILE).await? {
        return Err(PageError::Forbidden("Permission denied".into()));
    }

    state
        .user_service
        .session_set(token, "foobar", Value::String("spameggs".into()))
        .await?;
    Ok(text(StatusCode::OK, "Session set!"))
}

// ============================================================================
// Users
// ============================================================================

async fn users_list(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let users = state.user_service.list_users().await?;

    let mut context = TeraContext::new();
    context.insert("users", &users);
    render(&state, &current, "myauth/users_list.html", &context)
}

async fn user_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let profile_user = state.user_service.get_user_with_profile(pk).await?;
    let can_edit = current.user.as_ref().is_some_and(|u| can_edit_user(u, pk));

    let mut context = TeraContext::new();
    context.insert("profile_user", &profile_user);
    context.insert("can_edit", &can_edit);
    render(&state, &current, "myauth/user_profile.html", &context)
}

/// The target user, if the visitor may edit them
async fn editable_user(state: &AppState, current: &CurrentUser, pk: i64) -> Result<UserWithProfile, PageError> {
    let actor = current.require_login(&state.config.auth.login_url)?;
    let target = state.user_service.get_user_with_profile(pk).await?;
    if !can_edit_user(actor, pk) {
        return Err(PageError::Forbidden("You may not edit this user".into()));
    }
    Ok(target)
}

fn profile_echo(input: &UpdateProfileInput) -> Value {
    json!({
        "first_name": input.first_name,
        "last_name": input.last_name,
        "email": input.email,
        "bio": input.bio,
        "agreement_accepted": input.agreement_accepted,
    })
}

fn user_update_page(
    state: &AppState,
    current: &CurrentUser,
    target: &UserWithProfile,
    form: Value,
    errors: &FormErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("profile_user", target);
    context.insert("form", &form);
    Ok(render_form(state, current, "myauth/user_update.html", context, errors)?.into_response())
}

async fn user_update_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Response, PageError> {
    let target = editable_user(&state, &current, pk).await?;
    let profile = target.profile.clone().unwrap_or_else(|| Profile::empty(pk));
    let form = profile_echo(&UpdateProfileInput {
        first_name: target.user.first_name.clone(),
        last_name: target.user.last_name.clone(),
        email: target.user.email.clone(),
        bio: profile.bio,
        agreement_accepted: profile.agreement_accepted,
    });
    user_update_page(&state, &current, &target, form, &FormErrors::new())
}

async fn user_update_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let target = editable_user(&state, &current, pk).await?;
    let submitted = MultipartForm::read(multipart)
        .await
        .map_err(|e| PageError::BadRequest(e.error.message))?;
    let input = profile_form(&submitted.fields);
    let avatar: Option<UploadedFile> = submitted.file("avatar");

    if let Some(file) = &avatar {
        if let Err(e) = state.media.validate(file) {
            let errors = avatar_error(e)?;
            return user_update_page(&state, &current, &target, profile_echo(&input), &errors);
        }
    }

    match state.user_service.update_user_and_profile(pk, &input).await {
        Ok(_) => {}
        Err(UserServiceError::ValidationError(errors)) => {
            return user_update_page(&state, &current, &target, profile_echo(&input), &errors);
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(file) = avatar {
        let path = match state.media.save(&avatar_dir(pk), &file).await {
            Ok(path) => path,
            Err(e) => {
                let errors = avatar_error(e)?;
                return user_update_page(&state, &current, &target, profile_echo(&input), &errors);
            }
        };
        state.user_service.set_avatar(pk, &path).await?;
    }

    Ok(found(&format!("/myauth/users/{}/", pk)))
}

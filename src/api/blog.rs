//! Blog pages
//!
//! - GET /blog/articles/ - Published articles, newest first
//! - GET /blog/articles/{pk}/ - Article detail
//! - GET /blog/articles/latest/feed/ - RSS feed of the published articles

use axum::{
    extract::{Path, State},
    response::{Html, Response},
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, CurrentUser, PageError};
use crate::api::responses::{render, rss};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blog/articles/", get(articles_list))
        .route("/blog/articles/latest/feed/", get(latest_feed))
        .route("/blog/articles/{pk}/", get(article_detail))
}

async fn articles_list(State(state): State<AppState>, current: CurrentUser) -> Result<Html<String>, PageError> {
    let articles = state.blog_service.list_published().await?;

    let mut context = TeraContext::new();
    context.insert("articles", &articles);
    render(&state, &current, "blogapp/articles_list.html", &context)
}

async fn article_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
) -> Result<Html<String>, PageError> {
    let article = state.blog_service.get_article(pk).await?;

    let mut context = TeraContext::new();
    context.insert("article", &article);
    render(&state, &current, "blogapp/article_detail.html", &context)
}

async fn latest_feed(State(state): State<AppState>, current: CurrentUser) -> Result<Response, PageError> {
    let feed = state.blog_service.latest_feed().await?;
    rss(&state, &current, &feed)
}

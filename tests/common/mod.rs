//! Shared setup for HTTP tests

use axum_test::TestServer;
use tempfile::TempDir;

use mysite::{
    api::{build_router, AppState},
    config::Config,
    db::{create_test_pool, migrations::run_migrations},
    models::{CreateUserInput, User, UserFlags},
};

pub struct TestSite {
    pub server: TestServer,
    pub state: AppState,
    /// Media root; removed on drop
    pub _media: TempDir,
}

/// Fresh in-memory site with cookies kept between requests
pub async fn site() -> TestSite {
    let media = tempfile::tempdir().expect("Failed to create media dir");
    let pool = create_test_pool().await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    let state = AppState::new(pool, Config::for_tests(media.path().to_path_buf()))
        .expect("Failed to build state");
    let server = TestServer::builder()
        .save_cookies()
        .build(build_router(state.clone()))
        .expect("Failed to start test server");

    TestSite {
        server,
        state,
        _media: media,
    }
}

impl TestSite {
    pub async fn create_user(&self, username: &str, flags: UserFlags, perms: &[&str]) -> User {
        let user = self
            .state
            .user_service
            .create_user(CreateUserInput {
                username: username.to_string(),
                password: "s3cret-pass".to_string(),
                email: format!("{}@example.com", username),
                flags,
            })
            .await
            .expect("Failed to create user");
        for perm in perms {
            self.state
                .user_service
                .grant_permission(user.id, perm)
                .await
                .expect("Failed to grant permission");
        }
        user
    }

    /// Log in through the login form; the session cookie is saved
    pub async fn login(&self, username: &str) {
        let response = self
            .server
            .post("/myauth/login/")
            .form(&[("username", username), ("password", "s3cret-pass")])
            .await;
        response.assert_status(axum::http::StatusCode::FOUND);
    }
}

pub fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

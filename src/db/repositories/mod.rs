//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one aggregate.

pub mod article;
pub mod author;
pub mod category;
pub mod group;
pub mod order;
pub mod product;
pub mod profile;
pub mod session;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use author::{AuthorRepository, SqlxAuthorRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use group::{GroupRepository, SqlxGroupRepository};
pub use order::{OrderRepository, SqlxOrderRepository};
pub use product::{ProductRepository, SqlxProductRepository};
pub use profile::{ProfileRepository, SqlxProfileRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{create_test_pool, migrations, DbPool};

    /// In-memory database with all migrations applied
    pub async fn setup_pool() -> DbPool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a bare user row and return its id
    pub async fn insert_user(pool: &DbPool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, 'hash')")
            .bind(username)
            .execute(pool)
            .await
            .expect("Failed to create test user")
            .last_insert_rowid()
    }
}

//! Category repository

use crate::db::DbPool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Find a category by exact name or create it
    async fn get_or_create(&self, name: &str) -> Result<Category>;

    /// List all categories
    async fn list(&self) -> Result<Vec<Category>>;
}

pub struct SqlxCategoryRepository {
    pool: DbPool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn get_or_create(&self, name: &str) -> Result<Category> {
        let existing = sqlx::query("SELECT id FROM categories WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up category")?;

        let id = match existing {
            Some(row) => row.get("id"),
            None => sqlx::query("INSERT INTO categories (name) VALUES (?)")
                .bind(name)
                .execute(&self.pool)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
        };

        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")?;

        Ok(rows
            .into_iter()
            .map(|row| Category {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn test_get_or_create() {
        let pool = setup_pool().await;
        let repo = SqlxCategoryRepository::new(pool);

        let a = repo.get_or_create("Some category").await.unwrap();
        let b = repo.get_or_create("Another category").await.unwrap();
        let a2 = repo.get_or_create("Some category").await.unwrap();

        assert_eq!(a, a2);
        assert_ne!(a.id, b.id);
        assert_eq!(repo.list().await.unwrap(), vec![a, b]);
    }
}

//! Tag repository

use crate::db::DbPool;
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Find a tag by exact name or create it
    async fn get_or_create(&self, name: &str) -> Result<Tag>;

    /// List all tags
    async fn list(&self) -> Result<Vec<Tag>>;
}

pub struct SqlxTagRepository {
    pool: DbPool,
}

impl SqlxTagRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_or_create(&self, name: &str) -> Result<Tag> {
        let existing = sqlx::query("SELECT id FROM tags WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up tag")?;

        let id = match existing {
            Some(row) => row.get("id"),
            None => sqlx::query("INSERT INTO tags (name) VALUES (?)")
                .bind(name)
                .execute(&self.pool)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
        };

        Ok(Tag {
            id,
            name: name.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tags")?;

        Ok(rows
            .into_iter()
            .map(|row| Tag {
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
        let repo = SqlxTagRepository::new(pool);

        let t1 = repo.get_or_create("Tag_1").await.unwrap();
        let t1_again = repo.get_or_create("Tag_1").await.unwrap();
        repo.get_or_create("Tag_2").await.unwrap();

        assert_eq!(t1, t1_again);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}

//! Author repository

use crate::db::DbPool;
use crate::models::Author;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Author repository trait
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Find an author by exact name or create one with the given bio
    async fn get_or_create(&self, name: &str, bio: &str) -> Result<Author>;

    /// List all authors
    async fn list(&self) -> Result<Vec<Author>>;
}

pub struct SqlxAuthorRepository {
    pool: DbPool,
}

impl SqlxAuthorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn AuthorRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthorRepository for SqlxAuthorRepository {
    async fn get_or_create(&self, name: &str, bio: &str) -> Result<Author> {
        let existing = sqlx::query("SELECT id, name, bio FROM authors WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up author")?;

        if let Some(row) = existing {
            return Ok(Author {
                id: row.get("id"),
                name: row.get("name"),
                bio: row.get("bio"),
            });
        }

        let result = sqlx::query("INSERT INTO authors (name, bio) VALUES (?, ?)")
            .bind(name)
            .bind(bio)
            .execute(&self.pool)
            .await
            .context("Failed to create author")?;

        Ok(Author {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            bio: bio.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Author>> {
        let rows = sqlx::query("SELECT id, name, bio FROM authors ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list authors")?;

        Ok(rows
            .into_iter()
            .map(|row| Author {
                id: row.get("id"),
                name: row.get("name"),
                bio: row.get("bio"),
            })
            .collect())
    }
}

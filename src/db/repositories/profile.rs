//! Profile repository

use crate::db::DbPool;
use crate::models::Profile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// Profile repository trait
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Get the profile of a user
    async fn get_by_user(&self, user_id: i64) -> Result<Option<Profile>>;

    /// Get the profile of a user, creating an empty one if missing
    async fn get_or_create(&self, user_id: i64) -> Result<Profile>;

    /// Update bio and agreement flag
    async fn update(&self, user_id: i64, bio: &str, agreement_accepted: bool) -> Result<Profile>;

    /// Set the avatar path
    async fn set_avatar(&self, user_id: i64, avatar: &str) -> Result<Profile>;
}

/// SQLx-based profile repository implementation
pub struct SqlxProfileRepository {
    pool: DbPool,
}

impl SqlxProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn get_by_user(&self, user_id: i64) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, user_id, bio, agreement_accepted, avatar FROM profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get profile")?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_or_create(&self, user_id: i64) -> Result<Profile> {
        sqlx::query("INSERT OR IGNORE INTO profiles (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to create profile")?;

        self.get_by_user(user_id)
            .await?
            .context("Profile missing after insert")
    }

    async fn update(&self, user_id: i64, bio: &str, agreement_accepted: bool) -> Result<Profile> {
        self.get_or_create(user_id).await?;

        sqlx::query("UPDATE profiles SET bio = ?, agreement_accepted = ? WHERE user_id = ?")
            .bind(bio)
            .bind(agreement_accepted)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update profile")?;

        self.get_or_create(user_id).await
    }

    async fn set_avatar(&self, user_id: i64, avatar: &str) -> Result<Profile> {
        self.get_or_create(user_id).await?;

        sqlx::query("UPDATE profiles SET avatar = ? WHERE user_id = ?")
            .bind(avatar)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update avatar")?;

        self.get_or_create(user_id).await
    }
}

fn row_to_profile(row: &SqliteRow) -> Profile {
    Profile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        bio: row.get("bio"),
        agreement_accepted: row.get("agreement_accepted"),
        avatar: row.get("avatar"),
    }
}

//! Group repository
//!
//! Groups bundle permission codenames; users inherit the permissions of
//! every group they belong to.

use crate::db::DbPool;
use crate::models::Group;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Group repository trait
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Create a new group
    async fn create(&self, name: &str) -> Result<Group>;

    /// Get group by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Group>>;

    /// List all groups ordered by pk
    async fn list(&self) -> Result<Vec<Group>>;

    /// Add a user to a group
    async fn add_user(&self, group_id: i64, user_id: i64) -> Result<()>;

    /// Grant a permission codename to a group
    async fn grant_permission(&self, group_id: i64, codename: &str) -> Result<()>;
}

/// SQLx-based group repository implementation
pub struct SqlxGroupRepository {
    pool: DbPool,
}

impl SqlxGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn GroupRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GroupRepository for SqlxGroupRepository {
    async fn create(&self, name: &str) -> Result<Group> {
        let result = sqlx::query("INSERT INTO groups (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to create group")?;

        Ok(Group {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get group by name")?;

        Ok(row.map(|row| Group {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }

    async fn list(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT id, name FROM groups ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list groups")?;

        Ok(rows
            .into_iter()
            .map(|row| Group {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn add_user(&self, group_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await
            .context("Failed to add user to group")?;
        Ok(())
    }

    async fn grant_permission(&self, group_id: i64, codename: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO group_permissions (group_id, codename) VALUES (?, ?)")
            .bind(group_id)
            .bind(codename)
            .execute(&self.pool)
            .await
            .context("Failed to grant group permission")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;

    #[tokio::test]
    async fn test_create_list_and_lookup() {
        let pool = setup_pool().await;
        let repo = SqlxGroupRepository::new(pool);

        let editors = repo.create("editors").await.unwrap();
        repo.create("buyers").await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["editors", "buyers"]);

        assert_eq!(repo.get_by_name("editors").await.unwrap(), Some(editors));
        assert!(repo.get_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let pool = setup_pool().await;
        let repo = SqlxGroupRepository::new(pool);

        repo.create("editors").await.unwrap();
        assert!(repo.create("editors").await.is_err());
    }
}

//! User repository
//!
//! Database operations for users and their permissions.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite

use crate::db::DbPool;
use crate::models::{Profile, User, UserWithProfile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Create a user and an empty profile in one transaction
    async fn create_with_profile(&self, user: &User) -> Result<(User, Profile)>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by ID joined with their profile
    async fn get_with_profile(&self, id: i64) -> Result<Option<UserWithProfile>>;

    /// List all users ordered by username
    async fn list(&self) -> Result<Vec<User>>;

    /// Update first name, last name and email
    async fn update_personal(
        &self,
        id: i64,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<()>;

    /// Grant a permission codename directly to a user
    async fn grant_permission(&self, user_id: i64, codename: &str) -> Result<()>;

    /// Check a direct or group permission grant
    async fn has_permission(&self, user_id: i64, codename: &str) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, first_name, last_name, email, \
     is_staff, is_superuser, is_active, date_joined";

const INSERT_USER: &str = r#"
    INSERT INTO users (username, password_hash, first_name, last_name, email,
                       is_staff, is_superuser, is_active, date_joined)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let result = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(user.is_active)
            .bind(user.date_joined)
            .execute(&self.pool)
            .await
            .context("Failed to create user")?;

        Ok(User {
            id: result.last_insert_rowid(),
            ..user.clone()
        })
    }

    async fn create_with_profile(&self, user: &User) -> Result<(User, Profile)> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(user.is_active)
            .bind(user.date_joined)
            .execute(&mut *tx)
            .await
            .context("Failed to create user")?;
        let user_id = result.last_insert_rowid();

        let result = sqlx::query("INSERT INTO profiles (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to create profile")?;

        tx.commit().await?;

        let profile = Profile {
            id: result.last_insert_rowid(),
            ..Profile::empty(user_id)
        };
        Ok((
            User {
                id: user_id,
                ..user.clone()
            },
            profile,
        ))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;

        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by username")?;

        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_with_profile(&self, id: i64) -> Result<Option<UserWithProfile>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, u.password_hash, u.first_name, u.last_name, u.email,
                   u.is_staff, u.is_superuser, u.is_active, u.date_joined,
                   p.id AS profile_id, p.bio, p.agreement_accepted, p.avatar
            FROM users u
            LEFT JOIN profiles p ON p.user_id = u.id
            WHERE u.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user with profile")?;

        Ok(row.map(|row| {
            let user = row_to_user(&row);
            let profile = row
                .get::<Option<i64>, _>("profile_id")
                .map(|profile_id| Profile {
                    id: profile_id,
                    user_id: user.id,
                    bio: row.get("bio"),
                    agreement_accepted: row.get("agreement_accepted"),
                    avatar: row.get("avatar"),
                });
            UserWithProfile { user, profile }
        }))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        Ok(rows.iter().map(row_to_user).collect())
    }

    async fn update_personal(
        &self,
        id: i64,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET first_name = ?, last_name = ?, email = ? WHERE id = ?")
            .bind(first_name)
            .bind(last_name)
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user")?;
        Ok(())
    }

    async fn grant_permission(&self, user_id: i64, codename: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_permissions (user_id, codename) VALUES (?, ?)")
            .bind(user_id)
            .bind(codename)
            .execute(&self.pool)
            .await
            .context("Failed to grant permission")?;
        Ok(())
    }

    async fn has_permission(&self, user_id: i64, codename: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_permissions WHERE user_id = ? AND codename = ?
                UNION ALL
                SELECT 1 FROM group_permissions gp
                INNER JOIN user_groups ug ON ug.group_id = gp.group_id
                WHERE ug.user_id = ? AND gp.codename = ?
            ) AS granted
            "#,
        )
        .bind(user_id)
        .bind(codename)
        .bind(user_id)
        .bind(codename)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check permission")?;

        Ok(row.get::<bool, _>("granted"))
    }
}

pub(crate) fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        is_active: row.get("is_active"),
        date_joined: row.get("date_joined"),
    }
}

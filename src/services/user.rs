//! User service
//!
//! Accounts, authentication, server-side sessions, permissions, groups
//! and profiles.

use crate::db::repositories::{
    GroupRepository, ProfileRepository, SessionRepository, UserRepository,
};
use crate::models::{
    CreateUserInput, Group, Profile, Session, UpdateProfileInput, User, UserWithProfile,
};
use crate::services::password::{hash_password, password_problems, verify_password};
use crate::services::validation::{check_length, is_valid_email, FormErrors};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const USERNAME_MAX_LEN: usize = 150;
pub const GROUP_NAME_MAX_LEN: usize = 150;
pub const BIO_MAX_LEN: usize = 500;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username pattern"));

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(FormErrors),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FormErrors> for UserServiceError {
    fn from(errors: FormErrors) -> Self {
        Self::ValidationError(errors)
    }
}

/// Staff may edit anyone; other users only themselves
pub fn can_edit_user(actor: &User, target_id: i64) -> bool {
    actor.is_staff || actor.id == target_id
}

/// Registration form input
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    group_repo: Arc<dyn GroupRepository>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        group_repo: Arc<dyn GroupRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            profile_repo,
            group_repo,
            session_days,
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    async fn validate_username(&self, username: &str, errors: &mut FormErrors) -> anyhow::Result<()> {
        check_length(errors, "username", username, true, USERNAME_MAX_LEN);
        if errors.get("username").is_some() {
            return Ok(());
        }
        if !USERNAME_RE.is_match(username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if self.user_repo.get_by_username(username).await?.is_some() {
            errors.add("username", "A user with that username already exists.");
        }
        Ok(())
    }

    /// Create a user without a profile (management command)
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let mut errors = FormErrors::new();
        self.validate_username(&input.username, &mut errors).await?;
        if input.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        if !is_valid_email(&input.email) {
            errors.add("email", "Enter a valid email address.");
        }
        errors.into_result()?;

        let mut user = User::new(input.username, input.email, hash_password(&input.password)?);
        user.is_staff = input.flags.is_staff;
        user.is_superuser = input.flags.is_superuser;

        let user = self.user_repo.create(&user).await?;
        tracing::info!("Created user {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// Validate the registration form, create the user with an empty
    /// profile and log them in
    pub async fn register(&self, input: RegisterInput) -> Result<(User, Session), UserServiceError> {
        let mut errors = FormErrors::new();
        self.validate_username(&input.username, &mut errors).await?;

        if input.password1.is_empty() {
            errors.add("password1", "This field is required.");
        }
        if input.password2.is_empty() {
            errors.add("password2", "This field is required.");
        } else if input.password1 != input.password2 {
            errors.add("password2", "The two password fields didn't match.");
        } else {
            for problem in password_problems(&input.password2) {
                errors.add("password2", problem);
            }
        }
        errors.into_result()?;

        let user = User::new(input.username, String::new(), hash_password(&input.password1)?);
        let (user, _profile) = self.user_repo.create_with_profile(&user).await?;
        tracing::info!("Registered user {} (id {})", user.username, user.id);

        let session = self.login(&user).await?;
        Ok((user, session))
    }

    /// Check credentials; inactive users never authenticate
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(user) = self.user_repo.get_by_username(username).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Start a new session for the user
    pub async fn login(&self, user: &User) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            data: serde_json::Map::new(),
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        let session = self.session_repo.create(&session).await?;
        tracing::info!("User {} logged in", user.username);
        Ok(session)
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// Resolve a session token into its user; expired sessions are
    /// removed and treated as anonymous
    pub async fn resolve_session(
        &self,
        token: &str,
    ) -> Result<Option<(User, Session)>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }

        match self.user_repo.get_by_id(session.user_id).await? {
            Some(user) if user.is_active => Ok(Some((user, session))),
            _ => Ok(None),
        }
    }

    pub async fn session_get(&self, token: &str, key: &str) -> Result<Option<Value>, UserServiceError> {
        Ok(self
            .session_repo
            .get_by_id(token)
            .await?
            .and_then(|s| s.data.get(key).cloned()))
    }

    pub async fn session_set(&self, token: &str, key: &str, value: Value) -> Result<(), UserServiceError> {
        let mut session = self
            .session_repo
            .get_by_id(token)
            .await?
            .ok_or_else(|| UserServiceError::NotFound("session".into()))?;
        session.data.insert(key.to_string(), value);
        self.session_repo.update_data(token, &session.data).await?;
        Ok(())
    }

    /// Remove sessions past their expiry; returns how many were removed
    pub async fn purge_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self.session_repo.delete_expired().await?;
        tracing::info!("Purged {} expired sessions", removed);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Permissions and groups
    // ------------------------------------------------------------------

    /// Active superusers hold every permission; everyone else needs a
    /// direct or group grant
    pub async fn has_perm(&self, user: &User, codename: &str) -> Result<bool, UserServiceError> {
        if !user.is_active {
            return Ok(false);
        }
        if user.is_superuser {
            return Ok(true);
        }
        Ok(self.user_repo.has_permission(user.id, codename).await?)
    }

    pub async fn grant_permission(&self, user_id: i64, codename: &str) -> Result<(), UserServiceError> {
        self.user_repo.grant_permission(user_id, codename).await?;
        tracing::info!("Granted {} to user {}", codename, user_id);
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, UserServiceError> {
        Ok(self.group_repo.list().await?)
    }

    pub async fn create_group(&self, name: &str) -> Result<Group, UserServiceError> {
        let mut errors = FormErrors::new();
        check_length(&mut errors, "name", name, true, GROUP_NAME_MAX_LEN);
        if errors.is_empty() && self.group_repo.get_by_name(name).await?.is_some() {
            errors.add("name", "group with this name already exists.");
        }
        errors.into_result()?;

        let group = self.group_repo.create(name).await?;
        tracing::info!("Created group {}", group.name);
        Ok(group)
    }

    pub async fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<(), UserServiceError> {
        self.group_repo.add_user(group_id, user_id).await?;
        Ok(())
    }

    pub async fn grant_group_permission(&self, group_id: i64, codename: &str) -> Result<(), UserServiceError> {
        self.group_repo.grant_permission(group_id, codename).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users and profiles
    // ------------------------------------------------------------------

    pub async fn get_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("user {}", id)))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_username(username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("user {}", username)))
    }

    /// All users ordered by username
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await?)
    }

    pub async fn get_user_with_profile(&self, id: i64) -> Result<UserWithProfile, UserServiceError> {
        self.user_repo
            .get_with_profile(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("user {}", id)))
    }

    /// Validate and store personal data and profile fields
    pub async fn update_user_and_profile(
        &self,
        id: i64,
        input: &UpdateProfileInput,
    ) -> Result<UserWithProfile, UserServiceError> {
        self.get_user(id).await?;

        let mut errors = FormErrors::new();
        check_length(&mut errors, "first_name", &input.first_name, false, 150);
        check_length(&mut errors, "last_name", &input.last_name, false, 150);
        if !is_valid_email(&input.email) {
            errors.add("email", "Enter a valid email address.");
        }
        check_length(&mut errors, "bio", &input.bio, false, BIO_MAX_LEN);
        errors.into_result()?;

        self.user_repo
            .update_personal(id, &input.first_name, &input.last_name, &input.email)
            .await?;
        self.profile_repo
            .update(id, &input.bio, input.agreement_accepted)
            .await?;

        self.get_user_with_profile(id).await
    }

    /// Point the user's profile at a stored avatar; a missing profile is
    /// created on the fly
    pub async fn set_avatar(&self, user_id: i64, path: &str) -> Result<Profile, UserServiceError> {
        let profile = self.profile_repo.set_avatar(user_id, path).await?;
        tracing::info!("Updated avatar of user {}", user_id);
        Ok(profile)
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, UserServiceError> {
        Ok(self.profile_repo.get_by_user(user_id).await?)
    }
}

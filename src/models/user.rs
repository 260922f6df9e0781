//! User, group and profile models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique login name
    pub username: String,
    /// Password hash (argon2, PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// May view staff-only pages such as the orders export
    pub is_staff: bool,
    /// Implicitly holds every permission while active
    pub is_superuser: bool,
    /// Inactive users can never log in
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Create a new User. The ID is assigned by the database.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            username,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            email,
            is_staff: false,
            is_superuser: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    /// "First Last", falling back to the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Account flags set at creation time
#[derive(Debug, Clone, Default)]
pub struct UserFlags {
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub password: String,
    pub email: String,
    pub flags: UserFlags,
}

/// A named set of permissions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    #[serde(rename = "pk")]
    pub id: i64,
    pub name: String,
}

/// Extra per-user data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
    pub agreement_accepted: bool,
    /// Path of the avatar relative to the media root
    pub avatar: Option<String>,
}

impl Profile {
    pub fn empty(user_id: i64) -> Self {
        Self {
            id: 0,
            user_id,
            bio: String::new(),
            agreement_accepted: false,
            avatar: None,
        }
    }
}

/// A user together with their profile, if any
#[derive(Debug, Clone, Serialize)]
pub struct UserWithProfile {
    #[serde(flatten)]
    pub user: User,
    pub profile: Option<Profile>,
}

/// Changes to a user's personal data and profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub agreement_accepted: bool,
}

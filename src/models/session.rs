//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-side session for an authenticated user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Arbitrary key/value data stored with the session
    pub data: Map<String, Value>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// String value stored under `key`, if any
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: "token".into(),
            user_id: 1,
            data: Map::new(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_expired() {
        assert!(session(Utc::now() - Duration::seconds(1)).is_expired());
        assert!(!session(Utc::now() + Duration::days(1)).is_expired());
    }

    #[test]
    fn test_get_str() {
        let mut s = session(Utc::now());
        s.data.insert("foobar".into(), Value::String("spameggs".into()));
        s.data.insert("n".into(), Value::from(1));
        assert_eq!(s.get_str("foobar"), Some("spameggs"));
        assert_eq!(s.get_str("n"), None);
        assert_eq!(s.get_str("missing"), None);
    }
}

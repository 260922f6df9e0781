//! Blog author model

use serde::{Deserialize, Serialize};

/// Author of blog articles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub bio: String,
}

//! Database layer
//!
//! SQLite through sqlx, embedded migrations and one repository per
//! aggregate. Services depend on the repository traits, never on sqlx
//! directly.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DbPool};

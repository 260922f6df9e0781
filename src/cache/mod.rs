//! Cache layer
//!
//! In-process cache (moka) for rendered pages and expensive exports.
//! Every entry carries its own TTL, capped by `cache.ttl_seconds`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mysite::cache::{create_cache, CacheLayer};
//! use mysite::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Shared cache handle used by services and handlers
pub type Cache = MemoryCache;

/// Key of the cached products export
pub const PRODUCTS_EXPORT_KEY: &str = "products_data_export";

/// Key of the cached per-user orders export
pub fn user_orders_export_key(user_id: i64) -> String {
    format!("user_#{}_orders_data_export", user_id)
}

/// Cache layer trait
///
/// Generic methods keep this trait out of `dyn` position; callers use
/// the concrete [`Cache`] type.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Create the cache described by the configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    let max_ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, max_ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache() {
        let cache = create_cache(&CacheConfig::default());

        cache.set("test_key", &"test_value".to_string(), Duration::from_secs(60)).await.unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[test]
    fn test_user_orders_export_key() {
        assert_eq!(user_orders_export_key(7), "user_#7_orders_data_export");
    }
}

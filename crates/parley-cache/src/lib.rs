//! Keyed string cache with per-key TTL.
//!
//! The router treats the cache as a collaborator behind the [`Cache`] trait:
//! lookups report found-ness through `Option`, writes always carry an
//! expiry, and deletion comes in pattern, prefix and suffix flavors. Every
//! failure is non-fatal to callers — they log and move on.
//!
//! [`MemoryCache`] is the backend shipped with the server; a networked
//! backend would implement the same trait.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up a key. `Ok(None)` means the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value under a key with an expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete every key matching a glob pattern (`*` wildcard).
    async fn del_pattern(&self, pattern: &str) -> Result<(), CacheError>;

    /// Delete every key starting with a prefix.
    async fn del_prefix(&self, prefix: &str) -> Result<(), CacheError>;

    /// Delete every key ending with a suffix.
    async fn del_suffix(&self, suffix: &str) -> Result<(), CacheError>;

    /// Drop every key. Used as a best-effort flush on shutdown.
    async fn clear_all(&self) -> Result<(), CacheError>;
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Cache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process TTL cache.
///
/// Entries expire lazily on lookup; [`MemoryCache::purge_expired`] sweeps the
/// map and is meant to run on an interval from the composition root.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose TTL has elapsed.
    pub async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh());
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
    }

    /// Number of live (non-expired) entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|entry| entry.is_fresh()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn delete_where<F: Fn(&str) -> bool>(&self, matches: F) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !matches(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "deleted cache entries");
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> Result<(), CacheError> {
        self.delete_where(|key| glob_match(pattern, key)).await;
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.delete_where(|key| key.starts_with(prefix)).await;
        Ok(())
    }

    async fn del_suffix(&self, suffix: &str) -> Result<(), CacheError> {
        self.delete_where(|key| key.ends_with(suffix)).await;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.clear();
        Ok(())
    }
}

/// Minimal glob matcher: `*` matches any run of characters, everything else
/// matches literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<u8> = pattern.bytes().collect();
    let text: Vec<u8> = text.bytes().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the last star swallow one more character.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::metrics::feed::PAGE_CACHE_EVENTS;

const KEY_PREFIX: &str = "blog:page:v1:";

/// Upper bound on in-process entries; a third is culled when reached
const MAX_MEMORY_ENTRIES: usize = 300;

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<DashMap<String, (String, Instant)>>),
}

/// TTL cache over rendered global feed pages.
///
/// Entries are keyed by the requested page exactly as the client sent it and
/// are never invalidated by writes; they only disappear on expiry or
/// `clear()`. The in-process backend sweeps expired entries on every write
/// and culls the entries closest to expiry once it holds
/// `MAX_MEMORY_ENTRIES`. Backend failures are logged and treated as misses.
#[derive(Clone)]
pub struct PageCache {
    backend: Backend,
    ttl: Duration,
}

impl PageCache {
    pub fn redis(redis: ConnectionManager, ttl: Duration) -> Self {
        Self {
            backend: Backend::Redis(redis),
            ttl,
        }
    }

    pub fn memory(ttl: Duration) -> Self {
        Self {
            backend: Backend::Memory(Arc::new(DashMap::new())),
            ttl,
        }
    }

    fn global_key(page: &str) -> String {
        format!("{}global:{}", KEY_PREFIX, page)
    }

    /// Cached body of a global feed page, if still fresh
    pub async fn get(&self, page: &str) -> Option<String> {
        let key = Self::global_key(page);

        let cached = match &self.backend {
            Backend::Redis(redis) => {
                let mut conn = redis.clone();
                match conn.get::<_, Option<String>>(&key).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Redis read error for page cache: {}", e);
                        PAGE_CACHE_EVENTS.with_label_values(&["error"]).inc();
                        return None;
                    }
                }
            }
            Backend::Memory(entries) => {
                let fresh = entries
                    .get(&key)
                    .filter(|entry| entry.value().1 > Instant::now())
                    .map(|entry| entry.value().0.clone());
                if fresh.is_none() {
                    entries.remove_if(&key, |_, (_, expires)| *expires <= Instant::now());
                }
                fresh
            }
        };

        let event = if cached.is_some() { "hit" } else { "miss" };
        debug!(page = %page, event, "page cache lookup");
        PAGE_CACHE_EVENTS.with_label_values(&[event]).inc();
        cached
    }

    /// Store a rendered global feed page for the configured TTL
    pub async fn put(&self, page: &str, body: &str) {
        let key = Self::global_key(page);

        match &self.backend {
            Backend::Redis(redis) => {
                let mut conn = redis.clone();
                let ttl_secs = self.ttl.as_secs().max(1);
                if let Err(e) = conn.set_ex::<_, _, ()>(&key, body, ttl_secs).await {
                    warn!("Failed to write page cache: {}", e);
                    PAGE_CACHE_EVENTS.with_label_values(&["error"]).inc();
                    return;
                }
            }
            Backend::Memory(entries) => {
                let now = Instant::now();
                entries.retain(|_, (_, expires)| *expires > now);
                if entries.len() >= MAX_MEMORY_ENTRIES {
                    cull(entries);
                }
                entries.insert(key, (body.to_string(), now + self.ttl));
            }
        }

        PAGE_CACHE_EVENTS.with_label_values(&["write"]).inc();
    }

    /// Drop every cached page. Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let removed = match &self.backend {
            Backend::Redis(redis) => {
                let mut conn = redis.clone();
                let pattern = format!("{}*", KEY_PREFIX);
                let mut cursor: u64 = 0;
                let mut total_deleted = 0;

                loop {
                    let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| AppError::Cache(e.to_string()))?;

                    if !keys.is_empty() {
                        total_deleted += keys.len();
                        conn.del::<_, ()>(keys)
                            .await
                            .map_err(|e| AppError::Cache(e.to_string()))?;
                    }

                    cursor = next_cursor;
                    if cursor == 0 {
                        break;
                    }
                }
                total_deleted
            }
            Backend::Memory(entries) => {
                let removed = entries.len();
                entries.clear();
                removed
            }
        };

        debug!(removed, "page cache cleared");
        PAGE_CACHE_EVENTS.with_label_values(&["clear"]).inc();
        Ok(removed)
    }
}

/// Drop the third of the entries that expire soonest
fn cull(entries: &DashMap<String, (String, Instant)>) {
    let mut by_expiry: Vec<(Instant, String)> = entries
        .iter()
        .map(|entry| (entry.value().1, entry.key().clone()))
        .collect();
    by_expiry.sort_unstable();

    let count = (by_expiry.len() / 3).max(1);
    for (_, key) in by_expiry.into_iter().take(count) {
        entries.remove(&key);
    }
    debug!(culled = count, "page cache culled");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_put() {
        let cache = PageCache::memory(Duration::from_secs(20));
        assert!(cache.get("1").await.is_none());

        cache.put("1", "{\"page\":1}").await;
        assert_eq!(cache.get("1").await.as_deref(), Some("{\"page\":1}"));
        assert!(cache.get("2").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_entries_expire() {
        let cache = PageCache::memory(Duration::from_millis(30));
        cache.put("1", "body").await;
        assert!(cache.get("1").await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("1").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache = PageCache::memory(Duration::from_secs(20));
        cache.put("1", "a").await;
        cache.put("2", "b").await;

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.get("1").await.is_none());
        assert!(cache.get("2").await.is_none());
    }

    fn memory_len(cache: &PageCache) -> usize {
        match &cache.backend {
            Backend::Memory(entries) => entries.len(),
            Backend::Redis(_) => 0,
        }
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept_on_write() {
        let cache = PageCache::memory(Duration::from_millis(5));
        for page in 0..100 {
            cache.put(&format!("junk-{}", page), "body").await;
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.put("1", "fresh").await;
        assert_eq!(memory_len(&cache), 1);
        assert_eq!(cache.get("1").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_distinct_pages_stay_bounded() {
        let cache = PageCache::memory(Duration::from_secs(20));
        for page in 0..1000 {
            cache.put(&page.to_string(), "body").await;
        }

        assert!(memory_len(&cache) <= MAX_MEMORY_ENTRIES);
        assert_eq!(cache.get("999").await.as_deref(), Some("body"));
    }

    #[test]
    fn test_keys_are_namespaced_by_page() {
        assert_eq!(PageCache::global_key("2"), "blog:page:v1:global:2");
        assert_ne!(PageCache::global_key("2"), PageCache::global_key("02"));
    }
}

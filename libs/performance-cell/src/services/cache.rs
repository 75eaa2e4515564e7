use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::models::CacheError;

/// Storage for cached read views. Every entry carries at least one tag, and
/// evicting a tag removes every entry carrying it whatever its key.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) -> Result<(), CacheError>;

    /// Returns the number of entries removed.
    async fn evict_by_tag(&self, tag: &str) -> Result<u64, CacheError>;

    async fn evict_by_key(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug)]
struct StoredEntry {
    value: Value,
    tags: Vec<String>,
    expires_at: Instant,
}

const SWEEP_THRESHOLD: usize = 1_024;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, StoredEntry>,
    tag_index: HashMap<String, HashSet<String>>,
    /// Entry count at which the next write sweeps expired entries.
    next_sweep: usize,
}

impl MemoryState {
    fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove_key(key);
        }
        expired.len()
    }

    fn remove_key(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                for tag in &entry.tags {
                    if let Some(keys) = self.tag_index.get_mut(tag) {
                        keys.remove(key);
                        if keys.is_empty() {
                            self.tag_index.remove(tag);
                        }
                    }
                }
                true
            }
            None => false,
        }
    }
}

/// In-process backend with a tag index. Availability can be toggled to
/// exercise degraded mode.
/// Expired entries are dropped when read, and swept in bulk once the entry
/// count reaches a threshold that grows with the live set.
#[derive(Debug)]
pub struct InMemoryCacheBackend {
    state: RwLock<MemoryState>,
    available: AtomicBool,
    sweep_threshold: usize,
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::with_sweep_threshold(SWEEP_THRESHOLD)
    }
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        let sweep_threshold = sweep_threshold.max(1);
        Self {
            state: RwLock::new(MemoryState {
                next_sweep: sweep_threshold,
                ..MemoryState::default()
            }),
            available: AtomicBool::new(true),
            sweep_threshold,
        }
    }

    /// Entries held in memory, expired or not.
    pub async fn stored_entries(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Tags that still index at least one stored entry.
    pub async fn indexed_tags(&self) -> usize {
        self.state.read().await.tag_index.len()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .map(|entry| entry.expires_at > Instant::now())
            .unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.read().await;
        state.entries.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory cache marked unavailable".to_string()))
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.ensure_available()?;
        let now = Instant::now();

        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut state = self.state.write().await;
        if state.entries.get(key).map(|e| e.expires_at <= now).unwrap_or(false) {
            state.remove_key(key);
            debug!("Expired cache entry {}", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) -> Result<(), CacheError> {
        self.ensure_available()?;
        if tags.is_empty() {
            return Err(CacheError::MissingTags(key.to_string()));
        }

        let now = Instant::now();
        let mut state = self.state.write().await;
        if state.entries.len() >= state.next_sweep {
            let swept = state.sweep_expired(now);
            state.next_sweep = self.sweep_threshold.max(state.entries.len() * 2);
            debug!("Swept {} expired cache entries, {} remain", swept, state.entries.len());
        }

        state.remove_key(key);
        for tag in tags {
            state
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                tags: tags.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn evict_by_tag(&self, tag: &str) -> Result<u64, CacheError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let keys: Vec<String> = state
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for key in keys {
            if state.remove_key(&key) {
                removed += 1;
            }
        }
        state.tag_index.remove(tag);

        debug!("Evicted {} entries tagged '{}'", removed, tag);
        Ok(removed)
    }

    async fn evict_by_key(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        Ok(state.remove_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tag_eviction_spans_key_templates() {
        let cache = InMemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);

        cache.set("slots:D1", json!([1]), ttl, &tags(&["appointments"])).await.unwrap();
        cache.set("dashboard:D1", json!({"n": 1}), ttl, &tags(&["appointments", "ratings"])).await.unwrap();
        cache.set("ratings:D1", json!(4.5), ttl, &tags(&["ratings"])).await.unwrap();

        assert_eq!(cache.evict_by_tag("appointments").await.unwrap(), 2);
        assert!(!cache.contains_key("dashboard:D1").await);
        assert!(cache.contains_key("ratings:D1").await);

        // The dashboard entry must also be gone from the ratings index.
        assert_eq!(cache.evict_by_tag("ratings").await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_untagged_set_is_rejected() {
        let cache = InMemoryCacheBackend::new();
        let result = cache.set("orphan", json!(null), Duration::from_secs(1), &[]).await;
        assert_eq!(result, Err(CacheError::MissingTags("orphan".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryCacheBackend::new();
        cache
            .set("k", json!("v"), Duration::from_secs(10), &tags(&["t"]))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.evict_by_tag("t").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_swept_without_reads() {
        let cache = InMemoryCacheBackend::with_sweep_threshold(2);
        let short = Duration::from_secs(10);
        cache.set("slots:D1", json!([1]), short, &tags(&["appointments"])).await.unwrap();
        cache.set("slots:D2", json!([2]), short, &tags(&["appointments"])).await.unwrap();
        assert_eq!(cache.stored_entries().await, 2);

        tokio::time::advance(Duration::from_secs(11)).await;

        // Neither expired key is ever read again.
        cache.set("ratings:D1", json!(4.5), Duration::from_secs(60), &tags(&["ratings"])).await.unwrap();
        assert_eq!(cache.stored_entries().await, 1);
        assert_eq!(cache.indexed_tags().await, 1);
        assert_eq!(cache.get("ratings:D1").await.unwrap(), Some(json!(4.5)));
    }

    #[tokio::test]
    async fn test_unavailable_backend_errors() {
        let cache = InMemoryCacheBackend::new();
        cache.set_available(false);

        assert!(matches!(cache.get("k").await, Err(CacheError::Unavailable(_))));
        assert!(matches!(cache.evict_by_tag("t").await, Err(CacheError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_reset_key_moves_between_tags() {
        let cache = InMemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        cache.set("k", json!(1), ttl, &tags(&["a"])).await.unwrap();
        cache.set("k", json!(2), ttl, &tags(&["b"])).await.unwrap();

        assert_eq!(cache.evict_by_tag("a").await.unwrap(), 0);
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
        assert!(cache.evict_by_key("k").await.unwrap());
        assert!(!cache.evict_by_key("k").await.unwrap());
    }
}

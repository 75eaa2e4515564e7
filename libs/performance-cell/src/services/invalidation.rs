use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use shared_config::CacheConfig;
use shared_models::{DomainEvent, EngineError, EventContext};

use crate::models::{CacheError, CacheMetrics, CacheStats, InvalidationReport};
use crate::services::cache::{CacheBackend, InMemoryCacheBackend};
use crate::services::redis_backend::RedisCacheBackend;
use crate::services::registry::{CacheDefinition, CacheRegistry};

/// Keeps cached read views consistent with committed writes by evicting on
/// domain events, using the registry's declared triggers and tags.
pub struct CacheInvalidationEngine {
    registry: Arc<CacheRegistry>,
    backend: Arc<dyn CacheBackend>,
    degraded_ttl: Duration,
    /// Keys and `tag:` markers that must be read from the store until the
    /// recorded instant.
    bypass: RwLock<HashMap<String, Instant>>,
    /// Invalidation counter per key and `tag:` marker. A refill may only be
    /// written back if none of its markers moved while the loader ran.
    generations: RwLock<HashMap<String, u64>>,
    degraded_until: RwLock<Option<Instant>>,
    metrics: CacheMetrics,
}

impl CacheInvalidationEngine {
    pub fn new(registry: Arc<CacheRegistry>, backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            registry,
            backend,
            degraded_ttl: Duration::from_secs(config.degraded_ttl_seconds),
            bypass: RwLock::new(HashMap::new()),
            generations: RwLock::new(HashMap::new()),
            degraded_until: RwLock::new(None),
            metrics: CacheMetrics::default(),
        }
    }

    /// Engine over the backend `config` asks for. An unreachable Redis falls
    /// back to the in-process backend rather than failing startup.
    pub async fn connect(registry: Arc<CacheRegistry>, config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = match config.redis_url {
            Some(_) => match RedisCacheBackend::new(config).await {
                Ok(redis) => Arc::new(redis),
                Err(err) => {
                    warn!("Redis cache unavailable ({}), using in-memory cache", err);
                    Arc::new(InMemoryCacheBackend::new())
                }
            },
            None => {
                debug!("No REDIS_URL configured, using in-memory cache");
                Arc::new(InMemoryCacheBackend::new())
            }
        };
        Self::new(registry, backend, config)
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Evict every entry affected by `event`. Each triggered definition's
    /// resolved key is evicted, then each of its tags, which cascades to every
    /// entry sharing the tag.
    #[instrument(skip(self, event), fields(event = %event.name))]
    pub async fn on_event(&self, event: &DomainEvent) -> Result<InvalidationReport, CacheError> {
        let mut report = InvalidationReport::new(event.name);
        self.advance_generations(event).await;

        for definition in self.registry.triggered_by(event.name) {
            report.definitions.push(definition.name.clone());

            match definition.resolve_key(&event.context) {
                Some(key) => {
                    if self.backend.evict_by_key(&key).await? {
                        report.entries_evicted += 1;
                    }
                    report.keys.push(key);
                }
                None => debug!(
                    "Context for {} lacks placeholders of '{}', relying on tag eviction",
                    event.name, definition.name
                ),
            }

            for tag in &definition.tags {
                if report.tags.insert(tag.clone()) {
                    report.entries_evicted += self.backend.evict_by_tag(tag).await?;
                }
            }
        }

        CacheMetrics::incr(&self.metrics.evictions, report.entries_evicted);
        debug!(
            "{} evicted {} entries across tags {:?}",
            event.name, report.entries_evicted, report.tags
        );
        Ok(report)
    }

    /// `on_event` that never fails. When eviction cannot complete, every key
    /// and tag the event would have touched is bypassed until the stale
    /// entries behind it have naturally expired, or until a later read manages
    /// to redo the eviction.
    pub async fn invalidate_or_bypass(&self, event: &DomainEvent) -> InvalidationReport {
        match self.on_event(event).await {
            Ok(report) => report,
            Err(err) => {
                warn!("Invalidation for {} failed ({}), bypassing affected cache entries", event.name, err);
                CacheMetrics::incr(&self.metrics.invalidation_failures, 1);

                let mut report = InvalidationReport::new(event.name);
                report.degraded = true;
                let now = Instant::now();
                let mut bypass = self.bypass.write().await;

                for definition in self.registry.triggered_by(event.name) {
                    report.definitions.push(definition.name.clone());
                    if let Some(key) = definition.resolve_key(&event.context) {
                        extend_bypass(&mut bypass, key.clone(), now + definition.ttl());
                        report.keys.push(key);
                    }
                    for tag in &definition.tags {
                        extend_bypass(&mut bypass, tag_marker(tag), now + self.registry.max_ttl_for_tag(tag));
                        report.tags.insert(tag.clone());
                    }
                }
                drop(bypass);

                self.enter_degraded().await;
                report
            }
        }
    }

    /// Read through the cache. Cache failures never fail the read: the loader
    /// is authoritative whenever the backend is unavailable or the entry is
    /// bypassed.
    pub async fn get_or_load<T, F, Fut>(&self, name: &str, context: &EventContext, loader: F) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let Some(definition) = self.registry.get(name) else {
            warn!("No cache definition named '{}', reading through", name);
            return loader().await;
        };
        let Some(key) = definition.resolve_key(context) else {
            warn!("Cannot resolve key for '{}' from context, reading through", name);
            return loader().await;
        };

        if self.is_bypassed(&key, definition).await {
            CacheMetrics::incr(&self.metrics.degraded_reads, 1);
            return loader().await;
        }

        match self.backend.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(cached) => {
                    CacheMetrics::incr(&self.metrics.hits, 1);
                    return Ok(cached);
                }
                Err(err) => warn!("Discarding undecodable cache entry {}: {}", key, err),
            },
            Ok(None) => {}
            Err(err) => {
                warn!("Cache read for {} failed ({}), serving from store", key, err);
                self.enter_degraded().await;
                CacheMetrics::incr(&self.metrics.degraded_reads, 1);
                return loader().await;
            }
        }

        CacheMetrics::incr(&self.metrics.misses, 1);
        let markers = refill_markers(&key, definition);
        let observed = self.snapshot_generations(&markers).await;
        let value = loader().await?;

        // Held across the write so an invalidation either lands before the
        // comparison or evicts the value after it.
        let generations = self.generations.read().await;
        if markers.iter().zip(&observed).any(|(marker, seen)| generation_of(&generations, marker) != *seen) {
            debug!("{} was invalidated while loading, not caching the refill", key);
            CacheMetrics::incr(&self.metrics.discarded_refills, 1);
            return Ok(value);
        }
        self.store(definition, &key, &value).await;
        drop(generations);
        Ok(value)
    }

    async fn snapshot_generations(&self, markers: &[String]) -> Vec<u64> {
        let generations = self.generations.read().await;
        markers.iter().map(|marker| generation_of(&generations, marker)).collect()
    }

    /// Bumped before any eviction, so a refill that started earlier can never
    /// be written back over the eviction.
    async fn advance_generations(&self, event: &DomainEvent) {
        let mut generations = self.generations.write().await;
        for definition in self.registry.triggered_by(event.name) {
            if let Some(key) = definition.resolve_key(&event.context) {
                *generations.entry(key).or_insert(0) += 1;
            }
            for tag in &definition.tags {
                *generations.entry(tag_marker(tag)).or_insert(0) += 1;
            }
        }
    }

    async fn store<T: Serialize>(&self, definition: &CacheDefinition, key: &str, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(err) => {
                warn!("Cannot serialize value for {}: {}", key, err);
                return;
            }
        };

        let ttl = if self.is_degraded().await {
            definition.ttl().min(self.degraded_ttl)
        } else {
            definition.ttl()
        };

        if let Err(err) = self.backend.set(key, json, ttl, &definition.tag_list()).await {
            warn!("Cache write for {} failed: {}", key, err);
            self.enter_degraded().await;
        }
    }

    /// True while a failed eviction still covers `key`. Each check retries
    /// the pending evictions; once they succeed the bypass is lifted.
    async fn is_bypassed(&self, key: &str, definition: &CacheDefinition) -> bool {
        let now = Instant::now();
        let pending: Vec<String> = {
            let bypass = self.bypass.read().await;
            if bypass.is_empty() {
                return false;
            }
            refill_markers(key, definition)
                .into_iter()
                .filter(|marker| bypass.get(marker).map(|until| *until > now).unwrap_or(false))
                .collect()
        };

        if pending.is_empty() {
            self.bypass.write().await.retain(|_, until| *until > now);
            return false;
        }

        for marker in &pending {
            let repaired = match marker.strip_prefix(TAG_MARKER_PREFIX) {
                Some(tag) => self.backend.evict_by_tag(tag).await.map(|_| ()),
                None => self.backend.evict_by_key(marker).await.map(|_| ()),
            };
            if let Err(err) = repaired {
                debug!("Bypass for {} still pending: {}", marker, err);
                return true;
            }
        }

        let mut bypass = self.bypass.write().await;
        for marker in &pending {
            bypass.remove(marker);
        }
        info!("Completed {} deferred cache evictions", pending.len());
        false
    }

    async fn enter_degraded(&self) {
        let until = Instant::now() + self.degraded_ttl;
        let mut degraded_until = self.degraded_until.write().await;
        if degraded_until.map(|current| current < until).unwrap_or(true) {
            if degraded_until.is_none() {
                info!("Cache entering degraded mode for {:?}", self.degraded_ttl);
            }
            *degraded_until = Some(until);
        }
    }

    pub async fn is_degraded(&self) -> bool {
        let mut degraded_until = self.degraded_until.write().await;
        match *degraded_until {
            Some(until) if until > Instant::now() => true,
            Some(_) => {
                info!("Cache leaving degraded mode");
                *degraded_until = None;
                false
            }
            None => false,
        }
    }
}

const TAG_MARKER_PREFIX: &str = "tag:";

fn tag_marker(tag: &str) -> String {
    format!("{}{}", TAG_MARKER_PREFIX, tag)
}

fn refill_markers(key: &str, definition: &CacheDefinition) -> Vec<String> {
    std::iter::once(key.to_string())
        .chain(definition.tags.iter().map(|tag| tag_marker(tag)))
        .collect()
}

fn generation_of(generations: &HashMap<String, u64>, marker: &str) -> u64 {
    generations.get(marker).copied().unwrap_or(0)
}

fn extend_bypass(bypass: &mut HashMap<String, Instant>, marker: String, until: Instant) {
    let entry = bypass.entry(marker).or_insert(until);
    if *entry < until {
        *entry = until;
    }
}

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use shared_models::{EngineError, EventName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub degraded_reads: u64,
    pub invalidation_failures: u64,
    /// Loads whose result was not cached because an invalidation overlapped them.
    pub discarded_refills: u64,
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub degraded_reads: AtomicU64,
    pub invalidation_failures: AtomicU64,
    pub discarded_refills: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            evictions: self.evictions.load(Ordering::Relaxed),
            degraded_reads: self.degraded_reads.load(Ordering::Relaxed),
            invalidation_failures: self.invalidation_failures.load(Ordering::Relaxed),
            discarded_refills: self.discarded_refills.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// What a single domain event evicted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidationReport {
    pub event: EventName,
    pub definitions: Vec<String>,
    pub keys: Vec<String>,
    pub tags: BTreeSet<String>,
    pub entries_evicted: u64,
    /// Eviction failed; the affected keys and tags are read straight from
    /// the store until a retried eviction succeeds or their entries expire.
    pub degraded: bool,
}

impl InvalidationReport {
    pub fn new(event: EventName) -> Self {
        Self {
            event,
            definitions: Vec::new(),
            keys: Vec::new(),
            tags: BTreeSet::new(),
            entries_evicted: 0,
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Cache entry '{0}' must carry at least one tag")]
    MissingTags(String),
    #[error("Invalid cache definition: {0}")]
    InvalidDefinition(String),
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        EngineError::CacheBackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

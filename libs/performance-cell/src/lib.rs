// =====================================================================================
// PERFORMANCE CELL - CACHING & INVALIDATION
// =====================================================================================

pub mod models;
pub mod services;

pub use models::*;
pub use services::{
    CacheBackend, CacheDefinition, CacheInvalidationEngine, CacheRegistry, InMemoryCacheBackend,
    RedisCacheBackend,
};

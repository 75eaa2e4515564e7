pub mod cache;
pub mod invalidation;
pub mod redis_backend;
pub mod registry;

pub use cache::{CacheBackend, InMemoryCacheBackend};
pub use invalidation::CacheInvalidationEngine;
pub use redis_backend::RedisCacheBackend;
pub use registry::{CacheDefinition, CacheRegistry};

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use serde_json::Value;
use tracing::{debug, info};

use shared_config::CacheConfig;

use crate::models::CacheError;
use crate::services::cache::CacheBackend;

/// Redis-backed cache. Each tag is a Redis set of the keys carrying it; tag
/// sets are never expired and are cleared when the tag is evicted.
pub struct RedisCacheBackend {
    pool: Pool,
    prefix: String,
    evict_script: Script,
}

/// Reads the tag set, deletes its members and the set itself as one atomic
/// step, so a key tagged concurrently lands either before (and is deleted)
/// or after (in a fresh set). Members are deleted in chunks to stay under
/// Lua's unpack limit.
const EVICT_BY_TAG_SCRIPT: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
local removed = 0
for i = 1, #members, 500 do
    local last = math.min(i + 499, #members)
    removed = removed + redis.call('DEL', unpack(members, i, last))
end
redis.call('DEL', KEYS[1])
return removed
"#;

impl RedisCacheBackend {
    pub async fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(format!("Pool creation error: {}", e)))?;

        let backend = Self {
            pool,
            prefix: config.key_prefix.clone(),
            evict_script: Script::new(EVICT_BY_TAG_SCRIPT),
        };

        let mut conn = backend.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        info!("Redis cache backend initialized successfully");

        Ok(backend)
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(format!("Connection error: {}", e)))
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.prefix, tag)
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.entry_key(key)).await.map_err(unavailable)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) -> Result<(), CacheError> {
        if tags.is_empty() {
            return Err(CacheError::MissingTags(key.to_string()));
        }

        let entry_key = self.entry_key(key);
        let payload = serde_json::to_string(&value)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&entry_key)
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .ignore();
        for tag in tags {
            pipe.cmd("SADD").arg(self.tag_key(tag)).arg(&entry_key).ignore();
        }

        let mut conn = self.connection().await?;
        let _: () = pipe.query_async(&mut conn).await.map_err(unavailable)?;
        debug!("Cached {} under {} tag(s)", key, tags.len());
        Ok(())
    }

    async fn evict_by_tag(&self, tag: &str) -> Result<u64, CacheError> {
        let tag_key = self.tag_key(tag);
        let mut conn = self.connection().await?;

        let removed: u64 = self
            .evict_script
            .key(&tag_key)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        debug!("Evicted {} Redis entries tagged '{}'", removed, tag);
        Ok(removed)
    }

    async fn evict_by_key(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(self.entry_key(key)).await.map_err(unavailable)?;
        Ok(removed > 0)
    }
}

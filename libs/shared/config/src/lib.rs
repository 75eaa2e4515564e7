use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub scheduling: SchedulingConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

/// Working hours and booking-window rules used by the slot allocator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingConfig {
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub slot_duration_minutes: u32,
    pub min_hours_before_booking: u32,
    pub max_days_advance_booking: u32,
    pub max_concurrent_consultations: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            working_hours_start: 9,
            working_hours_end: 17,
            slot_duration_minutes: 30,
            min_hours_before_booking: 0,
            max_days_advance_booking: 30,
            max_concurrent_consultations: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub lock_timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_min_ms: 100,
            backoff_max_ms: 500,
            lock_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// When unset the engine runs on the in-process cache backend.
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub degraded_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "telemed".to_string(),
            degraded_ttl_seconds: 300,
        }
    }
}

/// Base requests-per-window for each limit class, before role multipliers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub auth: u32,
    pub upload: u32,
    pub konsultasi: u32,
    pub search: u32,
    pub admin: u32,
    pub general: u32,
    pub decay_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: 5,
            upload: 10,
            konsultasi: 20,
            search: 30,
            admin: 100,
            general: 60,
            decay_seconds: 60,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and then read the environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let scheduling_defaults = SchedulingConfig::default();
        let retry_defaults = RetryConfig::default();
        let cache_defaults = CacheConfig::default();
        let rate_defaults = RateLimitConfig::default();

        let config = Self {
            scheduling: SchedulingConfig {
                working_hours_start: env_or("WORKING_HOURS_START", scheduling_defaults.working_hours_start),
                working_hours_end: env_or("WORKING_HOURS_END", scheduling_defaults.working_hours_end),
                slot_duration_minutes: env_or("SLOT_DURATION_MINUTES", scheduling_defaults.slot_duration_minutes),
                min_hours_before_booking: env_or("MIN_HOURS_BEFORE_BOOKING", scheduling_defaults.min_hours_before_booking),
                max_days_advance_booking: env_or("MAX_DAYS_ADVANCE_BOOKING", scheduling_defaults.max_days_advance_booking),
                max_concurrent_consultations: env_or("MAX_CONCURRENT_CONSULTATIONS", scheduling_defaults.max_concurrent_consultations),
            },
            retry: RetryConfig {
                max_retries: env_or("DEADLOCK_MAX_RETRIES", retry_defaults.max_retries),
                backoff_min_ms: env_or("DEADLOCK_BACKOFF_MIN", retry_defaults.backoff_min_ms),
                backoff_max_ms: env_or("DEADLOCK_BACKOFF_MAX", retry_defaults.backoff_max_ms),
                lock_timeout_seconds: env_or("LOCK_TIMEOUT", retry_defaults.lock_timeout_seconds),
            },
            cache: CacheConfig {
                redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
                key_prefix: env::var("CACHE_PREFIX").unwrap_or(cache_defaults.key_prefix),
                degraded_ttl_seconds: env_or("CACHE_DEGRADED_TTL", cache_defaults.degraded_ttl_seconds),
            },
            rate_limit: RateLimitConfig {
                auth: env_or("RATE_LIMIT_AUTH", rate_defaults.auth),
                upload: env_or("RATE_LIMIT_UPLOAD", rate_defaults.upload),
                konsultasi: env_or("RATE_LIMIT_KONSULTASI", rate_defaults.konsultasi),
                search: env_or("RATE_LIMIT_SEARCH", rate_defaults.search),
                admin: env_or("RATE_LIMIT_ADMIN", rate_defaults.admin),
                general: env_or("RATE_LIMIT_GENERAL", rate_defaults.general),
                decay_seconds: env_or("RATE_LIMIT_DECAY_SECONDS", rate_defaults.decay_seconds),
            },
        };

        if !config.is_consistent() {
            warn!("Scheduling configuration is inconsistent, falling back to defaults for invalid sections");
            return config.sanitized();
        }

        config
    }

    /// Working hours must describe a non-empty day and backoff bounds must be ordered.
    pub fn is_consistent(&self) -> bool {
        let scheduling = &self.scheduling;
        scheduling.working_hours_start < scheduling.working_hours_end
            && scheduling.working_hours_end <= 24
            && scheduling.slot_duration_minutes > 0
            && self.retry.backoff_min_ms <= self.retry.backoff_max_ms
    }

    fn sanitized(mut self) -> Self {
        let scheduling = &self.scheduling;
        if scheduling.working_hours_start >= scheduling.working_hours_end
            || scheduling.working_hours_end > 24
            || scheduling.slot_duration_minutes == 0
        {
            self.scheduling = SchedulingConfig::default();
        }
        if self.retry.backoff_min_ms > self.retry.backoff_max_ms {
            self.retry = RetryConfig::default();
        }
        self
    }

    pub fn is_redis_configured(&self) -> bool {
        self.cache.redis_url.is_some()
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_business_rules() {
        let config = AppConfig::default();

        assert_eq!(config.scheduling.working_hours_start, 9);
        assert_eq!(config.scheduling.working_hours_end, 17);
        assert_eq!(config.scheduling.slot_duration_minutes, 30);
        assert_eq!(config.scheduling.max_days_advance_booking, 30);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.lock_timeout_seconds, 30);
        assert_eq!(config.cache.degraded_ttl_seconds, 300);
        assert_eq!(config.rate_limit.general, 60);
        assert!(config.is_consistent());
        assert!(!config.is_redis_configured());
    }

    #[test]
    fn test_sanitized_restores_inverted_sections() {
        let mut config = AppConfig::default();
        config.scheduling.working_hours_start = 18;
        config.retry.backoff_min_ms = 900;

        assert!(!config.is_consistent());

        let config = config.sanitized();
        assert_eq!(config.scheduling, SchedulingConfig::default());
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("SHARED_CONFIG_TEST_GARBAGE", 42u32), 42);

        env::set_var("SHARED_CONFIG_TEST_VALID", " 7 ");
        assert_eq!(env_or("SHARED_CONFIG_TEST_VALID", 42u32), 7);
    }
}

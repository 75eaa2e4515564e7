use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use shared_config::RateLimitConfig;
use shared_models::UserRole;

use crate::models::{LimitClass, RateLimitError, RateLimitStatus};

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    user_id: String,
    class: LimitClass,
}

#[derive(Debug, Default)]
struct WindowEntry {
    requests: VecDeque<Instant>,
}

impl WindowEntry {
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.requests.front() {
            if now.duration_since(oldest) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        self.requests
            .front()
            .map(|&oldest| (oldest + window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Sliding-window limiter keyed by `(user, class)`, with the limit scaled by
/// the caller's role.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<BucketKey, WindowEntry>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.decay_seconds)
    }

    /// Admit one request, or report how long until the oldest request in the
    /// window decays.
    #[instrument(skip(self))]
    pub async fn check(
        &self,
        user_id: &str,
        class: LimitClass,
        role: UserRole,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let now = Instant::now();
        let window = self.window();
        let limit = class.effective_limit(&self.config, role);
        let mut windows = self.windows.write().await;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, entry| {
                entry.evict_expired(now, window);
                !entry.requests.is_empty()
            });
        }

        let entry = windows
            .entry(BucketKey {
                user_id: user_id.to_string(),
                class,
            })
            .or_default();
        entry.evict_expired(now, window);

        if entry.requests.len() as u32 >= limit {
            let retry_after_seconds = ceil_seconds(entry.reset_after(now, window)).max(1);
            warn!(
                "Rate limit hit for user {} ({}) on {}: {} requests in window",
                user_id,
                role,
                class,
                entry.requests.len()
            );
            return Err(RateLimitError::LimitExceeded {
                class,
                limit,
                retry_after_seconds,
            });
        }

        entry.requests.push_back(now);
        let remaining = limit - entry.requests.len() as u32;
        debug!("Admitted {} request for {} ({} remaining)", class, user_id, remaining);

        Ok(RateLimitStatus {
            class,
            limit,
            remaining,
            reset_after_seconds: ceil_seconds(entry.reset_after(now, window)),
        })
    }

    /// Current allowance without consuming a request.
    pub async fn status(&self, user_id: &str, class: LimitClass, role: UserRole) -> RateLimitStatus {
        let now = Instant::now();
        let window = self.window();
        let limit = class.effective_limit(&self.config, role);
        let windows = self.windows.read().await;

        let key = BucketKey {
            user_id: user_id.to_string(),
            class,
        };
        match windows.get(&key) {
            Some(entry) => {
                let live: Vec<&Instant> = entry
                    .requests
                    .iter()
                    .filter(|&&at| now.duration_since(at) < window)
                    .collect();
                let reset_after = live
                    .first()
                    .map(|&&oldest| (oldest + window).saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);

                RateLimitStatus {
                    class,
                    limit,
                    remaining: limit.saturating_sub(live.len() as u32),
                    reset_after_seconds: ceil_seconds(reset_after),
                }
            }
            None => RateLimitStatus {
                class,
                limit,
                remaining: limit,
                reset_after_seconds: 0,
            },
        }
    }

    /// Drop every bucket belonging to `user_id`.
    pub async fn reset(&self, user_id: &str) {
        let mut windows = self.windows.write().await;
        windows.retain(|key, _| key.user_id != user_id);
    }

    /// Remove buckets with no request inside the current window.
    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, entry| {
            entry.evict_expired(now, window);
            !entry.requests.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked_buckets(&self) -> usize {
        self.windows.read().await.len()
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_seconds_rounds_partial_seconds_up() {
        assert_eq!(ceil_seconds(Duration::from_millis(0)), 0);
        assert_eq!(ceil_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ceil_seconds(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_seconds(Duration::from_secs(60)), 60);
    }
}

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use shared_config::RetryConfig;
use shared_models::EngineError;

use crate::models::RetryStats;

/// Picks the pause between two conflicting attempts.
pub trait JitterSource: Send + Sync {
    fn backoff(&self, min: Duration, max: Duration) -> Duration;
}

/// Uniform jitter, drawn independently for every pause.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn backoff(&self, min: Duration, max: Duration) -> Duration {
        let (min_ms, max_ms) = (min.as_millis() as u64, max.as_millis() as u64);
        if max_ms <= min_ms {
            return min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

/// Always waits the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn backoff(&self, min: Duration, max: Duration) -> Duration {
        self.0.clamp(min, max.max(min))
    }
}

/// Bounded optimistic-concurrency retry loop.
///
/// An operation gets one initial attempt plus `max_retries` retries, each retry
/// preceded by a jittered pause. The whole sequence, pauses included, runs
/// under the lock timeout.
pub struct ConflictResolver {
    config: RetryConfig,
    jitter: Arc<dyn JitterSource>,
}

impl ConflictResolver {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_jitter(config, Arc::new(RandomJitter))
    }

    pub fn with_jitter(config: RetryConfig, jitter: Arc<dyn JitterSource>) -> Self {
        Self { config, jitter }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.config.lock_timeout_seconds)
    }

    /// Run `operation` until it succeeds, fails with a non-contention error,
    /// or runs out of retries. `operation` receives the 1-based attempt
    /// number.
    pub async fn with_retry<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let attempts = AtomicU32::new(0);

        match tokio::time::timeout(self.lock_timeout(), self.run(name, operation, &attempts)).await {
            Ok(result) => result,
            Err(_) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(
                    "{} exceeded lock timeout of {}s after {} attempt(s)",
                    name, self.config.lock_timeout_seconds, attempts
                );
                Err(EngineError::LockTimeout {
                    operation: name.to_string(),
                    timeout_seconds: self.config.lock_timeout_seconds,
                    attempts,
                })
            }
        }
    }

    async fn run<T, F, Fut>(&self, name: &str, mut operation: F, attempts: &AtomicU32) -> Result<T, EngineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let min = Duration::from_millis(self.config.backoff_min_ms);
        let max = Duration::from_millis(self.config.backoff_max_ms);
        let mut stats = RetryStats::default();

        loop {
            stats.attempts = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("{} attempt {}/{}", name, stats.attempts, self.config.max_retries + 1);

            match operation(stats.attempts).await {
                Ok(value) => {
                    if stats.attempts > 1 {
                        info!(
                            "{} succeeded after {} attempts ({}ms backoff)",
                            name,
                            stats.attempts,
                            stats.backoff_ms()
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if stats.retries() >= self.config.max_retries {
                        return Err(self.exhausted(name, err, stats));
                    }

                    let delay = self.jitter.backoff(min, max);
                    warn!(
                        "{} conflicted on attempt {} ({}), retrying in {}ms",
                        name,
                        stats.attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    stats.total_backoff += delay;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// A lost slot race stays `SlotUnavailable`; any other exhausted
    /// contention becomes `ConflictExceeded`.
    fn exhausted(&self, name: &str, last: EngineError, stats: RetryStats) -> EngineError {
        warn!(
            "{} gave up after {} attempts ({}ms backoff): {}",
            name,
            stats.attempts,
            stats.backoff_ms(),
            last
        );

        match last {
            EngineError::SlotUnavailable {
                doctor_id,
                date,
                start_time,
                alternatives,
                ..
            } => EngineError::SlotUnavailable {
                doctor_id,
                date,
                start_time,
                attempts: stats.attempts,
                alternatives,
            },
            _ => EngineError::ConflictExceeded {
                operation: name.to_string(),
                retries: stats.retries(),
                backoff_ms: stats.backoff_ms(),
            },
        }
    }
}

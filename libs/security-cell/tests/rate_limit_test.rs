use std::time::Duration;

use assert_matches::assert_matches;
use tokio_test::{assert_err, assert_ok};

use security_cell::{LimitClass, RateLimitError, RateLimiter};
use shared_config::RateLimitConfig;
use shared_models::{EngineError, UserRole};

fn limiter() -> RateLimiter {
    RateLimiter::new(RateLimitConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_pasien_general_61st_request_is_limited() {
    let limiter = limiter();

    for _ in 0..60 {
        assert_ok!(limiter.check("pasien-1", LimitClass::General, UserRole::Pasien).await);
    }

    let rejected = limiter.check("pasien-1", LimitClass::General, UserRole::Pasien).await;
    assert_matches!(
        rejected,
        Err(RateLimitError::LimitExceeded { limit: 60, retry_after_seconds, .. }) if retry_after_seconds <= 60 && retry_after_seconds >= 1
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_shrinks_as_window_slides() {
    let limiter = limiter();

    for _ in 0..2 {
        assert_ok!(limiter.check("guest-1", LimitClass::Auth, UserRole::Guest).await);
    }
    tokio::time::advance(Duration::from_secs(45)).await;

    let err = assert_err!(limiter.check("guest-1", LimitClass::Auth, UserRole::Guest).await);
    assert_matches!(err, RateLimitError::LimitExceeded { retry_after_seconds: 15, limit: 2, .. });
}

#[tokio::test(start_paused = true)]
async fn test_budget_recovers_after_decay_window() {
    let limiter = limiter();

    for _ in 0..5 {
        assert_ok!(limiter.check("pasien-2", LimitClass::Auth, UserRole::Pasien).await);
    }
    assert_err!(limiter.check("pasien-2", LimitClass::Auth, UserRole::Pasien).await);

    tokio::time::advance(Duration::from_secs(60)).await;

    let status = assert_ok!(limiter.check("pasien-2", LimitClass::Auth, UserRole::Pasien).await);
    assert_eq!(status.remaining, 4);
}

#[tokio::test(start_paused = true)]
async fn test_role_multiplier_scales_budget() {
    let limiter = limiter();

    for _ in 0..30 {
        assert_ok!(limiter.check("dokter-1", LimitClass::Konsultasi, UserRole::Dokter).await);
    }
    assert_err!(limiter.check("dokter-1", LimitClass::Konsultasi, UserRole::Dokter).await);
}

#[tokio::test(start_paused = true)]
async fn test_classes_and_users_have_independent_buckets() {
    let limiter = limiter();

    for _ in 0..2 {
        assert_ok!(limiter.check("guest-2", LimitClass::Auth, UserRole::Guest).await);
    }
    assert_err!(limiter.check("guest-2", LimitClass::Auth, UserRole::Guest).await);

    assert_ok!(limiter.check("guest-2", LimitClass::Search, UserRole::Guest).await);
    assert_ok!(limiter.check("guest-3", LimitClass::Auth, UserRole::Guest).await);
    assert_eq!(limiter.tracked_buckets().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_status_does_not_consume_budget() {
    let limiter = limiter();
    assert_ok!(limiter.check("admin-1", LimitClass::Admin, UserRole::Admin).await);

    let before = limiter.status("admin-1", LimitClass::Admin, UserRole::Admin).await;
    let after = limiter.status("admin-1", LimitClass::Admin, UserRole::Admin).await;

    assert_eq!(before.limit, 200);
    assert_eq!(before.remaining, 199);
    assert_eq!(after, before);
    assert_eq!(before.reset_after_seconds, 60);
}

#[tokio::test(start_paused = true)]
async fn test_reset_and_prune_drop_buckets() {
    let limiter = limiter();
    assert_ok!(limiter.check("u1", LimitClass::General, UserRole::Pasien).await);
    assert_ok!(limiter.check("u1", LimitClass::Upload, UserRole::Pasien).await);
    assert_ok!(limiter.check("u2", LimitClass::General, UserRole::Pasien).await);

    limiter.reset("u1").await;
    assert_eq!(limiter.tracked_buckets().await, 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(limiter.prune_idle().await, 1);
    assert_eq!(limiter.tracked_buckets().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_limit_error_maps_to_engine_rate_limited() {
    let limiter = limiter();
    for _ in 0..2 {
        assert_ok!(limiter.check("guest-4", LimitClass::Auth, UserRole::Guest).await);
    }

    let err: EngineError = assert_err!(limiter.check("guest-4", LimitClass::Auth, UserRole::Guest).await).into();
    assert_matches!(err, EngineError::RateLimited { ref class, retry_after_seconds: 60 } if class == "auth");
}

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use shared_config::{AppConfig, RetryConfig};
use shared_models::{Consultation, Prescription, Rating, Slot, Status};

use crate::clock::FixedClock;

pub struct TestConfig {
    pub max_retries: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub lock_timeout_seconds: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            backoff_min_ms: retry.backoff_min_ms,
            backoff_max_ms: retry.backoff_max_ms,
            lock_timeout_seconds: retry.lock_timeout_seconds,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.retry = RetryConfig {
            max_retries: self.max_retries,
            backoff_min_ms: self.backoff_min_ms,
            backoff_max_ms: self.backoff_max_ms,
            lock_timeout_seconds: self.lock_timeout_seconds,
        };
        config
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid test time")
}

pub fn clock_at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Arc<FixedClock> {
    let now = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant");
    Arc::new(FixedClock::new(now))
}

pub fn slot(doctor_id: Uuid, on: NaiveDate, hour: u32, minute: u32) -> Slot {
    Slot::new(doctor_id, on, time(hour, minute))
}

pub struct TestEntities;

impl TestEntities {
    pub fn consultation(appointment_id: Option<Uuid>, status: Status) -> Consultation {
        Consultation {
            id: Uuid::new_v4(),
            appointment_id,
            status,
            version: 0,
        }
    }

    pub fn prescription(status: Status) -> Prescription {
        Prescription {
            id: Uuid::new_v4(),
            consultation_id: Uuid::new_v4(),
            status,
            version: 0,
        }
    }

    pub fn rating(doctor_id: Uuid, status: Status) -> Rating {
        Rating {
            id: Uuid::new_v4(),
            doctor_id,
            status,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;

    #[test]
    fn test_config_creation() {
        let config = TestConfig {
            backoff_min_ms: 1,
            backoff_max_ms: 2,
            ..TestConfig::default()
        }
        .to_app_config();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_min_ms, 1);
        assert_eq!(config.scheduling.slot_duration_minutes, 30);
    }

    #[test]
    fn test_clock_fixture_pins_today() {
        let clock = clock_at(2025, 6, 9, 8, 0);
        assert_eq!(clock.today(), date(2025, 6, 9));
    }

    #[test]
    fn test_entity_fixtures_start_at_version_zero() {
        let rating = TestEntities::rating(Uuid::new_v4(), Status::Archived);
        assert_eq!(rating.version, 0);
        assert_eq!(rating.status, Status::Archived);
    }
}

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::slot::Slot;
use crate::status::{EntityKind, Status};

/// Errors surfaced by the scheduling engine to its callers.
///
/// Every variant carries enough context for the caller to decide whether to
/// resubmit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid {kind} status transition: {from} -> {to}")]
    InvalidTransition {
        kind: EntityKind,
        from: Status,
        to: Status,
    },

    #[error("Slot {start_time} on {date} for doctor {doctor_id} is unavailable after {attempts} attempt(s)")]
    SlotUnavailable {
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        attempts: u32,
        alternatives: Vec<Slot>,
    },

    #[error("Doctor {doctor_id} already has {active} active consultations (limit {limit})")]
    CapacityExceeded {
        doctor_id: Uuid,
        active: usize,
        limit: usize,
    },

    #[error("Operation '{operation}' still conflicting after {retries} retries ({backoff_ms}ms backoff)")]
    ConflictExceeded {
        operation: String,
        retries: u32,
        backoff_ms: u64,
    },

    #[error("Operation '{operation}' exceeded lock timeout of {timeout_seconds}s")]
    LockTimeout {
        operation: String,
        timeout_seconds: u64,
        attempts: u32,
    },

    #[error("Rate limit exceeded for '{class}', retry after {retry_after_seconds}s")]
    RateLimited {
        class: String,
        retry_after_seconds: u64,
    },

    #[error("Date {date} is outside the booking window [{earliest}, {latest}]")]
    OutsideBookingWindow {
        date: NaiveDate,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("Slot starting {start_time} on {date} is too close to now to be booked")]
    SlotInPast {
        date: NaiveDate,
        start_time: NaiveTime,
    },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Stale {kind} {id}: expected version {expected}, store has {actual}")]
    StaleVersion {
        kind: EntityKind,
        id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Unknown {0}")]
    UnknownValue(String),

    #[error("Booking store error: {0}")]
    Store(String),

    #[error("Cache backend unavailable: {0}")]
    CacheBackendUnavailable(String),
}

impl EngineError {
    /// Contention errors that the conflict resolver retries transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::SlotUnavailable { .. } | EngineError::StaleVersion { .. }
        )
    }
}

// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use shared_models::{EntityKind, Status};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransitionRequest {
    pub kind: EntityKind,
    pub id: Uuid,
    pub to: Status,
}

// ==============================================================================
// RETRY DIAGNOSTICS
// ==============================================================================

/// Attempts and backoff an operation consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_backoff: Duration,
}

impl RetryStats {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn backoff_ms(&self) -> u64 {
        self.total_backoff.as_millis() as u64
    }
}

// ==============================================================================
// SCHEDULING DEFAULTS
// ==============================================================================

/// Free slots offered alongside a `SlotUnavailable` rejection.
pub const MAX_ALTERNATIVE_SLOTS: usize = 3;

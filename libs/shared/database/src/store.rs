use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{Appointment, EngineError, Entity, EntityKind, NewAppointment, Status};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Version mismatch on {kind} {id}: expected {expected}, found {actual}")]
    VersionMismatch {
        kind: EntityKind,
        id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Slot {start_time} on {date} already taken for doctor {doctor_id}")]
    UniqueViolation {
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    },

    #[error("Doctor {doctor_id} has {active} active consultations (limit {limit})")]
    CapacityExceeded {
        doctor_id: Uuid,
        active: usize,
        limit: usize,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            StoreError::VersionMismatch {
                kind,
                id,
                expected,
                actual,
            } => EngineError::StaleVersion {
                kind,
                id,
                expected,
                actual,
            },
            StoreError::UniqueViolation {
                doctor_id,
                date,
                start_time,
            } => EngineError::SlotUnavailable {
                doctor_id,
                date,
                start_time,
                attempts: 1,
                alternatives: Vec::new(),
            },
            StoreError::CapacityExceeded {
                doctor_id,
                active,
                limit,
            } => EngineError::CapacityExceeded {
                doctor_id,
                active,
                limit,
            },
            StoreError::Backend(msg) => EngineError::Store(msg),
        }
    }
}

/// Single source of truth for entities. Arbitrates concurrent writers through
/// version checks and the slot uniqueness constraint, never through locks held
/// by callers.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Entity, StoreError>;

    /// Insert a `pending` appointment at version 0. Fails with
    /// `UniqueViolation` if a slot-occupying appointment overlaps it.
    async fn create_appointment(&self, data: NewAppointment) -> Result<Appointment, StoreError>;

    /// Compare-and-set on the entity version.
    async fn update_status(
        &self,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
    ) -> Result<Entity, StoreError>;

    /// `update_status` that commits only while `doctor_id` has fewer than
    /// `limit` active consultations. Counting and writing are one atomic step.
    async fn update_status_within_capacity(
        &self,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
        doctor_id: Uuid,
        limit: usize,
    ) -> Result<Entity, StoreError>;

    async fn list_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    /// Confirmed appointments plus `aktif` consultations for the doctor,
    /// counting an appointment and its consultation once.
    async fn count_active_consultations(&self, doctor_id: Uuid) -> Result<usize, StoreError>;
}

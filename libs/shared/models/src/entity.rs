use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slot::Slot;
use crate::status::{EntityKind, Status};

// ==============================================================================
// ENTITIES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub slot: Slot,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every committed write.
    pub version: u64,
}

impl Appointment {
    pub fn occupies_slot(&self) -> bool {
        self.status.occupies_slot()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub slot: Slot,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub status: Status,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub status: Status,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub status: Status,
    pub version: u64,
}

/// Any entity whose status is governed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Appointment(Appointment),
    Consultation(Consultation),
    Prescription(Prescription),
    Rating(Rating),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Appointment(_) => EntityKind::Appointment,
            Entity::Consultation(_) => EntityKind::Consultation,
            Entity::Prescription(_) => EntityKind::Prescription,
            Entity::Rating(_) => EntityKind::Rating,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::Appointment(a) => a.id,
            Entity::Consultation(c) => c.id,
            Entity::Prescription(p) => p.id,
            Entity::Rating(r) => r.id,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Entity::Appointment(a) => a.status,
            Entity::Consultation(c) => c.status,
            Entity::Prescription(p) => p.status,
            Entity::Rating(r) => r.status,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Entity::Appointment(a) => a.version,
            Entity::Consultation(c) => c.version,
            Entity::Prescription(p) => p.version,
            Entity::Rating(r) => r.version,
        }
    }

    /// Apply a committed status change. Only the store should call this.
    pub fn set_status(&mut self, status: Status) {
        match self {
            Entity::Appointment(a) => a.status = status,
            Entity::Consultation(c) => c.status = status,
            Entity::Prescription(p) => p.status = status,
            Entity::Rating(r) => r.status = status,
        }
        self.bump_version();
    }

    pub fn bump_version(&mut self) {
        match self {
            Entity::Appointment(a) => a.version += 1,
            Entity::Consultation(c) => c.version += 1,
            Entity::Prescription(p) => p.version += 1,
            Entity::Rating(r) => r.version += 1,
        }
    }

    pub fn as_appointment(&self) -> Option<&Appointment> {
        match self {
            Entity::Appointment(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Appointment> for Entity {
    fn from(value: Appointment) -> Self {
        Entity::Appointment(value)
    }
}

impl From<Consultation> for Entity {
    fn from(value: Consultation) -> Self {
        Entity::Consultation(value)
    }
}

impl From<Prescription> for Entity {
    fn from(value: Prescription) -> Self {
        Entity::Prescription(value)
    }
}

impl From<Rating> for Entity {
    fn from(value: Rating) -> Self {
        Entity::Rating(value)
    }
}

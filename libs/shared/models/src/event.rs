use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entity::Entity;
use crate::status::{EntityKind, Status};

/// Domain events emitted after a committed write. Cache invalidation and
/// external subscribers (mail, SIMRS sync) consume them independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    AppointmentBooked,
    AppointmentConfirmed,
    AppointmentRejected,
    AppointmentCancelled,
    AppointmentCompleted,
    AppointmentNoShow,
    DoctorScheduleChanged,
    ConsultationStarted,
    ConsultationCompleted,
    ConsultationCancelled,
    PrescriptionExpired,
    PrescriptionCompleted,
    PrescriptionArchived,
    RatingAdded,
    RatingUpdated,
    RatingArchived,
    RatingRestored,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::AppointmentBooked => "appointment_booked",
            EventName::AppointmentConfirmed => "appointment_confirmed",
            EventName::AppointmentRejected => "appointment_rejected",
            EventName::AppointmentCancelled => "appointment_cancelled",
            EventName::AppointmentCompleted => "appointment_completed",
            EventName::AppointmentNoShow => "appointment_no_show",
            EventName::DoctorScheduleChanged => "doctor_schedule_changed",
            EventName::ConsultationStarted => "consultation_started",
            EventName::ConsultationCompleted => "consultation_completed",
            EventName::ConsultationCancelled => "consultation_cancelled",
            EventName::PrescriptionExpired => "prescription_expired",
            EventName::PrescriptionCompleted => "prescription_completed",
            EventName::PrescriptionArchived => "prescription_archived",
            EventName::RatingAdded => "rating_added",
            EventName::RatingUpdated => "rating_updated",
            EventName::RatingArchived => "rating_archived",
            EventName::RatingRestored => "rating_restored",
        }
    }

    /// Event announcing that an entity of `kind` entered `to`.
    pub fn for_transition(kind: EntityKind, to: Status) -> Option<EventName> {
        let name = match (kind, to) {
            (EntityKind::Appointment, Status::Confirmed) => EventName::AppointmentConfirmed,
            (EntityKind::Appointment, Status::Rejected) => EventName::AppointmentRejected,
            (EntityKind::Appointment, Status::Cancelled) => EventName::AppointmentCancelled,
            (EntityKind::Appointment, Status::Completed) => EventName::AppointmentCompleted,
            (EntityKind::Appointment, Status::NoShow) => EventName::AppointmentNoShow,
            (EntityKind::Consultation, Status::Aktif) => EventName::ConsultationStarted,
            (EntityKind::Consultation, Status::Selesai) => EventName::ConsultationCompleted,
            (EntityKind::Consultation, Status::Dibatalkan) => EventName::ConsultationCancelled,
            (EntityKind::Prescription, Status::Expired) => EventName::PrescriptionExpired,
            (EntityKind::Prescription, Status::Completed) => EventName::PrescriptionCompleted,
            (EntityKind::Prescription, Status::Archived) => EventName::PrescriptionArchived,
            (EntityKind::Rating, Status::Archived) => EventName::RatingArchived,
            (EntityKind::Rating, Status::Active) => EventName::RatingRestored,
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named values used to resolve `{placeholder}`s in cache key templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext(BTreeMap<String, String>);

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Everything the cache layer may need to know about an entity.
    pub fn for_entity(entity: &Entity) -> Self {
        let mut context = Self::new()
            .with("kind", entity.kind())
            .with("id", entity.id())
            .with(entity.kind().id_placeholder(), entity.id());

        match entity {
            Entity::Appointment(a) => {
                context.insert("doctorId", a.doctor_id);
                context.insert("patientId", a.patient_id);
                context.insert("date", a.slot.date);
            }
            Entity::Consultation(c) => {
                if let Some(appointment_id) = c.appointment_id {
                    context.insert("appointmentId", appointment_id);
                }
            }
            Entity::Prescription(p) => {
                context.insert("consultationId", p.consultation_id);
            }
            Entity::Rating(r) => {
                context.insert("doctorId", r.doctor_id);
            }
        }

        context
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub name: EventName,
    pub context: EventContext,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(name: EventName, context: EventContext, occurred_at: DateTime<Utc>) -> Self {
        Self {
            name,
            context,
            occurred_at,
        }
    }
}

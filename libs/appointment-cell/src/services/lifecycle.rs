// libs/appointment-cell/src/services/lifecycle.rs
use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use shared_models::{EngineError, EntityKind, Status, SLOT_OCCUPYING_STATUSES};

/// Directed edges `(kind, from, to)` of every legal status change.
const EDGES: &[(EntityKind, Status, Status)] = &[
    // Appointment
    (EntityKind::Appointment, Status::Pending, Status::Confirmed),
    (EntityKind::Appointment, Status::Pending, Status::Rejected),
    (EntityKind::Appointment, Status::Pending, Status::Cancelled),
    (EntityKind::Appointment, Status::Confirmed, Status::Completed),
    (EntityKind::Appointment, Status::Confirmed, Status::Cancelled),
    (EntityKind::Appointment, Status::Confirmed, Status::NoShow),
    // Consultation
    (EntityKind::Consultation, Status::Pending, Status::Aktif),
    (EntityKind::Consultation, Status::Pending, Status::Dibatalkan),
    (EntityKind::Consultation, Status::Aktif, Status::Selesai),
    (EntityKind::Consultation, Status::Aktif, Status::Dibatalkan),
    // Prescription
    (EntityKind::Prescription, Status::Active, Status::Expired),
    (EntityKind::Prescription, Status::Active, Status::Completed),
    (EntityKind::Prescription, Status::Active, Status::Archived),
    (EntityKind::Prescription, Status::Expired, Status::Archived),
    (EntityKind::Prescription, Status::Completed, Status::Archived),
    // Rating (cyclic)
    (EntityKind::Rating, Status::Active, Status::Archived),
    (EntityKind::Rating, Status::Archived, Status::Active),
];

const STATUSES: &[(EntityKind, &[Status])] = &[
    (
        EntityKind::Appointment,
        &[
            Status::Pending,
            Status::Confirmed,
            Status::Rejected,
            Status::Completed,
            Status::Cancelled,
            Status::NoShow,
        ],
    ),
    (
        EntityKind::Consultation,
        &[Status::Pending, Status::Aktif, Status::Selesai, Status::Dibatalkan],
    ),
    (
        EntityKind::Prescription,
        &[Status::Active, Status::Expired, Status::Completed, Status::Archived],
    ),
    (EntityKind::Rating, &[Status::Active, Status::Archived]),
];

/// Table-driven validator for the four entity lifecycles.
///
/// Validation is pure and cheap, so it is safe to call on every retry attempt.
#[derive(Debug, Clone)]
pub struct StatusGraph {
    edges: HashSet<(EntityKind, Status, Status)>,
}

impl Default for StatusGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusGraph {
    pub fn new() -> Self {
        Self {
            edges: EDGES.iter().copied().collect(),
        }
    }

    pub fn is_valid_transition(&self, kind: EntityKind, from: Status, to: Status) -> bool {
        self.edges.contains(&(kind, from, to))
    }

    /// Validate a status change, reporting the attempted edge on failure
    pub fn validate(&self, kind: EntityKind, from: Status, to: Status) -> Result<(), EngineError> {
        debug!("Validating {} status transition from {} to {}", kind, from, to);

        if !self.is_valid_transition(kind, from, to) {
            warn!("Invalid {} status transition attempted: {} -> {}", kind, from, to);
            return Err(EngineError::InvalidTransition { kind, from, to });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn available_transitions(&self, kind: EntityKind, from: Status) -> Vec<Status> {
        self.all_statuses(kind)
            .into_iter()
            .filter(|to| self.is_valid_transition(kind, from, *to))
            .collect()
    }

    pub fn all_statuses(&self, kind: EntityKind) -> BTreeSet<Status> {
        STATUSES
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, statuses)| statuses.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Statuses of `kind` with no outgoing edge. Empty for ratings, whose
    /// graph is cyclic.
    pub fn terminal_statuses(&self, kind: EntityKind) -> BTreeSet<Status> {
        self.all_statuses(kind)
            .into_iter()
            .filter(|status| self.is_terminal(kind, *status))
            .collect()
    }

    pub fn is_terminal(&self, kind: EntityKind, status: Status) -> bool {
        !self.edges.iter().any(|(k, from, _)| *k == kind && *from == status)
    }

    /// Appointment statuses that hold a slot on the doctor's calendar.
    pub fn occupying_statuses(&self) -> &'static [Status] {
        &SLOT_OCCUPYING_STATUSES
    }

    /// Parse a wire status, rejecting values that do not belong to `kind`.
    pub fn parse_status(&self, kind: EntityKind, raw: &str) -> Result<Status, EngineError> {
        let status: Status = raw.parse()?;
        if !self.all_statuses(kind).contains(&status) {
            return Err(EngineError::UnknownValue(format!("{} status '{}'", kind, raw)));
        }
        Ok(status)
    }
}

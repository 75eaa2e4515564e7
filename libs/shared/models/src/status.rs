use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// The four entity kinds whose status lifecycle the engine enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Appointment,
    Consultation,
    Prescription,
    Rating,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Appointment,
        EntityKind::Consultation,
        EntityKind::Prescription,
        EntityKind::Rating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Appointment => "appointment",
            EntityKind::Consultation => "consultation",
            EntityKind::Prescription => "prescription",
            EntityKind::Rating => "rating",
        }
    }

    /// Placeholder name used for this kind's id in cache key templates.
    pub fn id_placeholder(&self) -> &'static str {
        match self {
            EntityKind::Appointment => "appointmentId",
            EntityKind::Consultation => "consultationId",
            EntityKind::Prescription => "prescriptionId",
            EntityKind::Rating => "ratingId",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appointment" => Ok(EntityKind::Appointment),
            "consultation" => Ok(EntityKind::Consultation),
            "prescription" => Ok(EntityKind::Prescription),
            "rating" => Ok(EntityKind::Rating),
            other => Err(EngineError::UnknownValue(format!("entity kind '{}'", other))),
        }
    }
}

/// Union of every status value used by any entity kind.
///
/// Which values are legal for a kind, and which edges connect them, is decided
/// by the status graph rather than by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    Confirmed,
    Rejected,
    Completed,
    Cancelled,
    NoShow,
    Aktif,
    Selesai,
    Dibatalkan,
    Active,
    Expired,
    Archived,
}

/// Appointment statuses that hold a doctor's time slot.
pub const SLOT_OCCUPYING_STATUSES: [Status; 2] = [Status::Pending, Status::Confirmed];

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::Rejected => "rejected",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
            Status::NoShow => "no-show",
            Status::Aktif => "aktif",
            Status::Selesai => "selesai",
            Status::Dibatalkan => "dibatalkan",
            Status::Active => "active",
            Status::Expired => "expired",
            Status::Archived => "archived",
        }
    }

    pub fn occupies_slot(&self) -> bool {
        SLOT_OCCUPYING_STATUSES.contains(self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let status = match normalized.as_str() {
            "pending" => Status::Pending,
            "confirmed" => Status::Confirmed,
            "rejected" => Status::Rejected,
            "completed" => Status::Completed,
            "cancelled" => Status::Cancelled,
            "no-show" | "noshow" => Status::NoShow,
            "aktif" => Status::Aktif,
            "selesai" => Status::Selesai,
            "dibatalkan" => Status::Dibatalkan,
            "active" => Status::Active,
            "expired" => Status::Expired,
            "archived" => Status::Archived,
            _ => return Err(EngineError::UnknownValue(format!("status '{}'", s))),
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names_round_trip_through_serde() {
        let json = serde_json::to_string(&Status::NoShow).unwrap();
        assert_eq!(json, "\"no-show\"");

        let parsed: Status = serde_json::from_str("\"dibatalkan\"").unwrap();
        assert_eq!(parsed, Status::Dibatalkan);
    }

    #[test]
    fn test_status_parse_accepts_underscore_spelling() {
        assert_eq!("no_show".parse::<Status>().unwrap(), Status::NoShow);
        assert_eq!(" Aktif ".parse::<Status>().unwrap(), Status::Aktif);
        assert!("in_progress".parse::<Status>().is_err());
    }

    #[test]
    fn test_only_pending_and_confirmed_occupy_slots() {
        assert!(Status::Pending.occupies_slot());
        assert!(Status::Confirmed.occupies_slot());
        assert!(!Status::Cancelled.occupies_slot());
        assert!(!Status::NoShow.occupies_slot());
    }
}

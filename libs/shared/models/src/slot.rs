use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SLOT_DURATION_MINUTES: u32 = 30;

/// One bookable interval `[start_time, end_time)` on a doctor's calendar.
///
/// Slots are generated on demand; occupancy is derived from appointments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
}

impl Slot {
    pub fn new(doctor_id: Uuid, date: NaiveDate, start_time: NaiveTime) -> Self {
        Self::with_duration(doctor_id, date, start_time, SLOT_DURATION_MINUTES)
    }

    pub fn with_duration(doctor_id: Uuid, date: NaiveDate, start_time: NaiveTime, duration_minutes: u32) -> Self {
        Self {
            doctor_id,
            date,
            start_time,
            duration_minutes,
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn end_time(&self) -> NaiveTime {
        self.ends_at().time()
    }

    /// Half-open overlap test; touching slots do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.doctor_id == other.doctor_id
            && self.starts_at() < other.ends_at()
            && other.starts_at() < self.ends_at()
    }
}

// libs/appointment-cell/src/services/booking.rs
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::BookingStore;
use shared_models::{Appointment, EngineError, NewAppointment, Slot};
use shared_utils::Clock;

/// Produces bookable slots for a doctor's day and performs slot-occupying
/// writes. Occupancy is always derived from the store; overlapping writes are
/// arbitrated by the store's uniqueness check, never by an earlier read.
pub struct SlotAllocator {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, config: SchedulingConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// Slot at `start_time` with the configured duration.
    pub fn slot_at(&self, doctor_id: Uuid, date: NaiveDate, start_time: NaiveTime) -> Slot {
        Slot::with_duration(doctor_id, date, start_time, self.config.slot_duration_minutes)
    }

    /// Every grid slot inside working hours, ignoring occupancy.
    pub fn generate_day_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Vec<Slot> {
        let step = self.config.slot_duration_minutes.max(1);
        let day_start = self.config.working_hours_start * 60;
        let day_end = self.config.working_hours_end.min(24) * 60;

        (day_start..day_end)
            .step_by(step as usize)
            .filter(|minute| minute + step <= day_end)
            .filter_map(|minute| NaiveTime::from_hms_opt(minute / 60, minute % 60, 0))
            .map(|start| self.slot_at(doctor_id, date, start))
            .collect()
    }

    /// Inclusive range of dates that may currently be booked.
    pub fn booking_window(&self) -> (NaiveDate, NaiveDate) {
        let earliest = self.earliest_start().date();
        let latest = self.clock.today() + Duration::days(self.config.max_days_advance_booking as i64);
        (earliest, latest)
    }

    pub fn check_booking_window(&self, date: NaiveDate) -> Result<(), EngineError> {
        let (earliest, latest) = self.booking_window();
        if date < earliest || date > latest {
            warn!("Rejecting date {} outside booking window [{}, {}]", date, earliest, latest);
            return Err(EngineError::OutsideBookingWindow { date, earliest, latest });
        }
        Ok(())
    }

    /// Free slots for the doctor's day. Slots starting before the minimum
    /// notice are left out.
    pub async fn list_available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        self.check_booking_window(date)?;

        let occupied: Vec<Slot> = self
            .store
            .list_appointments(doctor_id, date)
            .await?
            .into_iter()
            .filter(Appointment::occupies_slot)
            .map(|appointment| appointment.slot)
            .collect();

        let earliest = self.earliest_start();
        let available: Vec<Slot> = self
            .generate_day_slots(doctor_id, date)
            .into_iter()
            .filter(|slot| slot.starts_at() >= earliest)
            .filter(|slot| !occupied.iter().any(|taken| taken.overlaps(slot)))
            .collect();

        debug!(
            "Doctor {} has {} free slots on {} ({} occupied)",
            doctor_id,
            available.len(),
            date,
            occupied.len()
        );
        Ok(available)
    }

    pub async fn is_bookable(&self, doctor_id: Uuid, slot: &Slot) -> Result<bool, EngineError> {
        if self.validate_slot(doctor_id, slot).is_err() || self.check_booking_window(slot.date).is_err() {
            return Ok(false);
        }
        let available = self.list_available_slots(doctor_id, slot.date).await?;
        Ok(available.contains(slot))
    }

    /// Slot must belong to the doctor and sit on the working-hours grid.
    pub fn validate_slot(&self, doctor_id: Uuid, slot: &Slot) -> Result<(), EngineError> {
        if slot.doctor_id != doctor_id {
            return Err(EngineError::InvalidSlot(format!(
                "slot belongs to doctor {}, not {}",
                slot.doctor_id, doctor_id
            )));
        }
        if slot.duration_minutes != self.config.slot_duration_minutes {
            return Err(EngineError::InvalidSlot(format!(
                "slots last {} minutes, got {}",
                self.config.slot_duration_minutes, slot.duration_minutes
            )));
        }
        let on_grid = self
            .generate_day_slots(doctor_id, slot.date)
            .iter()
            .any(|candidate| candidate.start_time == slot.start_time);
        if !on_grid {
            return Err(EngineError::InvalidSlot(format!(
                "{} is not a slot start within working hours {:02}:00-{:02}:00",
                slot.start_time, self.config.working_hours_start, self.config.working_hours_end
            )));
        }
        Ok(())
    }

    /// Create a `pending` appointment for `slot`. A concurrent writer that got
    /// there first surfaces as `SlotUnavailable`.
    pub async fn reserve_slot(&self, doctor_id: Uuid, patient_id: Uuid, slot: Slot) -> Result<Appointment, EngineError> {
        self.validate_slot(doctor_id, &slot)?;
        self.check_booking_window(slot.date)?;
        if slot.starts_at() < self.earliest_start() {
            return Err(EngineError::SlotInPast {
                date: slot.date,
                start_time: slot.start_time,
            });
        }
        self.ensure_capacity(doctor_id).await?;

        let appointment = self
            .store
            .create_appointment(NewAppointment {
                doctor_id,
                patient_id,
                slot,
                requested_at: self.clock.now(),
            })
            .await?;

        info!(
            "Reserved slot {} on {} for doctor {} (appointment {})",
            slot.start_time, slot.date, doctor_id, appointment.id
        );
        Ok(appointment)
    }

    /// Early rejection only; the store re-checks capacity when a write would
    /// activate a consultation. Returns the current active count.
    pub async fn ensure_capacity(&self, doctor_id: Uuid) -> Result<usize, EngineError> {
        let active = self.store.count_active_consultations(doctor_id).await?;
        let limit = self.config.max_concurrent_consultations;

        if active >= limit {
            warn!("Doctor {} at consultation capacity ({}/{})", doctor_id, active, limit);
            return Err(EngineError::CapacityExceeded {
                doctor_id,
                active,
                limit,
            });
        }
        Ok(active)
    }

    /// Up to `limit` free slots on the same day, closest to `requested` first.
    pub async fn suggest_alternatives(&self, requested: &Slot, limit: usize) -> Result<Vec<Slot>, EngineError> {
        let mut candidates: Vec<Slot> = self
            .list_available_slots(requested.doctor_id, requested.date)
            .await?
            .into_iter()
            .filter(|slot| slot.start_time != requested.start_time)
            .collect();

        candidates.sort_by_key(|slot| ((slot.starts_at() - requested.starts_at()).num_minutes().abs(), slot.start_time));
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Slots starting before this instant can no longer be booked.
    pub fn earliest_start(&self) -> NaiveDateTime {
        (self.clock.now() + Duration::hours(self.config.min_hours_before_booking as i64)).naive_utc()
    }
}

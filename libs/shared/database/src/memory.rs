use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::{Appointment, Entity, EntityKind, NewAppointment, Status};

use crate::store::{BookingStore, StoreError};

/// Process-local store with the same arbitration rules a database would apply:
/// version compare-and-set on updates and an overlap constraint on
/// slot-occupying appointments.
#[derive(Default)]
pub struct InMemoryBookingStore {
    entities: RwLock<HashMap<(EntityKind, Uuid), Entity>>,
    forced_conflicts: AtomicU32,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity as-is, replacing any previous one with the same id.
    pub async fn insert(&self, entity: impl Into<Entity>) -> Entity {
        let entity = entity.into();
        let mut entities = self.entities.write().await;
        entities.insert((entity.kind(), entity.id()), entity.clone());
        entity
    }

    /// The next `count` status updates observe a concurrent writer: the stored
    /// version is bumped and the caller gets `VersionMismatch`.
    pub fn force_version_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply_status(
        &self,
        entities: &mut HashMap<(EntityKind, Uuid), Entity>,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
    ) -> Result<Entity, StoreError> {
        let entity = entities
            .get_mut(&(kind, id))
            .ok_or(StoreError::NotFound { kind, id })?;

        if self.take_forced_conflict() {
            entity.bump_version();
            warn!("Injected concurrent write on {} {}", kind, id);
        }

        if entity.version() != expected_version {
            return Err(StoreError::VersionMismatch {
                kind,
                id,
                expected: expected_version,
                actual: entity.version(),
            });
        }

        entity.set_status(new_status);
        Ok(entity.clone())
    }
}

fn active_consultations(entities: &HashMap<(EntityKind, Uuid), Entity>, doctor_id: Uuid) -> usize {
    let doctor_appointments: HashMap<Uuid, &Appointment> = entities
        .values()
        .filter_map(Entity::as_appointment)
        .filter(|a| a.doctor_id == doctor_id)
        .map(|a| (a.id, a))
        .collect();

    let mut active: HashSet<Uuid> = doctor_appointments
        .values()
        .filter(|a| a.status == Status::Confirmed)
        .map(|a| a.id)
        .collect();

    for entity in entities.values() {
        if let Entity::Consultation(consultation) = entity {
            if consultation.status != Status::Aktif {
                continue;
            }
            if let Some(appointment_id) = consultation.appointment_id {
                if doctor_appointments.contains_key(&appointment_id) {
                    active.insert(appointment_id);
                }
            }
        }
    }

    active.len()
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Entity, StoreError> {
        let entities = self.entities.read().await;
        entities
            .get(&(kind, id))
            .cloned()
            .ok_or(StoreError::NotFound { kind, id })
    }

    async fn create_appointment(&self, data: NewAppointment) -> Result<Appointment, StoreError> {
        let mut entities = self.entities.write().await;

        let taken = entities.values().filter_map(Entity::as_appointment).any(|existing| {
            existing.occupies_slot() && existing.slot.overlaps(&data.slot)
        });
        if taken {
            debug!(
                "Rejecting appointment for doctor {} at {}: slot already occupied",
                data.doctor_id,
                data.slot.starts_at()
            );
            return Err(StoreError::UniqueViolation {
                doctor_id: data.doctor_id,
                date: data.slot.date,
                start_time: data.slot.start_time,
            });
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: data.doctor_id,
            patient_id: data.patient_id,
            slot: data.slot,
            status: Status::Pending,
            created_at: data.requested_at,
            version: 0,
        };
        entities.insert(
            (EntityKind::Appointment, appointment.id),
            Entity::Appointment(appointment.clone()),
        );

        Ok(appointment)
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
    ) -> Result<Entity, StoreError> {
        let mut entities = self.entities.write().await;
        self.apply_status(&mut entities, kind, id, expected_version, new_status)
    }

    async fn update_status_within_capacity(
        &self,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
        doctor_id: Uuid,
        limit: usize,
    ) -> Result<Entity, StoreError> {
        let mut entities = self.entities.write().await;

        let active = active_consultations(&entities, doctor_id);
        if active >= limit {
            debug!("Refusing {} {} -> {}: doctor {} at {}/{}", kind, id, new_status, doctor_id, active, limit);
            return Err(StoreError::CapacityExceeded {
                doctor_id,
                active,
                limit,
            });
        }

        self.apply_status(&mut entities, kind, id, expected_version, new_status)
    }

    async fn list_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let entities = self.entities.read().await;
        let mut appointments: Vec<Appointment> = entities
            .values()
            .filter_map(Entity::as_appointment)
            .filter(|a| a.doctor_id == doctor_id && a.slot.date == date)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.slot.start_time);
        Ok(appointments)
    }

    async fn count_active_consultations(&self, doctor_id: Uuid) -> Result<usize, StoreError> {
        let entities = self.entities.read().await;
        Ok(active_consultations(&entities, doctor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, TimeZone, Utc};
    use shared_models::{Consultation, Slot};
    use std::sync::Arc;

    fn slot(doctor_id: Uuid, hour: u32, minute: u32) -> Slot {
        Slot::new(
            doctor_id,
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        )
    }

    fn new_appointment(doctor_id: Uuid, hour: u32, minute: u32) -> NewAppointment {
        NewAppointment {
            doctor_id,
            patient_id: Uuid::new_v4(),
            slot: slot(doctor_id, hour, minute),
            requested_at: Utc.with_ymd_and_hms(2025, 6, 9, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_appointment_starts_pending_at_version_zero() {
        let store = InMemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();

        let appointment = store.create_appointment(new_appointment(doctor_id, 9, 0)).await.unwrap();

        assert_eq!(appointment.status, Status::Pending);
        assert_eq!(appointment.version, 0);
        assert_eq!(store.list_appointments(doctor_id, appointment.slot.date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_occupied_slot_is_unique_violation() {
        let store = InMemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();

        store.create_appointment(new_appointment(doctor_id, 9, 0)).await.unwrap();
        let second = store.create_appointment(new_appointment(doctor_id, 9, 0)).await;

        assert_matches!(second, Err(StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_its_slot() {
        let store = InMemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();

        let first = store.create_appointment(new_appointment(doctor_id, 9, 0)).await.unwrap();
        store
            .update_status(EntityKind::Appointment, first.id, 0, Status::Cancelled)
            .await
            .unwrap();

        assert!(store.create_appointment(new_appointment(doctor_id, 9, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_status_requires_matching_version() {
        let store = InMemoryBookingStore::new();
        let appointment = store
            .create_appointment(new_appointment(Uuid::new_v4(), 10, 0))
            .await
            .unwrap();

        let stale = store
            .update_status(EntityKind::Appointment, appointment.id, 3, Status::Confirmed)
            .await;
        assert_matches!(stale, Err(StoreError::VersionMismatch { expected: 3, actual: 0, .. }));

        let updated = store
            .update_status(EntityKind::Appointment, appointment.id, 0, Status::Confirmed)
            .await
            .unwrap();
        assert_eq!(updated.version(), 1);
        assert_eq!(updated.status(), Status::Confirmed);
    }

    #[tokio::test]
    async fn test_forced_conflicts_are_consumed_one_per_update() {
        let store = InMemoryBookingStore::new();
        let appointment = store
            .create_appointment(new_appointment(Uuid::new_v4(), 11, 0))
            .await
            .unwrap();
        store.force_version_conflicts(1);

        let first = store
            .update_status(EntityKind::Appointment, appointment.id, 0, Status::Confirmed)
            .await;
        assert_matches!(first, Err(StoreError::VersionMismatch { actual: 1, .. }));

        let second = store
            .update_status(EntityKind::Appointment, appointment.id, 1, Status::Confirmed)
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_creates_admit_exactly_one() {
        let store = Arc::new(InMemoryBookingStore::new());
        let doctor_id = Uuid::new_v4();

        let attempts = (0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_appointment(new_appointment(doctor_id, 13, 0)).await })
        });
        let results = futures::future::join_all(attempts).await;

        let successes = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_active_consultations_count_each_appointment_once() {
        let store = InMemoryBookingStore::new();
        let doctor_id = Uuid::new_v4();

        let confirmed = store.create_appointment(new_appointment(doctor_id, 9, 0)).await.unwrap();
        store
            .update_status(EntityKind::Appointment, confirmed.id, 0, Status::Confirmed)
            .await
            .unwrap();
        store
            .insert(Consultation {
                id: Uuid::new_v4(),
                appointment_id: Some(confirmed.id),
                status: Status::Aktif,
                version: 0,
            })
            .await;

        let pending = store.create_appointment(new_appointment(doctor_id, 10, 0)).await.unwrap();
        store
            .insert(Consultation {
                id: Uuid::new_v4(),
                appointment_id: Some(pending.id),
                status: Status::Aktif,
                version: 0,
            })
            .await;

        assert_eq!(store.count_active_consultations(doctor_id).await.unwrap(), 2);
        assert_eq!(store.count_active_consultations(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capacity_checked_updates_never_overshoot_the_limit() {
        let store = Arc::new(InMemoryBookingStore::new());
        let doctor_id = Uuid::new_v4();
        let mut pending = Vec::new();
        for hour in 9..15 {
            pending.push(store.create_appointment(new_appointment(doctor_id, hour, 0)).await.unwrap());
        }

        let confirmations = pending.into_iter().map(|appointment| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .update_status_within_capacity(
                        EntityKind::Appointment,
                        appointment.id,
                        0,
                        Status::Confirmed,
                        doctor_id,
                        5,
                    )
                    .await
            })
        });
        let results = futures::future::join_all(confirmations).await;

        let confirmed = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(StoreError::CapacityExceeded { active: 5, limit: 5, .. }))))
            .count();
        assert_eq!((confirmed, refused), (5, 1));
        assert_eq!(store.count_active_consultations(doctor_id).await.unwrap(), 5);
    }
}

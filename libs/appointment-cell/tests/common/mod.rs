#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::mock;
use uuid::Uuid;

use appointment_cell::models::BookAppointmentRequest;
use appointment_cell::SchedulingEngine;
use performance_cell::{CacheInvalidationEngine, CacheRegistry, InMemoryCacheBackend};
use shared_database::{BookingStore, InMemoryBookingStore, StoreError};
use shared_models::{Appointment, Entity, EntityKind, NewAppointment, Status};
use shared_utils::test_utils::{clock_at, slot, time, TestConfig};
use shared_utils::telemetry::init_test_tracing;
use shared_utils::{BroadcastEventBus, Clock, FixedClock};

mock! {
    pub Store {}

    #[async_trait]
    impl BookingStore for Store {
        async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Entity, StoreError>;
        async fn create_appointment(&self, data: NewAppointment) -> Result<Appointment, StoreError>;
        async fn update_status(
            &self,
            kind: EntityKind,
            id: Uuid,
            expected_version: u64,
            new_status: Status,
        ) -> Result<Entity, StoreError>;
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
        async fn count_active_consultations(&self, doctor_id: Uuid) -> Result<usize, StoreError>;
    }
}

/// Engine wired to in-memory collaborators, with every part reachable.
pub struct TestHarness {
    pub store: Arc<InMemoryBookingStore>,
    pub cache_backend: Arc<InMemoryCacheBackend>,
    pub cache: Arc<CacheInvalidationEngine>,
    pub events: Arc<BroadcastEventBus>,
    pub clock: Arc<FixedClock>,
    pub engine: SchedulingEngine,
}

impl TestHarness {
    /// Clock pinned to 2025-06-09 08:00 UTC.
    pub fn new() -> Self {
        Self::with(TestConfig::default(), clock_at(2025, 6, 9, 8, 0))
    }

    pub fn with(test_config: TestConfig, clock: Arc<FixedClock>) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        Self::assemble(test_config, store.clone(), store, clock)
    }

    /// Engine over a store that yields before every call, so concurrent
    /// engine operations interleave between their reads and writes.
    pub fn interleaved() -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let yielding = Arc::new(YieldingStore(store.clone()));
        Self::assemble(TestConfig::default(), store, yielding, clock_at(2025, 6, 9, 8, 0))
    }

    fn assemble(
        test_config: TestConfig,
        store: Arc<InMemoryBookingStore>,
        engine_store: Arc<dyn BookingStore>,
        clock: Arc<FixedClock>,
    ) -> Self {
        init_test_tracing();
        let config = test_config.to_app_config();
        let cache_backend = Arc::new(InMemoryCacheBackend::new());
        let cache = Arc::new(CacheInvalidationEngine::new(
            Arc::new(CacheRegistry::standard()),
            cache_backend.clone(),
            &config.cache,
        ));
        let events = Arc::new(BroadcastEventBus::default());
        let engine = SchedulingEngine::new(&config, engine_store, cache.clone(), events.clone(), clock.clone());

        Self {
            store,
            cache_backend,
            cache,
            events,
            clock,
            engine,
        }
    }

    /// Seed an appointment straight into the store, bypassing the engine.
    pub async fn seed_appointment(&self, doctor_id: Uuid, on: NaiveDate, hour: u32, minute: u32, status: Status) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            slot: slot(doctor_id, on, hour, minute),
            status,
            created_at: self.clock.now(),
            version: 0,
        };
        self.store.insert(appointment.clone()).await;
        appointment
    }
}

/// Delegates to the in-memory store, yielding to the runtime first.
pub struct YieldingStore(pub Arc<InMemoryBookingStore>);

#[async_trait]
impl BookingStore for YieldingStore {
    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Entity, StoreError> {
        tokio::task::yield_now().await;
        self.0.get(kind, id).await
    }

    async fn create_appointment(&self, data: NewAppointment) -> Result<Appointment, StoreError> {
        tokio::task::yield_now().await;
        self.0.create_appointment(data).await
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: Uuid,
        expected_version: u64,
        new_status: Status,
    ) -> Result<Entity, StoreError> {
        tokio::task::yield_now().await;
        self.0.update_status(kind, id, expected_version, new_status).await
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
        tokio::task::yield_now().await;
        self.0
            .update_status_within_capacity(kind, id, expected_version, new_status, doctor_id, limit)
            .await
    }

    async fn list_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        tokio::task::yield_now().await;
        self.0.list_appointments(doctor_id, date).await
    }

    async fn count_active_consultations(&self, doctor_id: Uuid) -> Result<usize, StoreError> {
        tokio::task::yield_now().await;
        self.0.count_active_consultations(doctor_id).await
    }
}

pub fn booking(doctor_id: Uuid, on: NaiveDate, hour: u32, minute: u32) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id,
        patient_id: Uuid::new_v4(),
        date: on,
        start_time: time(hour, minute),
    }
}

// libs/appointment-cell/src/services/consistency.rs
//
// SCHEDULING CONSISTENCY ENGINE
// Composes transition validation, slot allocation, bounded retries and cache
// invalidation. Every committed write emits its domain event and invalidates
// the affected cache entries before the caller sees success.
//

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use performance_cell::{CacheInvalidationEngine, CacheStats, InvalidationReport};
use shared_config::AppConfig;
use shared_database::BookingStore;
use shared_models::{
    Appointment, DomainEvent, EngineError, Entity, EntityKind, EventContext, EventName, Slot, Status,
};
use shared_utils::{Clock, EventBus};

use crate::models::{BookAppointmentRequest, StatusTransitionRequest, MAX_ALTERNATIVE_SLOTS};
use crate::services::booking::SlotAllocator;
use crate::services::conflict::ConflictResolver;
use crate::services::lifecycle::StatusGraph;

pub struct SchedulingEngine {
    store: Arc<dyn BookingStore>,
    graph: StatusGraph,
    allocator: SlotAllocator,
    resolver: ConflictResolver,
    cache: Arc<CacheInvalidationEngine>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl SchedulingEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn BookingStore>,
        cache: Arc<CacheInvalidationEngine>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let allocator = SlotAllocator::new(Arc::clone(&store), Arc::clone(&clock), config.scheduling.clone());

        Self {
            store,
            graph: StatusGraph::new(),
            allocator,
            resolver: ConflictResolver::new(config.retry.clone()),
            cache,
            events,
            clock,
        }
    }

    /// Replace the retry policy, e.g. with deterministic jitter.
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn graph(&self) -> &StatusGraph {
        &self.graph
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ==============================================================================
    // MUTATIONS
    // ==============================================================================

    /// Book a slot for a patient. Dates outside the booking window are
    /// rejected before the store is consulted.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, date = %request.date))]
    pub async fn book_appointment(&self, request: BookAppointmentRequest) -> Result<Appointment, EngineError> {
        let BookAppointmentRequest {
            doctor_id,
            patient_id,
            date,
            start_time,
        } = request;

        self.allocator.check_booking_window(date)?;
        let slot = self.allocator.slot_at(doctor_id, date, start_time);

        let allocator = &self.allocator;
        let result = self
            .resolver
            .with_retry("book_appointment", move |_| allocator.reserve_slot(doctor_id, patient_id, slot))
            .await;

        let appointment = match result {
            Ok(appointment) => appointment,
            Err(EngineError::SlotUnavailable {
                doctor_id,
                date,
                start_time,
                attempts,
                ..
            }) => {
                let alternatives = self.alternatives_for(&slot).await;
                return Err(EngineError::SlotUnavailable {
                    doctor_id,
                    date,
                    start_time,
                    attempts,
                    alternatives,
                });
            }
            Err(err) => return Err(err),
        };

        info!(
            "Booked appointment {} for patient {} with doctor {} at {} {}",
            appointment.id, patient_id, doctor_id, date, start_time
        );

        let context = EventContext::for_entity(&Entity::Appointment(appointment.clone()));
        self.commit_event(EventName::AppointmentBooked, context).await;

        Ok(appointment)
    }

    /// Move an entity to `to`, retrying on concurrent writers. Confirming an
    /// appointment is subject to the doctor's consultation capacity, enforced
    /// by the store in the same write.
    #[instrument(skip(self))]
    pub async fn transition_status(&self, kind: EntityKind, id: Uuid, to: Status) -> Result<Entity, EngineError> {
        let store = &self.store;
        let graph = &self.graph;
        let limit = self.allocator.config().max_concurrent_consultations;
        let operation = format!("transition_{}", kind);

        let entity = self
            .resolver
            .with_retry(&operation, move |attempt| async move {
                let current = store.get(kind, id).await?;
                graph.validate(kind, current.status(), to)?;

                debug!(
                    "Attempt {}: {} {} {} -> {} at version {}",
                    attempt,
                    kind,
                    id,
                    current.status(),
                    to,
                    current.version()
                );
                let updated = match &current {
                    Entity::Appointment(appointment)
                        if appointment.status == Status::Pending && to == Status::Confirmed =>
                    {
                        store
                            .update_status_within_capacity(
                                kind,
                                id,
                                current.version(),
                                to,
                                appointment.doctor_id,
                                limit,
                            )
                            .await?
                    }
                    _ => store.update_status(kind, id, current.version(), to).await?,
                };
                Ok::<_, EngineError>(updated)
            })
            .await?;

        info!("{} {} is now {} (version {})", kind, id, to, entity.version());

        match EventName::for_transition(kind, to) {
            Some(name) => {
                self.commit_event(name, EventContext::for_entity(&entity)).await;
            }
            None => debug!("No domain event for {} entering {}", kind, to),
        }

        Ok(entity)
    }

    pub async fn apply_transition(&self, request: StatusTransitionRequest) -> Result<Entity, EngineError> {
        self.transition_status(request.kind, request.id, request.to).await
    }

    pub async fn confirm(&self, appointment_id: Uuid) -> Result<Entity, EngineError> {
        self.transition_status(EntityKind::Appointment, appointment_id, Status::Confirmed).await
    }

    pub async fn reject(&self, appointment_id: Uuid) -> Result<Entity, EngineError> {
        self.transition_status(EntityKind::Appointment, appointment_id, Status::Rejected).await
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Entity, EngineError> {
        self.transition_status(EntityKind::Appointment, appointment_id, Status::Cancelled).await
    }

    pub async fn complete(&self, appointment_id: Uuid) -> Result<Entity, EngineError> {
        self.transition_status(EntityKind::Appointment, appointment_id, Status::Completed).await
    }

    pub async fn mark_no_show(&self, appointment_id: Uuid) -> Result<Entity, EngineError> {
        self.transition_status(EntityKind::Appointment, appointment_id, Status::NoShow).await
    }

    /// Invalidate and forward an event committed outside this engine, such as
    /// a new rating or a changed doctor schedule.
    pub async fn apply_external_event(&self, event: DomainEvent) -> InvalidationReport {
        let report = self.cache.invalidate_or_bypass(&event).await;
        self.events.publish(event);
        report
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    /// Cached free slots. The cached listing is re-filtered against the
    /// current time, since slots keep starting while it sits in the cache.
    pub async fn list_available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        self.allocator.check_booking_window(date)?;

        let context = EventContext::new().with("doctorId", doctor_id).with("date", date);
        let allocator = &self.allocator;
        let mut slots: Vec<Slot> = self
            .cache
            .get_or_load("available_slots", &context, || allocator.list_available_slots(doctor_id, date))
            .await?;

        let earliest = self.allocator.earliest_start();
        slots.retain(|slot| slot.starts_at() >= earliest);
        Ok(slots)
    }

    pub async fn get_entity(&self, kind: EntityKind, id: Uuid) -> Result<Entity, EngineError> {
        let context = EventContext::new().with(kind.id_placeholder(), id);
        let store = &self.store;
        self.cache
            .get_or_load(details_cache(kind), &context, || async move {
                Ok::<_, EngineError>(store.get(kind, id).await?)
            })
            .await
    }

    pub async fn get_status(&self, kind: EntityKind, id: Uuid) -> Result<Status, EngineError> {
        Ok(self.get_entity(kind, id).await?.status())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Invalidate, then publish. Invalidation never fails the caller: on a
    /// cache outage the affected entries are bypassed instead.
    async fn commit_event(&self, name: EventName, context: EventContext) {
        let event = DomainEvent::new(name, context, self.clock.now());
        let report = self.cache.invalidate_or_bypass(&event).await;

        if report.degraded {
            warn!("{} committed with cache in degraded mode", name);
        } else {
            debug!("{} invalidated {} cache entries", name, report.entries_evicted);
        }

        self.events.publish(event);
    }

    async fn alternatives_for(&self, slot: &Slot) -> Vec<Slot> {
        match self.allocator.suggest_alternatives(slot, MAX_ALTERNATIVE_SLOTS).await {
            Ok(alternatives) => alternatives,
            Err(err) => {
                warn!("Could not compute alternatives for {} on {}: {}", slot.start_time, slot.date, err);
                Vec::new()
            }
        }
    }
}

fn details_cache(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Appointment => "appointment_details",
        EntityKind::Consultation => "consultation_details",
        EntityKind::Prescription => "prescription_details",
        EntityKind::Rating => "rating_details",
    }
}

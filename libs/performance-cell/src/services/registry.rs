use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use shared_models::{EventContext, EventName};

use crate::models::CacheError;

pub const TAG_APPOINTMENTS: &str = "appointments";
pub const TAG_CONSULTATIONS: &str = "consultations";
pub const TAG_PRESCRIPTIONS: &str = "prescriptions";
pub const TAG_RATINGS: &str = "ratings";
pub const TAG_DASHBOARD: &str = "dashboard";

/// Declared dependency metadata for one logical cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDefinition {
    pub name: String,
    pub key_template: String,
    pub ttl_seconds: u64,
    pub tags: BTreeSet<String>,
    pub invalidation_triggers: BTreeSet<EventName>,
}

impl CacheDefinition {
    pub fn new(name: &str, key_template: &str, ttl_seconds: u64) -> Self {
        Self {
            name: name.to_string(),
            key_template: key_template.to_string(),
            ttl_seconds,
            tags: BTreeSet::new(),
            invalidation_triggers: BTreeSet::new(),
        }
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn triggered_by(mut self, events: &[EventName]) -> Self {
        self.invalidation_triggers.extend(events.iter().copied());
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn is_triggered_by(&self, event: EventName) -> bool {
        self.invalidation_triggers.contains(&event)
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    /// Substitute every `{placeholder}` from `context`. `None` if any is missing.
    pub fn resolve_key(&self, context: &EventContext) -> Option<String> {
        resolve_template(&self.key_template, context)
    }
}

pub fn resolve_template(template: &str, context: &EventContext) -> Option<String> {
    let mut resolved = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open.find('}')?;
        let placeholder = &after_open[..close];
        resolved.push_str(context.get(placeholder)?);
        rest = &after_open[close + 1..];
    }
    resolved.push_str(rest);

    Some(resolved)
}

/// Immutable table of cache definitions, built once by the composition root.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    definitions: BTreeMap<String, CacheDefinition>,
}

impl CacheRegistry {
    pub fn new(definitions: Vec<CacheDefinition>) -> Result<Self, CacheError> {
        let mut map = BTreeMap::new();
        for definition in definitions {
            if definition.tags.is_empty() {
                return Err(CacheError::InvalidDefinition(format!(
                    "'{}' has no tags",
                    definition.name
                )));
            }
            if definition.key_template.matches('{').count() != definition.key_template.matches('}').count() {
                return Err(CacheError::InvalidDefinition(format!(
                    "'{}' has an unbalanced key template",
                    definition.name
                )));
            }
            if map.insert(definition.name.clone(), definition).is_some() {
                return Err(CacheError::InvalidDefinition("duplicate cache name".to_string()));
            }
        }
        Ok(Self { definitions: map })
    }

    /// The clinic's read views and what invalidates them. One canonical key
    /// template per logical cache.
    pub fn standard() -> Self {
        use EventName::*;

        let definitions = vec![
            CacheDefinition::new("available_slots", "appointments:slots:available:{doctorId}:{date}", 900)
                .tagged(&[TAG_APPOINTMENTS])
                .triggered_by(&[
                    AppointmentBooked,
                    AppointmentCancelled,
                    AppointmentRejected,
                    AppointmentCompleted,
                    AppointmentNoShow,
                    DoctorScheduleChanged,
                ]),
            CacheDefinition::new("doctor_appointments", "appointments:doctor:{doctorId}:{date}", 600)
                .tagged(&[TAG_APPOINTMENTS])
                .triggered_by(&[
                    AppointmentBooked,
                    AppointmentConfirmed,
                    AppointmentRejected,
                    AppointmentCancelled,
                    AppointmentCompleted,
                    AppointmentNoShow,
                ]),
            CacheDefinition::new("appointment_details", "appointments:detail:{appointmentId}", 1800)
                .tagged(&[TAG_APPOINTMENTS])
                .triggered_by(&[
                    AppointmentConfirmed,
                    AppointmentRejected,
                    AppointmentCancelled,
                    AppointmentCompleted,
                    AppointmentNoShow,
                ]),
            CacheDefinition::new("consultation_details", "consultations:detail:{consultationId}", 600)
                .tagged(&[TAG_CONSULTATIONS])
                .triggered_by(&[ConsultationStarted, ConsultationCompleted, ConsultationCancelled]),
            CacheDefinition::new("prescription_details", "prescriptions:detail:{prescriptionId}", 1800)
                .tagged(&[TAG_PRESCRIPTIONS])
                .triggered_by(&[PrescriptionExpired, PrescriptionCompleted, PrescriptionArchived]),
            CacheDefinition::new("rating_details", "ratings:detail:{ratingId}", 3600)
                .tagged(&[TAG_RATINGS])
                .triggered_by(&[RatingUpdated, RatingArchived, RatingRestored]),
            CacheDefinition::new("doctor_rating_average", "ratings:average:{doctorId}", 7200)
                .tagged(&[TAG_RATINGS])
                .triggered_by(&[RatingAdded, RatingUpdated, RatingArchived, RatingRestored]),
            // Aggregates carry the tags of their inputs and are only ever evicted by cascade.
            CacheDefinition::new("dashboard_stats", "dashboard:stats:{doctorId}", 300).tagged(&[
                TAG_APPOINTMENTS,
                TAG_CONSULTATIONS,
                TAG_RATINGS,
                TAG_DASHBOARD,
            ]),
        ];

        Self {
            definitions: definitions.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CacheDefinition> {
        self.definitions.get(name)
    }

    pub fn triggered_by(&self, event: EventName) -> impl Iterator<Item = &CacheDefinition> {
        self.definitions.values().filter(move |d| d.is_triggered_by(event))
    }

    /// Longest TTL among definitions carrying `tag`: the latest instant at
    /// which an entry written under that tag can still be live.
    pub fn max_ttl_for_tag(&self, tag: &str) -> Duration {
        self.definitions
            .values()
            .filter(|d| d.tags.contains(tag))
            .map(CacheDefinition::ttl)
            .max()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_template_substitutes_all_placeholders() {
        let context = EventContext::new().with("doctorId", "D1").with("date", "2025-06-10");

        assert_eq!(
            resolve_template("appointments:slots:available:{doctorId}:{date}", &context),
            Some("appointments:slots:available:D1:2025-06-10".to_string())
        );
        assert_eq!(resolve_template("static:key", &context), Some("static:key".to_string()));
    }

    #[test]
    fn test_resolve_template_missing_placeholder_is_none() {
        let context = EventContext::new().with("doctorId", "D1");
        assert_eq!(resolve_template("appointments:doctor:{doctorId}:{date}", &context), None);
        assert_eq!(resolve_template("broken:{doctorId", &context), None);
    }

    #[test]
    fn test_standard_registry_is_valid() {
        let standard = CacheRegistry::standard();
        let rebuilt = CacheRegistry::new(standard.iter().cloned().collect()).unwrap();

        assert_eq!(rebuilt.len(), standard.len());
        assert!(standard.iter().all(|d| !d.tags.is_empty()));
    }

    #[test]
    fn test_available_slots_uses_canonical_template() {
        let registry = CacheRegistry::standard();
        let slots = registry.get("available_slots").unwrap();

        assert_eq!(slots.key_template, "appointments:slots:available:{doctorId}:{date}");
        assert_eq!(slots.ttl_seconds, 900);
        assert!(slots.is_triggered_by(EventName::AppointmentBooked));
        assert!(slots.is_triggered_by(EventName::DoctorScheduleChanged));
        assert!(!slots.is_triggered_by(EventName::RatingAdded));
    }

    #[test]
    fn test_rating_average_triggers() {
        let registry = CacheRegistry::standard();
        let names: Vec<&str> = registry
            .triggered_by(EventName::RatingAdded)
            .map(|d| d.name.as_str())
            .collect();

        assert_eq!(names, vec!["doctor_rating_average"]);
        assert_eq!(registry.get("doctor_rating_average").unwrap().ttl_seconds, 7200);
    }

    #[test]
    fn test_untagged_definition_is_rejected() {
        let result = CacheRegistry::new(vec![CacheDefinition::new("orphan", "orphan:{id}", 60)]);
        assert!(matches!(result, Err(CacheError::InvalidDefinition(_))));
    }
}

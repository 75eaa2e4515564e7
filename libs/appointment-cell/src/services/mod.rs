pub mod booking;
pub mod conflict;
pub mod consistency;
pub mod lifecycle;

pub use booking::SlotAllocator;
pub use conflict::{ConflictResolver, FixedJitter, JitterSource, RandomJitter};
pub use consistency::SchedulingEngine;
pub use lifecycle::StatusGraph;

// =====================================================================================
// APPOINTMENT CELL - SCHEDULING & CONSISTENCY
// =====================================================================================

pub mod models;
pub mod services;

pub use services::{
    ConflictResolver, FixedJitter, JitterSource, RandomJitter, SchedulingEngine, SlotAllocator, StatusGraph,
};

pub mod clock;
pub mod events;
pub mod telemetry;
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use events::{BroadcastEventBus, EventBus};

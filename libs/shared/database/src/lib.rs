pub mod memory;
pub mod store;

pub use memory::InMemoryBookingStore;
pub use store::{BookingStore, StoreError};

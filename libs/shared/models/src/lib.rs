pub mod entity;
pub mod error;
pub mod event;
pub mod role;
pub mod slot;
pub mod status;

pub use entity::*;
pub use error::*;
pub use event::*;
pub use role::*;
pub use slot::*;
pub use status::*;

// =====================================================================================
// SECURITY CELL - ADMISSION CONTROL
// =====================================================================================
//
// Role-weighted sliding-window rate limiting applied at the API boundary before
// requests reach the scheduling engine.
//
// =====================================================================================

pub mod models;
pub mod services;

pub use models::{LimitClass, RateLimitError, RateLimitStatus};
pub use services::RateLimiter;

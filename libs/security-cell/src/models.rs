// =====================================================================================
// SECURITY CELL MODELS
// =====================================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use shared_config::RateLimitConfig;
use shared_models::{EngineError, UserRole};

/// Request classes with independent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitClass {
    Auth,
    Upload,
    /// Booking and consultation requests.
    Konsultasi,
    Search,
    Admin,
    General,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Auth => "auth",
            LimitClass::Upload => "upload",
            LimitClass::Konsultasi => "konsultasi",
            LimitClass::Search => "search",
            LimitClass::Admin => "admin",
            LimitClass::General => "general",
        }
    }

    pub fn base_limit(&self, config: &RateLimitConfig) -> u32 {
        match self {
            LimitClass::Auth => config.auth,
            LimitClass::Upload => config.upload,
            LimitClass::Konsultasi => config.konsultasi,
            LimitClass::Search => config.search,
            LimitClass::Admin => config.admin,
            LimitClass::General => config.general,
        }
    }

    /// `floor(base * role multiplier)`.
    pub fn effective_limit(&self, config: &RateLimitConfig, role: UserRole) -> u32 {
        (self.base_limit(config) as f64 * role.multiplier()).floor() as u32
    }
}

impl fmt::Display for LimitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitClass {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(LimitClass::Auth),
            "upload" => Ok(LimitClass::Upload),
            "konsultasi" | "booking" => Ok(LimitClass::Konsultasi),
            "search" => Ok(LimitClass::Search),
            "admin" => Ok(LimitClass::Admin),
            "general" => Ok(LimitClass::General),
            other => Err(EngineError::UnknownValue(format!("limit class '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub class: LimitClass,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit of {limit} for '{class}' exceeded, retry after {retry_after_seconds}s")]
    LimitExceeded {
        class: LimitClass,
        limit: u32,
        retry_after_seconds: u64,
    },
}

impl From<RateLimitError> for EngineError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded {
                class,
                retry_after_seconds,
                ..
            } => EngineError::RateLimited {
                class: class.to_string(),
                retry_after_seconds,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limits_are_floored() {
        let config = RateLimitConfig::default();

        assert_eq!(LimitClass::General.effective_limit(&config, UserRole::Pasien), 60);
        assert_eq!(LimitClass::Konsultasi.effective_limit(&config, UserRole::Dokter), 30);
        assert_eq!(LimitClass::Auth.effective_limit(&config, UserRole::Guest), 2);
        assert_eq!(LimitClass::Upload.effective_limit(&config, UserRole::Dokter), 15);
        assert_eq!(LimitClass::Admin.effective_limit(&config, UserRole::Admin), 200);
    }

    #[test]
    fn test_limit_class_parses_booking_alias() {
        assert_eq!("booking".parse::<LimitClass>().unwrap(), LimitClass::Konsultasi);
        assert!("bulk".parse::<LimitClass>().is_err());
    }
}

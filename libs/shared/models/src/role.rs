use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Dokter,
    Pasien,
    Guest,
}

impl UserRole {
    /// Scaling factor applied to every base rate limit.
    pub fn multiplier(&self) -> f64 {
        match self {
            UserRole::Admin => 2.0,
            UserRole::Dokter => 1.5,
            UserRole::Pasien => 1.0,
            UserRole::Guest => 0.5,
        }
    }

    /// Unknown or missing roles get the most restrictive treatment.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => UserRole::Admin,
            Some("dokter") | Some("doctor") => UserRole::Dokter,
            Some("pasien") | Some("patient") => UserRole::Pasien,
            _ => UserRole::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Dokter => "dokter",
            UserRole::Pasien => "pasien",
            UserRole::Guest => "guest",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_is_guest() {
        assert_eq!(UserRole::parse(Some("superuser")), UserRole::Guest);
        assert_eq!(UserRole::parse(None), UserRole::Guest);
        assert_eq!(UserRole::parse(Some(" Doctor ")), UserRole::Dokter);
    }
}

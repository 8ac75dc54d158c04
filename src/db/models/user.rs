use core::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub String);

/// Base user table model. `total_xp` only ever moves through the progression
/// engine; `current_level` trails eligibility until a promotion is claimed.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub joined_at: NaiveDateTime,
    pub current_level: i64,
    pub total_xp: i64,
    pub verification_status: String,
    pub social_url: Option<String>,
    pub builder_score: f64,
    pub last_active: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserRecord {
    pub fn status(&self) -> VerificationStatus {
        VerificationStatus::parse(&self.verification_status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "verified" => VerificationStatus::Verified,
            "rejected" => VerificationStatus::Rejected,
            _ => VerificationStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub id: UserId,
    pub username: String,
    pub total_xp: i64,
    pub current_level: i64,
    pub ranking: i64,
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            VerificationStatus::Pending,
            VerificationStatus::Verified,
            VerificationStatus::Rejected,
        ] {
            assert_eq!(VerificationStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(
            VerificationStatus::parse("definitely-not-a-status"),
            VerificationStatus::Pending
        );
    }
}

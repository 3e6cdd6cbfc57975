use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Account status of a console user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Enabled,
    Disabled,
}

impl UserStatus {
    /// Status the enable/disable action switches to.
    pub fn toggled(self) -> Self {
        match self {
            UserStatus::Enabled => UserStatus::Disabled,
            UserStatus::Disabled => UserStatus::Enabled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Enabled => "enabled",
            UserStatus::Disabled => "disabled",
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enabled" => Ok(UserStatus::Enabled),
            "disabled" => Ok(UserStatus::Disabled),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

impl Display for UserStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Console role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Normal,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Normal => "normal",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(UserRole::Normal),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Application-level user record (row of the `users` table), keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: UserStatus,
    pub role: UserRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bucket_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Enabled
    }
}

/// Criteria emitted by the users search form. Empty strings count as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilters {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_deserializes_null_bucket_ids() {
        let json = serde_json::json!({
            "id": "6f1c1d8e-9d3e-4a59-8d6a-0b3c1a2b3c4d",
            "email": "ops@example.com",
            "name": "Ops",
            "status": "enabled",
            "role": "admin",
            "bucket_ids": null,
            "created_at": "2024-05-01T08:00:00Z",
            "updated_at": null
        });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert!(profile.bucket_ids.is_empty());
        assert!(profile.is_admin());
        assert!(profile.is_enabled());
    }

    #[test]
    fn status_toggles() {
        assert_eq!(UserStatus::Enabled.toggled(), UserStatus::Disabled);
        assert_eq!(UserStatus::Disabled.toggled(), UserStatus::Enabled);
    }

    #[test]
    fn role_and_status_parse() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("disabled".parse::<UserStatus>().unwrap(), UserStatus::Disabled);
        assert!("root".parse::<UserRole>().is_err());
    }
}

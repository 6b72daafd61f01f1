use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::error::HubError;

const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Developer => "Developer",
        }
    }
}

#[derive(Debug, ThisError)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Administrator" => Ok(Role::Administrator),
            "Developer" => Ok(Role::Developer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

/// Decrypted view of the stored password.
#[derive(Clone, PartialEq)]
pub enum Secret {
    /// No password was ever stored.
    Absent,
    Available(String),
    /// A sealed value exists but could not be opened.
    Unavailable,
}

impl Secret {
    pub fn as_option(&self) -> Option<&str> {
        match self {
            Secret::Available(p) => Some(p.as_str()),
            Secret::Absent | Secret::Unavailable => None,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Absent => f.write_str("Absent"),
            Secret::Available(_) => f.write_str("Available(<redacted>)"),
            Secret::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// A connection record with its password opened.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_user: String,
    pub password: Secret,
}

impl ConnectionRecord {
    pub fn password(&self) -> Option<&str> {
        self.password.as_option()
    }
}

/// Listing shape; never carries the password in any form.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSummary {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_user: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInput {
    pub name: String,
    pub host: String,
    pub port: i64,
    pub database_user: String,
    #[serde(default)]
    pub database_password: Option<String>,
}

impl ConnectionInput {
    pub fn validate(&self) -> Result<u16, HubError> {
        required("name", &self.name)?;
        required("host", &self.host)?;
        required("database_user", &self.database_user)?;
        u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| HubError::validation("port must be between 1 and 65535"))
    }
}

fn required(field: &str, value: &str) -> Result<(), HubError> {
    if value.trim().is_empty() {
        return Err(HubError::validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(HubError::validation(format!(
            "{field} must not exceed {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(port: i64) -> ConnectionInput {
        ConnectionInput {
            name: "prod".to_string(),
            host: "db.internal".to_string(),
            port,
            database_user: "reader".to_string(),
            database_password: None,
        }
    }

    #[test]
    fn port_must_fit_u16() {
        assert_eq!(input(3306).validate().unwrap(), 3306);
        assert!(input(0).validate().is_err());
        assert!(input(70000).validate().is_err());
    }

    #[test]
    fn blank_and_oversized_fields_are_rejected() {
        let mut i = input(3306);
        i.host = "  ".to_string();
        assert!(i.validate().is_err());
        let mut i = input(3306);
        i.name = "x".repeat(256);
        assert!(i.validate().is_err());
    }

    #[test]
    fn secret_debug_never_prints_plaintext() {
        let s = Secret::Available("hunter2".to_string());
        assert!(!format!("{s:?}").contains("hunter2"));
        assert_eq!(Secret::Unavailable.as_option(), None);
    }
}

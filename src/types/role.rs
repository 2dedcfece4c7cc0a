use crate::error::DbCredError;
use crate::service::template;
use crate::types::duration_serde;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A named policy: which database to provision on, and the statements used
/// to create, renew and revoke an account there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub db_name: String,
    pub creation_statements: Vec<String>,
    #[serde(default)]
    pub revocation_statements: Vec<String>,
    #[serde(default)]
    pub renew_statements: Vec<String>,
    #[serde(default)]
    pub rollback_statements: Vec<String>,
    /// Zero means "use the system default".
    #[serde(default, with = "duration_serde::secs")]
    pub default_ttl: Duration,
    /// Zero means "bounded only by the system maximum".
    #[serde(default, with = "duration_serde::secs")]
    pub max_ttl: Duration,
}

impl Role {
    /// Check the invariants a role must satisfy before it is stored.
    pub fn validate(&self) -> Result<(), DbCredError> {
        if self.name.trim().is_empty() {
            return Err(DbCredError::config("role name must not be empty"));
        }
        if self.db_name.trim().is_empty() {
            return Err(DbCredError::config(format!(
                "role {}: db_name must not be empty",
                self.name
            )));
        }
        if self.creation_statements.is_empty() {
            return Err(DbCredError::config(format!(
                "role {}: at least one creation statement is required",
                self.name
            )));
        }
        if self.revocation_statements.is_empty() {
            return Err(DbCredError::config(format!(
                "role {}: at least one revocation statement is required",
                self.name
            )));
        }
        if !self.max_ttl.is_zero() && self.default_ttl > self.max_ttl {
            return Err(DbCredError::config(format!(
                "role {}: default_ttl ({}s) exceeds max_ttl ({}s)",
                self.name,
                self.default_ttl.as_secs(),
                self.max_ttl.as_secs()
            )));
        }

        self.creation_statements
            .iter()
            .chain(&self.revocation_statements)
            .chain(&self.renew_statements)
            .chain(&self.rollback_statements)
            .try_for_each(|stmt| template::validate(stmt))
    }
}

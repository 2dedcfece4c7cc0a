use crate::types::SecretInternal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A lease row: the internal half of a secret plus its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbLease {
    pub lease_id: String,
    pub internal: SecretInternal,
    pub ttl: Duration,
    pub expiration: DateTime<Utc>,
}

impl DbLease {
    pub fn role(&self) -> &str {
        &self.internal.role
    }

    pub fn username(&self) -> &str {
        &self.internal.username
    }
}

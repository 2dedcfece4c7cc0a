use crate::types::duration_serde;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public half of a secret, handed to the requester once.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialData {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialData")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Internal half of a secret. The lease subsystem keeps this and hands it
/// back on renew/revoke.
///
/// `db_name` and `revocation_statements` are captured at issuance so an
/// account can still be revoked after its role has been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretInternal {
    pub username: String,
    pub role: String,
    pub db_name: String,
    #[serde(default)]
    pub revocation_statements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub data: CredentialData,
    pub internal: SecretInternal,
    pub ttl: Duration,
    pub expiration: DateTime<Utc>,
}

/// What the lease subsystem receives when a secret is attached to a lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub internal: SecretInternal,
    #[serde(with = "duration_serde::secs")]
    pub ttl: Duration,
    pub expiration: DateTime<Utc>,
}

impl From<&Secret> for LeaseRequest {
    fn from(secret: &Secret) -> Self {
        Self {
            internal: secret.internal.clone(),
            ttl: secret.ttl,
            expiration: secret.expiration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeasedSecret {
    pub lease_id: String,
    pub secret: Secret,
}

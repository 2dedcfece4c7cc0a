use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::auth::RequireKeyAuth;
use super::router::DynCredsState;
use crate::DbCredError;
use crate::types::CredentialData;

/// Header carrying the requester's display name, folded into the username.
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";
const DEFAULT_DISPLAY_NAME: &str = "token";

#[derive(Debug, Serialize)]
pub struct CredsResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub renewable: bool,
    pub data: CredentialData,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub lease_id: String,
    /// Requested extension in seconds; 0 means the role default.
    #[serde(default)]
    pub increment: u64,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub lease_id: String,
}

/// Whole seconds from now until `expiration`, rounded up.
fn remaining(expiration: DateTime<Utc>) -> Duration {
    let millis = (expiration - Utc::now()).num_milliseconds().max(0) as u64;
    Duration::from_secs(millis.div_ceil(1000))
}

pub async fn health_handler() -> &'static str {
    "ok"
}

/// Generate credentials for a role and attach them to a new lease.
pub async fn read_creds_handler(
    State(state): State<DynCredsState>,
    _auth: RequireKeyAuth,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CredsResponse>, DbCredError> {
    let display_name = headers
        .get(DISPLAY_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME);

    let leased = state
        .engine
        .create_leased(&state.leases, &name, display_name)
        .await?;

    Ok(Json(CredsResponse {
        lease_id: leased.lease_id,
        lease_duration: leased.secret.ttl.as_secs(),
        renewable: true,
        data: leased.secret.data,
    }))
}

pub async fn renew_lease_handler(
    State(state): State<DynCredsState>,
    _auth: RequireKeyAuth,
    Json(req): Json<RenewRequest>,
) -> Result<Json<RenewResponse>, DbCredError> {
    let lease = state
        .leases
        .get_lease(&req.lease_id)
        .await?
        .ok_or_else(|| DbCredError::LeaseNotFound(req.lease_id.clone()))?;

    let expiration = state
        .engine
        .renew(&lease.internal, Duration::from_secs(req.increment))
        .await?;
    let ttl = remaining(expiration);
    state
        .leases
        .update_expiration(&lease.lease_id, ttl, expiration)
        .await?;

    Ok(Json(RenewResponse {
        lease_id: lease.lease_id,
        lease_duration: ttl.as_secs(),
        expiration,
    }))
}

/// Revoke a lease. Unknown lease ids succeed so retries are harmless.
pub async fn revoke_lease_handler(
    State(state): State<DynCredsState>,
    _auth: RequireKeyAuth,
    Json(req): Json<RevokeRequest>,
) -> Result<StatusCode, DbCredError> {
    let Some(lease) = state.leases.get_lease(&req.lease_id).await? else {
        debug!(lease_id = %req.lease_id, "revoke for unknown lease; nothing to do");
        return Ok(StatusCode::NO_CONTENT);
    };

    state.engine.revoke(&lease.internal).await?;
    state.leases.delete_lease(&lease.lease_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

use crate::db::{LeaseStorage, RoleStorage};
use crate::service::CredentialEngine;
use axum::{
    Router,
    routing::{get, put},
};
use std::sync::Arc;

use super::handlers::{
    health_handler, read_creds_handler, renew_lease_handler, revoke_lease_handler,
};

#[derive(Clone)]
pub struct DynCredsState {
    pub engine: Arc<CredentialEngine<RoleStorage>>,
    pub leases: LeaseStorage,
    pub api_key: Arc<str>,
}

impl DynCredsState {
    pub fn new(
        engine: Arc<CredentialEngine<RoleStorage>>,
        leases: LeaseStorage,
        api_key: Arc<str>,
    ) -> Self {
        Self {
            engine,
            leases,
            api_key,
        }
    }
}

pub fn dyncreds_router(state: DynCredsState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/creds/{name}", get(read_creds_handler))
        .route("/leases/renew", put(renew_lease_handler))
        .route("/leases/revoke", put(revoke_lease_handler))
        .with_state(state)
}

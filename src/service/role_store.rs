use crate::error::DbCredError;
use crate::types::Role;
use std::future::Future;
use std::sync::Arc;

/// Read-only access to role definitions.
pub trait RoleStore: Send + Sync {
    /// `Ok(None)` when no role by that name exists.
    fn get_role(&self, name: &str) -> impl Future<Output = Result<Option<Role>, DbCredError>> + Send;
}

impl<T: RoleStore> RoleStore for Arc<T> {
    fn get_role(&self, name: &str) -> impl Future<Output = Result<Option<Role>, DbCredError>> + Send {
        (**self).get_role(name)
    }
}

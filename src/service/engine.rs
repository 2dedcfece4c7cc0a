//! Issuance engine: create, renew and revoke dynamic credentials.
//!
//! A create walks role → connection → generated identity → provisioned
//! account → packaged secret, and stops at the first failure. Once the
//! account exists it is not rolled back: the caller gets either the secret
//! or an error naming the account. The one exception is a caller that was
//! cancelled mid-provision, whose account is revoked by the provisioning task.

use crate::error::DbCredError;
use crate::service::connection::DatabaseConnection;
use crate::service::credential_gen::CredentialGenerator;
use crate::service::lease::LeaseRegistrar;
use crate::service::registry::{ConnectionGuard, ConnectionRegistry};
use crate::service::role_store::RoleStore;
use crate::types::{
    ConnectionConfig, CredentialData, LeaseRequest, LeasedSecret, Role, Secret, SecretInternal,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Run a database call in its own task.
///
/// The task owns the registry guard and the transaction, so if the caller
/// goes away mid-call the transaction still commits or rolls back, and the
/// handle stays registered until the task is done with it.
async fn spawn_on_connection<Fut>(fut: Fut) -> Result<(), DbCredError>
where
    Fut: Future<Output = Result<(), DbCredError>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| DbCredError::Internal(format!("database task failed: {e}")))?
}

struct ProvisionJob {
    role: String,
    creation: Vec<String>,
    revocation: Vec<String>,
    username: String,
    password: String,
    expiration: DateTime<Utc>,
}

/// Create the account in a spawned task and hand the outcome back over a
/// oneshot. If the caller is gone by the time the account is committed, the
/// task revokes it again; if that fails too the username is logged at error.
fn provision_detached(
    conn: ConnectionGuard,
    job: ProvisionJob,
) -> impl Future<Output = Result<(), DbCredError>> + Send {
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = conn
            .create_user(&job.creation, &job.username, &job.password, job.expiration)
            .await;
        let Err(Ok(())) = done_tx.send(result) else {
            return;
        };
        error!(
            role = %job.role,
            db = %conn.name(),
            username = %job.username,
            "caller went away after the account was provisioned; revoking it"
        );
        match conn.revoke_user(&job.revocation, &job.username).await {
            Ok(()) => info!(db = %conn.name(), username = %job.username, "unreturned credential revoked"),
            Err(e) => error!(
                role = %job.role,
                db = %conn.name(),
                username = %job.username,
                error = %e,
                "unreturned credential could not be revoked; account needs manual cleanup"
            ),
        }
    });
    async move {
        done_rx
            .await
            .map_err(|_| DbCredError::Internal("provisioning task ended without a result".to_string()))?
    }
}

/// Armed while an issued secret has not reached the caller. Dropping it armed
/// means the caller was cancelled and the account is orphaned.
struct UnreturnedSecret<'a> {
    internal: &'a SecretInternal,
    armed: bool,
}

impl Drop for UnreturnedSecret<'_> {
    fn drop(&mut self) {
        if self.armed {
            error!(
                role = %self.internal.role,
                db = %self.internal.db_name,
                username = %self.internal.username,
                "caller went away before the lease was attached; account needs revocation"
            );
        }
    }
}

pub struct CredentialEngine<S> {
    roles: S,
    registry: ConnectionRegistry,
    generator: CredentialGenerator,
}

impl<S: RoleStore> CredentialEngine<S> {
    pub fn new(roles: S, registry: ConnectionRegistry, generator: CredentialGenerator) -> Self {
        Self {
            roles,
            registry,
            generator,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn generator(&self) -> &CredentialGenerator {
        &self.generator
    }

    async fn resolve_role(&self, name: &str) -> Result<Role, DbCredError> {
        self.roles
            .get_role(name)
            .await?
            .ok_or_else(|| DbCredError::RoleNotFound(name.to_string()))
    }

    async fn resolve_connection(&self, db_name: &str) -> Result<ConnectionGuard, DbCredError> {
        self.registry
            .lookup(db_name)
            .await
            .ok_or_else(|| DbCredError::ConnectionNotFound(db_name.to_string()))
    }

    /// Issue a new credential for `role_name`.
    pub async fn create(&self, role_name: &str, display_name: &str) -> Result<Secret, DbCredError> {
        let role = self.resolve_role(role_name).await?;
        debug!(role = %role.name, db = %role.db_name, "role resolved");

        let conn = self.resolve_connection(&role.db_name).await?;

        let username = self.generator.generate_username(&role.name, display_name)?;
        let password = self.generator.generate_password()?;
        let ttl = self.renewal_ttl(&role, Duration::ZERO);
        let expiration = self.generator.generate_expiration(ttl)?;
        debug!(role = %role.name, username = %username, "credential generated");

        let outcome = provision_detached(
            conn,
            ProvisionJob {
                role: role.name.clone(),
                creation: role.creation_statements.clone(),
                revocation: role.revocation_statements.clone(),
                username: username.clone(),
                password: password.clone(),
                expiration,
            },
        );
        outcome.await.inspect_err(|e| {
            warn!(role = %role.name, db = %role.db_name, error = %e, "provisioning failed");
        })?;

        info!(
            role = %role.name,
            db = %role.db_name,
            username = %username,
            ttl_secs = ttl.as_secs(),
            "credential issued"
        );

        Ok(Secret {
            data: CredentialData {
                username: username.clone(),
                password,
            },
            internal: SecretInternal {
                username,
                role: role.name,
                db_name: role.db_name,
                revocation_statements: role.revocation_statements,
            },
            ttl,
            expiration,
        })
    }

    /// Issue a credential and attach it to a lease.
    ///
    /// If the lease cannot be recorded the account already exists; it is
    /// reported at error level and returned as `LeaseRegistration` so the
    /// host can revoke it.
    pub async fn create_leased<L: LeaseRegistrar>(
        &self,
        leases: &L,
        role_name: &str,
        display_name: &str,
    ) -> Result<LeasedSecret, DbCredError> {
        let secret = self.create(role_name, display_name).await?;
        let mut pending = UnreturnedSecret {
            internal: &secret.internal,
            armed: true,
        };
        let registered = leases.register(&LeaseRequest::from(&secret)).await;
        pending.armed = false;
        drop(pending);
        match registered {
            Ok(lease_id) => {
                debug!(lease_id = %lease_id, username = %secret.internal.username, "lease attached");
                Ok(LeasedSecret { lease_id, secret })
            }
            Err(e) => {
                error!(
                    role = %secret.internal.role,
                    db = %secret.internal.db_name,
                    username = %secret.internal.username,
                    error = %e,
                    "credential provisioned but lease registration failed; account needs revocation"
                );
                Err(DbCredError::LeaseRegistration {
                    role: secret.internal.role,
                    username: secret.internal.username,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// TTL for an issue or renewal: the request (or the role default when
    /// zero), clamped by the system maximum and then by the role's `max_ttl`.
    pub fn renewal_ttl(&self, role: &Role, requested: Duration) -> Duration {
        let base = if requested.is_zero() {
            role.default_ttl
        } else {
            requested
        };
        let ttl = self.generator.effective_ttl(base);
        if role.max_ttl.is_zero() {
            ttl
        } else {
            ttl.min(role.max_ttl)
        }
    }

    /// Extend a credential and return its new expiration.
    ///
    /// A role that now points at a different database than the one the
    /// account lives in cannot renew it; such credentials can only be revoked.
    pub async fn renew(
        &self,
        internal: &SecretInternal,
        requested_ttl: Duration,
    ) -> Result<DateTime<Utc>, DbCredError> {
        let role = self.resolve_role(&internal.role).await?;
        if role.db_name != internal.db_name {
            return Err(DbCredError::config(format!(
                "role {} now targets database {}; credential {} was issued on {} and can only be revoked",
                role.name, role.db_name, internal.username, internal.db_name
            )));
        }
        let ttl = self.renewal_ttl(&role, requested_ttl);
        let expiration = self.generator.generate_expiration(ttl)?;

        if role.renew_statements.is_empty() {
            debug!(role = %role.name, username = %internal.username, "no renew statements; extending lease only");
            return Ok(expiration);
        }

        let conn = self.resolve_connection(&internal.db_name).await?;
        let statements = role.renew_statements.clone();
        let user = internal.username.clone();
        spawn_on_connection(async move { conn.renew_user(&statements, &user, expiration).await })
            .await?;

        info!(
            role = %role.name,
            username = %internal.username,
            ttl_secs = ttl.as_secs(),
            "credential renewed"
        );
        Ok(expiration)
    }

    /// Drop the account behind a credential. Safe to call repeatedly.
    ///
    /// Always targets the database the account was created in. The role's
    /// current revocation statements are used when the role still exists and
    /// still points at that database; otherwise the statements captured at
    /// issuance are used.
    pub async fn revoke(&self, internal: &SecretInternal) -> Result<(), DbCredError> {
        let db_name = internal.db_name.clone();
        let statements = match self.roles.get_role(&internal.role).await? {
            Some(role) if role.db_name == internal.db_name => role.revocation_statements,
            Some(role) => {
                warn!(
                    role = %internal.role,
                    username = %internal.username,
                    issued_on = %internal.db_name,
                    now_on = %role.db_name,
                    "role was moved to another database; revoking with statements captured at issuance"
                );
                internal.revocation_statements.clone()
            }
            None => {
                warn!(
                    role = %internal.role,
                    username = %internal.username,
                    "role no longer exists; revoking with statements captured at issuance"
                );
                internal.revocation_statements.clone()
            }
        };
        if statements.is_empty() {
            return Err(DbCredError::config(format!(
                "no revocation statements available for role {}",
                internal.role
            )));
        }

        let conn = self.resolve_connection(&db_name).await?;
        let user = internal.username.clone();
        spawn_on_connection(async move { conn.revoke_user(&statements, &user).await }).await?;

        info!(role = %internal.role, db = %db_name, username = %internal.username, "credential revoked");
        Ok(())
    }

    /// Open (or reopen) a connection and register it under its name.
    pub async fn configure_connection(&self, config: ConnectionConfig) -> Result<(), DbCredError> {
        let name = config.name.clone();
        let conn = DatabaseConnection::connect(config).await?;
        self.registry.put(name, conn).await;
        Ok(())
    }

    /// Close and reopen a registered connection with its current config.
    pub async fn reset_connection(&self, name: &str) -> Result<(), DbCredError> {
        let config = self.resolve_connection(name).await?.config().clone();
        self.configure_connection(config).await
    }

    pub async fn remove_connection(&self, name: &str) -> bool {
        self.registry.remove(name).await
    }

    /// Register every config, skipping (and logging) the ones that fail.
    /// Returns how many were registered.
    pub async fn load_connections(&self, configs: Vec<ConnectionConfig>) -> usize {
        let mut loaded = 0;
        for config in configs {
            let name = config.name.clone();
            match self.configure_connection(config).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(db = %name, error = %e, "failed to open stored connection"),
            }
        }
        loaded
    }
}

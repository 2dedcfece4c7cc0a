use crate::error::DbCredError;
use crate::service::credential_gen::format_expiration;
use crate::service::template::{self, TemplateValues};
use crate::types::ConnectionConfig;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{AnyPool, Error as SqlxError, Executor};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLSTATEs meaning "no such object": Postgres `undefined_object` and
/// `undefined_table`, MySQL `ER_BAD_TABLE_ERROR`.
const ABSENT_SQLSTATES: &[&str] = &["42704", "42P01", "42S02"];

/// MySQL `ER_BAD_TABLE_ERROR` and `ER_CANNOT_USER` (DROP USER on a missing user).
const ABSENT_MYSQL_CODES: &[u16] = &[1051, 1396];

/// Message fragments; SQLite reports missing objects only this way.
const ABSENT_MESSAGES: &[&str] = &[
    "does not exist",
    "operation drop user failed",
    "unknown table",
    "no such table",
    "no such index",
    "no such view",
    "no such trigger",
];

type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SqlxError>> + Send + 'a>>;

fn connect_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(3)
        .with_jitter()
}

fn is_transient(e: &SqlxError) -> bool {
    matches!(
        e,
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::Tls(_)
    )
}

/// True when the database says the object being dropped is already gone.
fn is_absent_error(e: &SqlxError) -> bool {
    let SqlxError::Database(db_err) = e else {
        return false;
    };
    if db_err
        .code()
        .is_some_and(|code| ABSENT_SQLSTATES.contains(&&*code))
    {
        return true;
    }
    if db_err
        .try_downcast_ref::<MySqlDatabaseError>()
        .is_some_and(|e| ABSENT_MYSQL_CODES.contains(&e.number()))
    {
        return true;
    }
    let msg = db_err.message().to_ascii_lowercase();
    ABSENT_MESSAGES.iter().any(|m| msg.contains(m))
}

/// One configured backing database: its pool plus the config it was built from.
pub struct DatabaseConnection {
    config: ConnectionConfig,
    pool: AnyPool,
}

impl DatabaseConnection {
    /// Build the pool. With `verify_connection` the database is contacted
    /// up front (with a short retry); otherwise the pool connects on first use.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, DbCredError> {
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new().max_connections(config.max_open_connections.max(1));
        if !config.statement_timeout.is_zero() {
            options = options.acquire_timeout(config.statement_timeout);
        }

        let pool = if config.verify_connection {
            let url = config.connection_url.as_str();
            (|| {
                let options = options.clone();
                async move { options.connect(url).await }
            })
            .retry(connect_retry_policy())
            .when(is_transient)
            .notify(|err, dur: Duration| {
                warn!(
                    db = %config.name,
                    "connect failed with {}, retrying in {:?}", err, dur
                );
            })
            .await
            .map_err(|e| DbCredError::provision(&config.name, e))?
        } else {
            options
                .connect_lazy(&config.connection_url)
                .map_err(|e| DbCredError::provision(&config.name, e))?
        };

        info!(
            db = %config.name,
            url = %config.redacted_url(),
            max_open = config.max_open_connections,
            verified = config.verify_connection,
            "database connection configured"
        );
        Ok(Self { config, pool })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create the account. All statements run in one transaction; a failure
    /// part-way leaves nothing behind.
    pub async fn create_user(
        &self,
        statements: &[String],
        username: &str,
        password: &str,
        expiration: DateTime<Utc>,
    ) -> Result<(), DbCredError> {
        let expiration = format_expiration(expiration);
        let values = TemplateValues {
            name: username,
            password: Some(password),
            expiration: Some(&expiration),
        };
        let rendered = template::render_all(statements, &values)?;
        if rendered.is_empty() {
            return Err(DbCredError::config("no creation statements to execute"));
        }

        self.bounded(self.execute_all(&rendered))
            .await?
            .map_err(|e| DbCredError::provision(self.name(), e))?;
        debug!(db = %self.name(), username, "account created");
        Ok(())
    }

    /// Extend the account. Empty `statements` is a no-op.
    pub async fn renew_user(
        &self,
        statements: &[String],
        username: &str,
        expiration: DateTime<Utc>,
    ) -> Result<(), DbCredError> {
        let expiration = format_expiration(expiration);
        let values = TemplateValues {
            name: username,
            password: None,
            expiration: Some(&expiration),
        };
        let rendered = template::render_all(statements, &values)?;
        if rendered.is_empty() {
            return Ok(());
        }

        self.bounded(self.execute_all(&rendered))
            .await?
            .map_err(|e| DbCredError::provision(self.name(), e))?;
        debug!(db = %self.name(), username, "account renewed");
        Ok(())
    }

    /// Drop the account. An already-absent account counts as success.
    pub async fn revoke_user(&self, statements: &[String], username: &str) -> Result<(), DbCredError> {
        let rendered = template::render_all(statements, &TemplateValues::name_only(username))?;
        if rendered.is_empty() {
            return Err(DbCredError::config("no revocation statements to execute"));
        }

        match self.bounded(self.execute_all(&rendered)).await? {
            Ok(()) => {
                debug!(db = %self.name(), username, "account revoked");
                Ok(())
            }
            Err(e) if is_absent_error(&e) => {
                warn!(db = %self.name(), username, error = %e, "account already absent; treating revoke as done");
                Ok(())
            }
            Err(e) => Err(DbCredError::provision(self.name(), e)),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(db = %self.name(), "database connection closed");
    }

    /// Boxed so the future stays `Send` when it runs inside `tokio::spawn`.
    fn execute_all<'a>(&'a self, statements: &'a [String]) -> ExecFuture<'a> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for (idx, stmt) in statements.iter().enumerate() {
                if let Err(e) = Executor::execute(&mut *tx, stmt.as_str()).await {
                    debug!(db = %self.name(), statement = idx + 1, error = %e, "statement failed; rolling back");
                    if let Err(rb) = tx.rollback().await {
                        warn!(db = %self.name(), error = %rb, "rollback failed");
                    }
                    return Err(e);
                }
            }
            tx.commit().await
        })
    }

    /// Apply the statement timeout. Dropping the inner future on expiry drops
    /// its open transaction, which sqlx rolls back.
    async fn bounded<T>(&self, fut: impl Future<Output = T>) -> Result<T, DbCredError> {
        let after = self.config.statement_timeout;
        if after.is_zero() {
            return Ok(fut.await);
        }
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| DbCredError::Timeout {
                db: self.config.name.clone(),
                after,
            })
    }
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

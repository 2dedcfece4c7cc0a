use crate::db::models::DbLease;
use crate::db::schema::SQLITE_INIT;
use crate::error::DbCredError;
use crate::service::credential_gen::random_token;
use crate::service::lease::LeaseRegistrar;
use crate::service::role_store::RoleStore;
use crate::types::{ConnectionConfig, LeaseRequest, Role, SecretInternal};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

pub type SqlitePool = Pool<Sqlite>;

const LEASE_ID_TOKEN_LEN: usize = 24;

fn secs_to_i64(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

fn millis_to_i64(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn i64_to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn to_json_text(statements: &[String]) -> Result<String, DbCredError> {
    Ok(serde_json::to_string(statements)?)
}

fn from_json_text(text: &str) -> Result<Vec<String>, DbCredError> {
    serde_json::from_str(text).map_err(|e| sqlx::Error::Decode(Box::new(e)).into())
}

/// Open (creating if missing) the storage database and apply the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, DbCredError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Initialize the schema by executing the bundled DDL.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), DbCredError> {
    // execute one statement at a time; sqlx::query takes a single statement
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

/// Role and connection definitions.
#[derive(Clone)]
pub struct RoleStorage {
    pool: SqlitePool,
}

impl RoleStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate and upsert by role name.
    pub async fn upsert_role(&self, role: &Role) -> Result<(), DbCredError> {
        role.validate()?;
        sqlx::query(
            r#"
            INSERT INTO roles (
                name, db_name, creation_statements, revocation_statements,
                renew_statements, rollback_statements, default_ttl_secs, max_ttl_secs
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                db_name=excluded.db_name,
                creation_statements=excluded.creation_statements,
                revocation_statements=excluded.revocation_statements,
                renew_statements=excluded.renew_statements,
                rollback_statements=excluded.rollback_statements,
                default_ttl_secs=excluded.default_ttl_secs,
                max_ttl_secs=excluded.max_ttl_secs
            "#,
        )
        .bind(&role.name)
        .bind(&role.db_name)
        .bind(to_json_text(&role.creation_statements)?)
        .bind(to_json_text(&role.revocation_statements)?)
        .bind(to_json_text(&role.renew_statements)?)
        .bind(to_json_text(&role.rollback_statements)?)
        .bind(secs_to_i64(role.default_ttl))
        .bind(secs_to_i64(role.max_ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_role(&self, name: &str) -> Result<Option<Role>, DbCredError> {
        let row = sqlx::query(
            r#"SELECT name, db_name, creation_statements, revocation_statements,
               renew_statements, rollback_statements, default_ttl_secs, max_ttl_secs
               FROM roles WHERE name = ?"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_role).transpose()
    }

    pub async fn delete_role(&self, name: &str) -> Result<bool, DbCredError> {
        let res = sqlx::query("DELETE FROM roles WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_roles(&self) -> Result<Vec<String>, DbCredError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn upsert_connection(&self, config: &ConnectionConfig) -> Result<(), DbCredError> {
        if config.name.trim().is_empty() {
            return Err(DbCredError::config("connection name must not be empty"));
        }
        sqlx::query(
            r#"
            INSERT INTO connections (
                name, connection_url, max_open_connections, statement_timeout_ms, verify_connection
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                connection_url=excluded.connection_url,
                max_open_connections=excluded.max_open_connections,
                statement_timeout_ms=excluded.statement_timeout_ms,
                verify_connection=excluded.verify_connection
            "#,
        )
        .bind(&config.name)
        .bind(&config.connection_url)
        .bind(i64::from(config.max_open_connections))
        .bind(millis_to_i64(config.statement_timeout))
        .bind(if config.verify_connection { 1 } else { 0 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_connection(&self, name: &str) -> Result<Option<ConnectionConfig>, DbCredError> {
        let row = sqlx::query(
            r#"SELECT name, connection_url, max_open_connections, statement_timeout_ms, verify_connection
               FROM connections WHERE name = ?"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_connection).transpose()
    }

    pub async fn delete_connection(&self, name: &str) -> Result<bool, DbCredError> {
        let res = sqlx::query("DELETE FROM connections WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_connections(&self) -> Result<Vec<ConnectionConfig>, DbCredError> {
        let rows = sqlx::query(
            r#"SELECT name, connection_url, max_open_connections, statement_timeout_ms, verify_connection
               FROM connections ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_connection).collect()
    }

    fn row_to_role(row: SqliteRow) -> Result<Role, DbCredError> {
        let name: String = row.try_get("name")?;
        let db_name: String = row.try_get("db_name")?;
        let creation: String = row.try_get("creation_statements")?;
        let revocation: String = row.try_get("revocation_statements")?;
        let renew: String = row.try_get("renew_statements")?;
        let rollback: String = row.try_get("rollback_statements")?;
        let default_ttl_secs: i64 = row.try_get("default_ttl_secs")?;
        let max_ttl_secs: i64 = row.try_get("max_ttl_secs")?;

        Ok(Role {
            name,
            db_name,
            creation_statements: from_json_text(&creation)?,
            revocation_statements: from_json_text(&revocation)?,
            renew_statements: from_json_text(&renew)?,
            rollback_statements: from_json_text(&rollback)?,
            default_ttl: Duration::from_secs(i64_to_u64(default_ttl_secs)),
            max_ttl: Duration::from_secs(i64_to_u64(max_ttl_secs)),
        })
    }

    fn row_to_connection(row: SqliteRow) -> Result<ConnectionConfig, DbCredError> {
        let name: String = row.try_get("name")?;
        let connection_url: String = row.try_get("connection_url")?;
        let max_open: i64 = row.try_get("max_open_connections")?;
        let timeout_ms: i64 = row.try_get("statement_timeout_ms")?;
        let verify_i: i64 = row.try_get("verify_connection")?;

        Ok(ConnectionConfig::new(name, connection_url)
            .with_max_open_connections(u32::try_from(max_open).unwrap_or(1))
            .with_statement_timeout(Duration::from_millis(i64_to_u64(timeout_ms)))
            .with_verify_connection(verify_i != 0))
    }
}

impl RoleStore for RoleStorage {
    fn get_role(&self, name: &str) -> impl Future<Output = Result<Option<Role>, DbCredError>> + Send {
        self.fetch_role(name)
    }
}

/// Lease bookkeeping: internal secret data keyed by lease id.
#[derive(Clone)]
pub struct LeaseStorage {
    pool: SqlitePool,
}

impl LeaseStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_lease(&self, lease: &DbLease) -> Result<(), DbCredError> {
        sqlx::query(
            r#"INSERT INTO leases (lease_id, role, username, internal, ttl_secs, expiration)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&lease.lease_id)
        .bind(lease.role())
        .bind(lease.username())
        .bind(serde_json::to_string(&lease.internal)?)
        .bind(secs_to_i64(lease.ttl))
        .bind(lease.expiration.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_lease(&self, lease_id: &str) -> Result<Option<DbLease>, DbCredError> {
        let row = sqlx::query(
            r#"SELECT lease_id, internal, ttl_secs, expiration FROM leases WHERE lease_id = ?"#,
        )
        .bind(lease_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_lease).transpose()
    }

    pub async fn update_expiration(
        &self,
        lease_id: &str,
        ttl: Duration,
        expiration: DateTime<Utc>,
    ) -> Result<bool, DbCredError> {
        let res = sqlx::query("UPDATE leases SET ttl_secs = ?, expiration = ? WHERE lease_id = ?")
            .bind(secs_to_i64(ttl))
            .bind(expiration.to_rfc3339())
            .bind(lease_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_lease(&self, lease_id: &str) -> Result<bool, DbCredError> {
        let res = sqlx::query("DELETE FROM leases WHERE lease_id = ?")
            .bind(lease_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    fn row_to_lease(row: SqliteRow) -> Result<DbLease, DbCredError> {
        let lease_id: String = row.try_get("lease_id")?;
        let internal_json: String = row.try_get("internal")?;
        let ttl_secs: i64 = row.try_get("ttl_secs")?;
        let expiration_str: String = row.try_get("expiration")?;

        let internal: SecretInternal = serde_json::from_str(&internal_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let expiration: DateTime<Utc> = DateTime::parse_from_rfc3339(&expiration_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(DbLease {
            lease_id,
            internal,
            ttl: Duration::from_secs(i64_to_u64(ttl_secs)),
            expiration,
        })
    }
}

impl LeaseRegistrar for LeaseStorage {
    async fn register(&self, request: &LeaseRequest) -> Result<String, DbCredError> {
        let lease_id = format!(
            "creds/{}/{}",
            request.internal.role,
            random_token(LEASE_ID_TOKEN_LEN)?
        );
        self.insert_lease(&DbLease {
            lease_id: lease_id.clone(),
            internal: request.internal.clone(),
            ttl: request.ttl,
            expiration: request.expiration,
        })
        .await?;
        Ok(lease_id)
    }
}

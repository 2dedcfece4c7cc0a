#![allow(dead_code)]

use dyncreds::db::{self, LeaseStorage, RoleStorage};
use dyncreds::service::{CredentialGenerator, UsernamePolicy};
use dyncreds::{ConnectionConfig, ConnectionRegistry, CredentialEngine, Role};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ACCOUNTS_DDL: &str = "CREATE TABLE IF NOT EXISTS accounts (name TEXT PRIMARY KEY, password TEXT NOT NULL, valid_until TEXT NOT NULL)";
pub const CREATE_ACCOUNT: &str = "INSERT INTO accounts (name, password, valid_until) VALUES ('{{name}}', '{{password}}', '{{expiration}}')";
pub const RENEW_ACCOUNT: &str =
    "UPDATE accounts SET valid_until = '{{expiration}}' WHERE name = '{{name}}'";
pub const REVOKE_ACCOUNT: &str = "DELETE FROM accounts WHERE name = '{{name}}'";
pub const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

static COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn temp_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "dyncreds-{tag}-{}-{}-{}.sqlite",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

pub fn target_config(name: &str, path: &PathBuf) -> ConnectionConfig {
    ConnectionConfig::new(name, format!("sqlite://{}?mode=rwc", path.display()))
        .with_max_open_connections(1)
        .with_statement_timeout(Duration::from_secs(30))
}

pub fn generator() -> CredentialGenerator {
    CredentialGenerator::new(
        UsernamePolicy::default(),
        32,
        Duration::from_secs(3600),
        Duration::from_secs(24 * 3600),
    )
    .expect("valid generator settings")
}

pub fn app_role() -> Role {
    Role {
        name: "app".to_string(),
        db_name: "primary".to_string(),
        creation_statements: vec![CREATE_ACCOUNT.to_string()],
        revocation_statements: vec![REVOKE_ACCOUNT.to_string()],
        renew_statements: vec![RENEW_ACCOUNT.to_string()],
        rollback_statements: vec![],
        default_ttl: Duration::from_secs(3600),
        max_ttl: Duration::from_secs(2 * 3600),
    }
}

/// Storage + one registered sqlite target named `primary` with an
/// `accounts` table, and the `app` role stored.
pub struct Harness {
    pub engine: CredentialEngine<RoleStorage>,
    pub roles: RoleStorage,
    pub leases: LeaseStorage,
    files: Vec<PathBuf>,
}

impl Harness {
    pub async fn new() -> Self {
        let store_path = temp_path("store");
        let pool = db::connect(&format!("sqlite:{}", store_path.display()))
            .await
            .expect("open storage");
        let roles = RoleStorage::new(pool.clone());
        let leases = LeaseStorage::new(pool);

        let engine = CredentialEngine::new(roles.clone(), ConnectionRegistry::new(), generator());
        let mut harness = Self {
            engine,
            roles,
            leases,
            files: vec![store_path],
        };
        harness.add_target("primary").await;
        harness
            .roles
            .upsert_role(&app_role())
            .await
            .expect("store app role");
        harness
    }

    /// Register a fresh sqlite database under `name` with an `accounts` table.
    pub async fn add_target(&mut self, name: &str) -> PathBuf {
        let path = temp_path(name);
        self.add_target_with(target_config(name, &path)).await;
        self.files.push(path.clone());
        path
    }

    pub async fn add_target_with(&self, config: ConnectionConfig) {
        let name = config.name.clone();
        self.engine
            .configure_connection(config)
            .await
            .expect("configure target connection");
        let conn = self.engine.registry().lookup(&name).await.expect("registered");
        sqlx::raw_sql(ACCOUNTS_DDL)
            .execute(conn.pool())
            .await
            .expect("create accounts table");
    }

    pub async fn account_count(&self, db: &str) -> i64 {
        let conn = self.engine.registry().lookup(db).await.expect("registered");
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(conn.pool())
            .await
            .expect("count accounts")
    }

    pub async fn table_exists(&self, db: &str, table: &str) -> bool {
        let conn = self.engine.registry().lookup(db).await.expect("registered");
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table.to_string())
        .fetch_one(conn.pool())
        .await
        .expect("query sqlite_master")
            > 0
    }

    /// Run a raw statement against a registered target.
    pub async fn exec(&self, db: &str, sql: &str) {
        let conn = self.engine.registry().lookup(db).await.expect("registered");
        sqlx::raw_sql(sql)
            .execute(conn.pool())
            .await
            .expect("execute statement");
    }

    /// `(password, valid_until)` for an account, if it exists.
    pub async fn account(&self, db: &str, name: &str) -> Option<(String, String)> {
        let conn = self.engine.registry().lookup(db).await.expect("registered");
        sqlx::query_as::<_, (String, String)>(
            "SELECT password, valid_until FROM accounts WHERE name = ?",
        )
        .bind(name.to_string())
        .fetch_optional(conn.pool())
        .await
        .expect("query account")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        for path in &self.files {
            let _ = fs::remove_file(path);
        }
    }
}

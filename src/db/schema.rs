//! SQL DDL for initializing role, connection and lease storage.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema with:
/// - `roles`: statement lists stored as JSON arrays in TEXT columns
/// - `connections`: one row per configured backing database
/// - `leases`: internal secret data keyed by lease id, expiration as RFC3339
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    name TEXT PRIMARY KEY,
    db_name TEXT NOT NULL,
    creation_statements TEXT NOT NULL, -- JSON array
    revocation_statements TEXT NOT NULL, -- JSON array
    renew_statements TEXT NOT NULL, -- JSON array
    rollback_statements TEXT NOT NULL, -- JSON array
    default_ttl_secs INTEGER NOT NULL DEFAULT 0,
    max_ttl_secs INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS connections (
    name TEXT PRIMARY KEY,
    connection_url TEXT NOT NULL,
    max_open_connections INTEGER NOT NULL,
    statement_timeout_ms INTEGER NOT NULL,
    verify_connection INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS leases (
    lease_id TEXT PRIMARY KEY,
    role TEXT NOT NULL,
    username TEXT NOT NULL,
    internal TEXT NOT NULL, -- JSON SecretInternal
    ttl_secs INTEGER NOT NULL,
    expiration TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_leases_role ON leases(role);
"#;

//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: role/connection storage and lease bookkeeping

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::DbLease;
pub use schema::SQLITE_INIT;
pub use sqlite::{LeaseStorage, RoleStorage, SqlitePool, connect};

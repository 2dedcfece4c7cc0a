pub mod config;
pub mod db;
pub mod error;
pub mod server;
pub mod service;
pub mod types;

pub use error::DbCredError;
pub use service::{ConnectionRegistry, CredentialEngine};
pub use types::{ConnectionConfig, Role, Secret, SecretInternal};

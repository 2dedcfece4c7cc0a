pub mod bootstrap;
pub mod connection;
pub mod credential_gen;
pub mod engine;
pub mod lease;
pub mod registry;
pub mod role_store;
pub mod template;

pub use connection::DatabaseConnection;
pub use credential_gen::{CredentialGenerator, UsernamePolicy};
pub use engine::CredentialEngine;
pub use lease::LeaseRegistrar;
pub use registry::{ConnectionGuard, ConnectionRegistry};
pub use role_store::RoleStore;

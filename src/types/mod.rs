pub mod connection;
pub mod duration_serde;
pub mod role;
pub mod secret;

pub use connection::ConnectionConfig;
pub use role::Role;
pub use secret::{CredentialData, LeaseRequest, LeasedSecret, Secret, SecretInternal};

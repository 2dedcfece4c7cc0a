use crate::types::duration_serde;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

fn default_max_open_connections() -> u32 {
    4
}

fn default_statement_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_verify_connection() -> bool {
    true
}

/// Everything needed to open a pool against one backing database.
///
/// The scheme of `connection_url` selects the driver (`postgres`, `mysql`,
/// `sqlite`).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub name: String,
    pub connection_url: String,
    #[serde(default = "default_max_open_connections")]
    pub max_open_connections: u32,
    #[serde(
        default = "default_statement_timeout",
        with = "duration_serde::millis"
    )]
    pub statement_timeout: Duration,
    #[serde(default = "default_verify_connection")]
    pub verify_connection: bool,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, connection_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_url: connection_url.into(),
            max_open_connections: default_max_open_connections(),
            statement_timeout: default_statement_timeout(),
            verify_connection: default_verify_connection(),
        }
    }

    pub fn with_max_open_connections(mut self, max: u32) -> Self {
        self.max_open_connections = max;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }

    /// Connection URL with any password replaced, safe for logs.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.connection_url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable>".to_string(),
        }
    }
}

// Custom Debug so the DSN password never reaches logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("connection_url", &self.redacted_url())
            .field("max_open_connections", &self.max_open_connections)
            .field("statement_timeout", &self.statement_timeout)
            .field("verify_connection", &self.verify_connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_in_url() {
        let cfg = ConnectionConfig::new("primary", "postgres://vault:hunter2@db:5432/app");
        let redacted = cfg.redacted_url();
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("vault:***@db"));
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: ConnectionConfig = serde_json::from_str(
            r#"{"name":"primary","connection_url":"sqlite:///tmp/x.sqlite"}"#,
        )
        .expect("valid config json");
        assert_eq!(cfg.max_open_connections, 4);
        assert_eq!(cfg.statement_timeout, Duration::from_secs(30));
        assert!(cfg.verify_connection);
    }
}

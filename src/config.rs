use crate::error::DbCredError;
use crate::service::credential_gen::{
    CredentialGenerator, DEFAULT_USERNAME_MAX_LEN, UsernamePolicy,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "DYNCREDS_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage for roles, connection configs and leases.
    pub database_url: String,
    pub listen_addr: String,
    pub api_key: String,
    pub loglevel: String,
    /// Directory of JSON connection/role definitions applied at startup.
    pub bootstrap_path: Option<PathBuf>,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub username_prefix: String,
    pub username_max_len: usize,
    pub password_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dyncreds.sqlite".to_string(),
            listen_addr: "0.0.0.0:8200".to_string(),
            api_key: "change-me".to_string(),
            loglevel: "info".to_string(),
            bootstrap_path: None,
            default_ttl_secs: 3600,
            max_ttl_secs: 24 * 3600,
            username_prefix: "v".to_string(),
            username_max_len: DEFAULT_USERNAME_MAX_LEN,
            password_len: 32,
        }
    }
}

impl Config {
    /// Defaults, then `config.toml` if present, then `DYNCREDS_*` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    pub fn generator(&self) -> Result<CredentialGenerator, DbCredError> {
        let policy = UsernamePolicy::new(&self.username_prefix, self.username_max_len)?;
        CredentialGenerator::new(policy, self.password_len, self.default_ttl(), self.max_ttl())
    }
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: failed to load configuration"));

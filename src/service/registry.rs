//! Shared map of logical database name to live connection.
//!
//! Lookups take the read side of a `tokio::sync::RwLock` and hand back an
//! owned guard mapped onto the single entry. The guard keeps the read lock
//! until it is dropped, so `put`/`remove` cannot tear down a handle that is
//! still in use. New lookups queue behind a pending writer.

use crate::service::connection::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::info;

type ConnectionMap = HashMap<String, DatabaseConnection>;

/// Scoped borrow of one registered connection.
pub type ConnectionGuard = OwnedRwLockReadGuard<ConnectionMap, DatabaseConnection>;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<ConnectionMap>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, name: &str) -> Option<ConnectionGuard> {
        let map = self.inner.clone().read_owned().await;
        OwnedRwLockReadGuard::try_map(map, |m| m.get(name)).ok()
    }

    /// Register `conn` under `name`, closing whatever it replaces.
    pub async fn put(&self, name: impl Into<String>, conn: DatabaseConnection) {
        let name = name.into();
        let mut map = self.inner.write().await;
        if let Some(old) = map.insert(name.clone(), conn) {
            old.close().await;
            info!(db = %name, "replaced database connection");
        }
    }

    /// Close and unregister `name`. Returns false if nothing was registered.
    pub async fn remove(&self, name: &str) -> bool {
        let mut map = self.inner.write().await;
        let Some(conn) = map.get(name) else {
            return false;
        };
        conn.close().await;
        map.remove(name);
        info!(db = %name, "removed database connection");
        true
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

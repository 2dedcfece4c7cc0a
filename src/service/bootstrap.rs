use crate::error::DbCredError;
use crate::types::{ConnectionConfig, Role};
use serde::Deserialize;
use serde_json::Value;
use std::{fs, path::Path};
use tracing::{info, warn};

/// One definition in a bootstrap file.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BootstrapEntry {
    Connection(ConnectionConfig),
    Role(Role),
}

/// Connections and roles discovered on disk, to be written to storage at startup.
#[derive(Debug, Default)]
pub struct Bootstrap {
    pub connections: Vec<ConnectionConfig>,
    pub roles: Vec<Role>,
}

impl Bootstrap {
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.roles.is_empty()
    }

    fn push(&mut self, entry: BootstrapEntry) {
        match entry {
            BootstrapEntry::Connection(c) => self.connections.push(c),
            BootstrapEntry::Role(r) => self.roles.push(r),
        }
    }
}

/// Load every `*.json` file in `dir`. A file holds one entry or an array of
/// entries, each tagged with `"kind": "connection" | "role"`. Unreadable
/// files are logged and skipped.
pub fn load_from_dir(dir: &Path) -> Result<Bootstrap, DbCredError> {
    let mut loaded = Bootstrap::default();
    if !dir.exists() {
        info!(path = %dir.display(), "bootstrap directory not found; skipping load");
        return Ok(loaded);
    }

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "failed to read bootstrap dir entry");
                None
            }
        })
        .filter(|path| is_json_file(path))
        .collect();
    paths.sort();

    for path in paths {
        match load_entries(&path) {
            Ok(entries) => entries.into_iter().for_each(|e| loaded.push(e)),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load bootstrap file"),
        }
    }

    Ok(loaded)
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        == Some(true)
}

fn load_entries(path: &Path) -> Result<Vec<BootstrapEntry>, DbCredError> {
    let contents = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents)?;
    let entries = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn loads_single_and_array_files() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut dir = std::env::temp_dir();
        dir.push(format!("dyncreds-bootstrap-{}-{}", std::process::id(), nanos));
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("a.json"),
            r#"{"kind":"connection","name":"primary","connection_url":"postgres://u:p@h/db","statement_timeout":5000}"#,
        )
        .unwrap();
        fs::write(
            dir.join("b.json"),
            r#"[{"kind":"role","name":"app","db_name":"primary","creation_statements":["CREATE ROLE \"{{name}}\""],"revocation_statements":["DROP ROLE \"{{name}}\""],"default_ttl":3600,"max_ttl":86400}]"#,
        )
        .unwrap();
        fs::write(dir.join("ignored.txt"), "not json").unwrap();
        fs::write(dir.join("broken.json"), "{").unwrap();

        let loaded = load_from_dir(&dir).unwrap();
        assert_eq!(loaded.connections.len(), 1);
        assert_eq!(loaded.connections[0].statement_timeout, Duration::from_secs(5));
        assert_eq!(loaded.roles.len(), 1);
        assert_eq!(loaded.roles[0].default_ttl, Duration::from_secs(3600));

        let _ = fs::remove_dir_all(&dir);
    }
}

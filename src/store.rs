use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Tiny persisted key-value store standing in for the browser's
/// localStorage: a JSON object in one file, written through on every set.
pub struct LocalStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|body| serde_json::from_str(&body).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        match serde_json::to_string_pretty(&self.values) {
            Ok(body) => {
                if let Err(error) = fs::write(&self.path, body) {
                    tracing::warn!(%error, path = %self.path.display(), "failed to persist local store");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to encode local store"),
        }
    }
}

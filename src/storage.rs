// Key-value configuration and session stores

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Narrow key→JSON-blob contract the rest of the crate is written
/// against. Consumers receive a store as a parameter; nothing reaches
/// into ambient global state.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    /// Revision channel: the value ticks on every successful `set`.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// In-memory store for tests and ephemeral sessions.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    revision: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
            revision,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value);
        self.revision.send_modify(|rev| *rev += 1);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

/// File-backed store: the whole key space is one JSON object on disk,
/// rewritten on every `set`. Small configuration blobs only.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
    revision: watch::Sender<u64>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        let (revision, _) = watch::channel(0);
        Ok(JsonFileStore {
            path,
            entries: Mutex::new(entries),
            revision,
        })
    }

    /// Platform data directory, `~/.local/share/multichat/store.json` on
    /// Linux.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multichat")
            .join("store.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value);
        self.persist(&entries)?;
        self.revision.send_modify(|rev| *rev += 1);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join("multichat-tests")
            .join(format!("{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn memory_store_round_trips_and_notifies() {
        let store = MemoryStore::new();
        let mut revisions = store.subscribe();

        assert!(store.get("missing").is_none());
        store.set("api-keys", json!({ "openai": "sk-1" })).unwrap();
        assert_eq!(store.get("api-keys").unwrap()["openai"], "sk-1");

        assert!(revisions.has_changed().unwrap());
        revisions.mark_unchanged();
        store.set("api-keys", json!({})).unwrap();
        assert!(revisions.has_changed().unwrap());
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_store_path();
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(store.path(), path);
            store.set("sessions", json!([1, 2, 3])).unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("sessions").unwrap(), json!([1, 2, 3]));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn default_path_lands_in_the_app_data_dir() {
        let path = JsonFileStore::default_path();
        assert!(path.ends_with("multichat/store.json"));
    }

    #[test]
    fn corrupt_file_degrades_to_an_empty_store() {
        let path = temp_store_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json at all").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("anything").is_none());
        std::fs::remove_file(&path).ok();
    }
}

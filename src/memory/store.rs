//! Flat key/value memory store backed by `memory.json`.
//!
//! This gateway's memory tool has no recall query, only exact keys: an
//! `Arc`-shared handle guards the backing state with a lock,
//! read-modify-write runs on every mutation, and the whole map persists to
//! a single file under the storage directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tokio::sync::Mutex;

/// Key/value memory backed by a single JSON file.
pub struct MemoryStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Load `path` if it exists, starting empty otherwise.
    pub async fn load(path: PathBuf) -> std::io::Result<Self> {
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(entries).unwrap_or_else(|_| "{}".to_string());
        tokio::fs::write(&self.path, raw).await
    }

    pub async fn read(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn write(&self, key: &str, value: Value) -> std::io::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    pub async fn list(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Returns whether `key` was present.
    pub async fn delete(&self, key: &str) -> std::io::Result<bool> {
        let mut entries = self.entries.lock().await;
        let existed = entries.remove(key).is_some();
        if existed {
            self.persist(&entries).await?;
        }
        Ok(existed)
    }
}

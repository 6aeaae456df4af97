//! In-process metric store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MetricStore, VersionedValue};

/// Versioned map guarded by an async `RwLock`.
///
/// Each instance is private; share it through an `Arc` to let several stages
/// merge into the same keys.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<String, VersionedValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store labelled `name` in logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn exists(&self, key: &str) -> crate::Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> crate::Result<Option<VersionedValue>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> crate::Result<u64> {
        let mut entries = self.entries.write().await;
        let version = entries.get(key).map_or(1, |entry| entry.version + 1);
        entries.insert(
            key.to_string(),
            VersionedValue {
                value: value.to_string(),
                version,
            },
        );
        Ok(version)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> crate::Result<bool> {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).map(|entry| entry.version);
        if current != expected {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            VersionedValue {
                value: value.to_string(),
                version: current.map_or(1, |version| version + 1),
            },
        );
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }
}

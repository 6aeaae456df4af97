//! Read-merge-write of metric snapshots into a shared store key.
//!
//! Every worker of a job flushes its own deltas into the same key. The merge
//! reads the stored snapshot and its version, adds the local counters, and
//! writes back with compare-and-set. A concurrent writer makes the write fail
//! and the whole cycle is retried, so no contribution is lost to a
//! last-writer-wins overwrite.

use async_trait::async_trait;
use std::sync::Arc;

use crate::codec::{decode_snapshot, encode_snapshot};
use crate::config::{DEFAULT_MAX_MERGE_ATTEMPTS, StoreConfig};
use crate::error::QualityError;
use crate::metrics::MetricsSnapshot;
use crate::reporter::MetricsReporter;
use crate::store::{MetricStore, open_store};

/// How a successful merge landed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The key was absent and now holds the local snapshot
    Created,
    /// The local snapshot was added into the stored one
    Merged,
}

/// Merges local snapshots into one key of a [`MetricStore`].
#[derive(Clone)]
pub struct MergeClient {
    store: Arc<dyn MetricStore>,
    key: String,
    max_attempts: u32,
}

impl std::fmt::Debug for MergeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeClient")
            .field("store", &self.store.describe())
            .field("key", &self.key)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl MergeClient {
    /// Creates a client over an open store.
    pub fn new(store: Arc<dyn MetricStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            max_attempts: DEFAULT_MAX_MERGE_ATTEMPTS,
        }
    }

    /// Opens the configured store and creates a client for its key.
    ///
    /// # Errors
    /// Returns an error if the store URL is unsupported or cannot be opened.
    pub async fn from_config(config: &StoreConfig) -> crate::Result<Self> {
        config.validate()?;
        let store = open_store(&config.url).await?;
        Ok(Self::new(store, config.key.clone()).with_max_attempts(config.max_merge_attempts))
    }

    /// Builder method to set the compare-and-set attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Reads and decodes the merged snapshot, if any.
    ///
    /// # Errors
    /// Returns a merge error on store failure, or a schema mismatch if the
    /// stored value is not a snapshot.
    pub async fn remote_snapshot(&self) -> crate::Result<Option<MetricsSnapshot>> {
        self.store
            .get(&self.key)
            .await?
            .map(|stored| decode_snapshot(&stored.value))
            .transpose()
    }

    /// Folds `local` into the stored snapshot.
    ///
    /// # Errors
    /// - `QualityError::SchemaMismatch` if the stored tree has different rules
    ///   or fields; not retried
    /// - `QualityError::MergeIo` on store failure, or when every attempt lost
    ///   a compare-and-set race
    pub async fn merge(&self, local: &MetricsSnapshot) -> crate::Result<MergeOutcome> {
        for attempt in 1..=self.max_attempts {
            let outcome = match self.store.get(&self.key).await? {
                None => {
                    let encoded = encode_snapshot(local)?;
                    self.store
                        .compare_and_set(&self.key, None, &encoded)
                        .await?
                        .then_some(MergeOutcome::Created)
                }
                Some(stored) => {
                    let mut remote = decode_snapshot(&stored.value)?;
                    remote.merge_add(local)?;
                    let encoded = encode_snapshot(&remote)?;
                    self.store
                        .compare_and_set(&self.key, Some(stored.version), &encoded)
                        .await?
                        .then_some(MergeOutcome::Merged)
                }
            };

            if let Some(outcome) = outcome {
                tracing::debug!(
                    "Merged snapshot into '{}' ({:?}, attempt {})",
                    self.key,
                    outcome,
                    attempt
                );
                return Ok(outcome);
            }

            tracing::debug!(
                "Concurrent write on '{}', retrying merge (attempt {}/{})",
                self.key,
                attempt,
                self.max_attempts
            );
        }

        Err(QualityError::merge(format!(
            "Gave up merging into '{}' after {} conflicting attempts",
            self.key, self.max_attempts
        )))
    }
}

#[async_trait]
impl MetricsReporter for MergeClient {
    async fn report(&self, snapshot: &MetricsSnapshot) -> crate::Result<()> {
        self.merge(snapshot).await.map(|_| ())
    }

    async fn close(&self) {
        self.store.close().await;
    }

    fn describe(&self) -> String {
        format!("{} key '{}'", self.store.describe(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CounterSnapshot, FieldSnapshot};
    use crate::store::{MemoryStore, VersionedValue};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn snapshot(table: (u64, u64, u64)) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            table: CounterSnapshot::new(table.0, table.1, table.2),
            ..Default::default()
        };
        snapshot.row.entry("r1".to_string()).or_default().insert(
            "email".to_string(),
            FieldSnapshot {
                rule_name: "r1".to_string(),
                field_label_id: None,
                counts: CounterSnapshot::new(table.0, table.1, table.2),
            },
        );
        snapshot
    }

    /// Store whose first `conflicts` compare-and-set calls lose the race.
    struct ContendedStore {
        inner: MemoryStore,
        conflicts: AtomicU32,
    }

    #[async_trait]
    impl MetricStore for ContendedStore {
        async fn exists(&self, key: &str) -> crate::Result<bool> {
            self.inner.exists(key).await
        }

        async fn get(&self, key: &str) -> crate::Result<Option<VersionedValue>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> crate::Result<u64> {
            self.inner.set(key, value).await
        }

        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<u64>,
            value: &str,
        ) -> crate::Result<bool> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.compare_and_set(key, expected, value).await
        }

        fn describe(&self) -> String {
            "contended".to_string()
        }
    }

    #[tokio::test]
    async fn test_merge_into_absent_key() {
        let client = MergeClient::new(Arc::new(MemoryStore::new()), "quality:job");
        let local = snapshot((3, 2, 1));

        assert_eq!(client.merge(&local).await.unwrap(), MergeOutcome::Created);
        assert_eq!(client.remote_snapshot().await.unwrap(), Some(local));
    }

    #[tokio::test]
    async fn test_merge_into_existing_key() {
        let client = MergeClient::new(Arc::new(MemoryStore::new()), "quality:job");
        client.merge(&snapshot((3, 2, 1))).await.unwrap();

        assert_eq!(
            client.merge(&snapshot((4, 4, 0))).await.unwrap(),
            MergeOutcome::Merged
        );
        let remote = client.remote_snapshot().await.unwrap().unwrap();
        assert_eq!(remote.table, CounterSnapshot::new(7, 6, 1));
        assert_eq!(
            remote.field("r1", "email"),
            Some(&CounterSnapshot::new(7, 6, 1))
        );
    }

    #[tokio::test]
    async fn test_merge_retries_lost_races() {
        let store = Arc::new(ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(2),
        });
        let client = MergeClient::new(store, "k").with_max_attempts(3);

        assert!(client.merge(&snapshot((1, 1, 0))).await.is_ok());
    }

    #[tokio::test]
    async fn test_merge_gives_up_after_budget() {
        let store = Arc::new(ContendedStore {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(10),
        });
        let client = MergeClient::new(store, "k").with_max_attempts(3);

        let err = client.merge(&snapshot((1, 1, 0))).await.unwrap_err();
        assert!(matches!(err, QualityError::MergeIo { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_merge_rejects_foreign_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", "{\"row\": {\"other\": {}}}").await.unwrap();
        let client = MergeClient::new(store.clone(), "k");

        let err = client.merge(&snapshot((1, 1, 0))).await.unwrap_err();
        assert!(matches!(err, QualityError::SchemaMismatch { .. }));
        // the stored value is untouched
        assert_eq!(store.get("k").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_from_config_opens_store() {
        let config = StoreConfig::new("memory://merge-test", "quality:k").with_max_merge_attempts(2);
        let client = MergeClient::from_config(&config).await.unwrap();
        assert_eq!(client.key(), "quality:k");
        assert!(client.describe().contains("memory://merge-test"));
    }
}

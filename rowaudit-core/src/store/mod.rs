//! Shared metric stores.
//!
//! A store holds one serialized snapshot per key together with a version
//! token. Writers use [`MetricStore::compare_and_set`] so that two flushes
//! racing on the same key cannot overwrite each other's contribution.
//!
//! # Backends
//! - `memory://<name>`: process-local map, mainly for tests and dry runs
//! - `sqlite:<path>` / `sqlite::memory:`: SQLite table via `sqlx`
//!   (feature `sqlite`, enabled by default)

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{QualityError, redact_url};

/// A stored value and the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

/// Key/value store holding merged metric snapshots.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Returns whether `key` holds a value.
    async fn exists(&self, key: &str) -> crate::Result<bool>;

    /// Reads the value and version stored under `key`.
    async fn get(&self, key: &str) -> crate::Result<Option<VersionedValue>>;

    /// Unconditionally writes `value`, returning the new version.
    async fn set(&self, key: &str, value: &str) -> crate::Result<u64>;

    /// Writes `value` only if the stored version equals `expected`.
    ///
    /// `expected = None` means the key must not exist yet. Returns `false`
    /// when another writer got there first.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> crate::Result<bool>;

    /// Releases connections. Further calls may fail.
    async fn close(&self) {}

    /// Store location with credentials redacted, for logs.
    fn describe(&self) -> String;
}

/// Opens the store addressed by `url`.
///
/// # Errors
/// Returns a configuration error for an unsupported scheme, or a merge error
/// when the backend cannot be opened.
pub async fn open_store(url: &str) -> crate::Result<Arc<dyn MetricStore>> {
    if let Some(name) = url.strip_prefix("memory://") {
        return Ok(Arc::new(MemoryStore::named(name)));
    }

    if url.starts_with("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            return Ok(Arc::new(SqliteStore::connect(url).await?));
        }
        #[cfg(not(feature = "sqlite"))]
        {
            return Err(QualityError::configuration(
                "SQLite metric store support is not compiled in; enable the 'sqlite' feature",
            ));
        }
    }

    Err(QualityError::configuration(format!(
        "Unsupported metric store URL '{}': expected memory:// or sqlite:",
        redact_url(url)
    )))
}

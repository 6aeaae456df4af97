//! SQLite-backed metric store.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/metrics.db` or `sqlite://./metrics.db`
//! - In-memory: `sqlite::memory:` (single connection, lives as long as the store)
//!
//! Snapshots live in one table:
//!
//! ```sql
//! CREATE TABLE rowaudit_metrics (key TEXT PRIMARY KEY, value TEXT NOT NULL, version INTEGER NOT NULL)
//! ```

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use super::{MetricStore, VersionedValue};
use crate::error::{QualityError, redact_url};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS rowaudit_metrics (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    version INTEGER NOT NULL
)";

/// Default pool size for file-based stores
const FILE_POOL_SIZE: u32 = 4;

/// Metric store over a SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
    url: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("url", &redact_url(&self.url))
            .field("is_in_memory", &self.is_in_memory())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database and its metrics table.
    ///
    /// # Errors
    /// Returns a configuration error for a malformed URL, or a merge error if
    /// the database cannot be opened or initialized.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                QualityError::configuration(format!(
                    "Invalid SQLite store URL '{}': {}",
                    redact_url(url),
                    e
                ))
            })?
            .create_if_missing(true);

        let in_memory = is_in_memory_url(url);
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { FILE_POOL_SIZE })
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            // an in-memory database disappears with its last connection
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| QualityError::merge_failed("Failed to open SQLite metric store", e))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| QualityError::merge_failed("Failed to create metrics table", e))?;

        tracing::debug!("Opened SQLite metric store {}", redact_url(url));

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Checks if the store lives in memory.
    pub fn is_in_memory(&self) -> bool {
        is_in_memory_url(&self.url)
    }
}

fn is_in_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn to_version(raw: i64) -> crate::Result<u64> {
    u64::try_from(raw).map_err(|_| QualityError::merge(format!("Stored version {} is negative", raw)))
}

fn from_version(version: u64) -> crate::Result<i64> {
    i64::try_from(version)
        .map_err(|_| QualityError::merge(format!("Version {} exceeds SQLite INTEGER range", version)))
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn exists(&self, key: &str) -> crate::Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rowaudit_metrics WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QualityError::merge_failed(format!("Failed to check key '{}'", key), e))?;
        Ok(count > 0)
    }

    async fn get(&self, key: &str) -> crate::Result<Option<VersionedValue>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, version FROM rowaudit_metrics WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| QualityError::merge_failed(format!("Failed to read key '{}'", key), e))?;

        row.map(|(value, version)| {
            Ok(VersionedValue {
                value,
                version: to_version(version)?,
            })
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> crate::Result<u64> {
        let version: i64 = sqlx::query_scalar(
            "INSERT INTO rowaudit_metrics (key, value, version) VALUES (?, ?, 1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, version = rowaudit_metrics.version + 1
             RETURNING version",
        )
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QualityError::merge_failed(format!("Failed to write key '{}'", key), e))?;

        to_version(version)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> crate::Result<bool> {
        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO rowaudit_metrics (key, value, version) VALUES (?, ?, 1)
                     ON CONFLICT(key) DO NOTHING",
                )
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
            }
            Some(version) => {
                sqlx::query(
                    "UPDATE rowaudit_metrics SET value = ?, version = version + 1
                     WHERE key = ? AND version = ?",
                )
                .bind(value)
                .bind(key)
                .bind(from_version(version)?)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| QualityError::merge_failed(format!("Failed to write key '{}'", key), e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn describe(&self) -> String {
        redact_url(&self.url)
    }
}

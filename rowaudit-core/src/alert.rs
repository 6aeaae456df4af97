//! Dirty-data alerting.
//!
//! Each stage instance owns one [`DirtyThreshold`]. When its running count of
//! dirty rows reaches the configured limit the stage hands an
//! [`AlertContext`] to its [`AlertDispatcher`], exactly once. The threshold is
//! per instance: parallel workers of the same job each alert on their own
//! count.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::StageIdentity;
use crate::error::{QualityError, redact_url};

/// Identity carried by a dirty-data notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertContext {
    /// Job creator, the notice recipient
    pub create_by: String,
    pub model_name: String,
    pub resource: String,
}

impl From<&StageIdentity> for AlertContext {
    fn from(identity: &StageIdentity) -> Self {
        Self {
            create_by: identity.create_by.clone(),
            model_name: identity.model_name.clone(),
            resource: identity.resource.clone(),
        }
    }
}

/// Best-effort notification channel.
///
/// `notify` is called from the row path and must not block; implementations
/// hand work off and swallow their own failures.
pub trait AlertDispatcher: Send + Sync {
    fn notify(&self, context: &AlertContext);
}

fn log_breach(context: &AlertContext) {
    tracing::error!(
        "Dirty data limit reached for model '{}' on resource '{}' (owner {})",
        context.model_name,
        context.resource,
        context.create_by
    );
}

/// Dispatcher that only logs the breach.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertDispatcher;

impl AlertDispatcher for LogAlertDispatcher {
    fn notify(&self, context: &AlertContext) {
        log_breach(context);
    }
}

/// Posts a form to the warning endpoint on a background task.
#[derive(Clone)]
pub struct HttpAlertDispatcher {
    client: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for HttpAlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAlertDispatcher")
            .field("url", &redact_url(&self.url))
            .finish_non_exhaustive()
    }
}

impl HttpAlertDispatcher {
    /// Creates a dispatcher for `url`.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                QualityError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Sends one notice and waits for the response.
    ///
    /// # Errors
    /// Returns `QualityError::AlertDelivery` on transport failure or a non-2xx
    /// response.
    pub async fn send(&self, context: &AlertContext) -> crate::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .form(context)
            .send()
            .await
            .map_err(|e| {
                QualityError::alert_failed(
                    format!("Failed to reach warning endpoint {}", redact_url(&self.url)),
                    e,
                )
            })?;

        response.error_for_status().map_err(|e| {
            QualityError::alert_failed(
                format!("Warning endpoint {} rejected notice", redact_url(&self.url)),
                e,
            )
        })?;
        Ok(())
    }
}

impl AlertDispatcher for HttpAlertDispatcher {
    fn notify(&self, context: &AlertContext) {
        log_breach(context);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "No async runtime available; dirty data notice to {} dropped",
                redact_url(&self.url)
            );
            return;
        };

        let dispatcher = self.clone();
        let context = context.clone();
        runtime.spawn(async move {
            if let Err(e) = dispatcher.send(&context).await {
                tracing::warn!("Dirty data notice not delivered: {}", e);
            }
        });
    }
}

/// One-shot dirty-row threshold.
#[derive(Debug, Default)]
pub struct DirtyThreshold {
    limit: u64,
    count: AtomicU64,
    fired: AtomicBool,
}

impl DirtyThreshold {
    /// Creates a threshold; a limit of 0 never fires.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            count: AtomicU64::new(0),
            fired: AtomicBool::new(false),
        }
    }

    /// Counts one dirty row. Returns `true` for the single call whose
    /// increment makes the count reach the limit.
    pub fn record_dirty(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.limit > 0 && count == self.limit && !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Dirty rows counted since the stage opened.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

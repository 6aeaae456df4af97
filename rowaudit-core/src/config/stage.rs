//! Stage configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::rules::{RuleInfo, RuleInfos, deserialize_rule_infos};
use super::store::StoreConfig;
use crate::error::QualityError;

/// Default period between streaming flushes.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 10;

/// Longest accepted period between streaming flushes (one day).
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 86_400;

/// Execution mode of the surrounding job.
///
/// Any mode name other than `batch` is treated as streaming, matching how
/// job schedulers name their unbounded modes (`streaming`, `STREAMING`, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobMode {
    /// Bounded input: metrics are flushed once, at close
    Batch,
    /// Unbounded input: metrics are flushed periodically and at close
    Streaming,
}

impl From<String> for JobMode {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("batch") {
            JobMode::Batch
        } else {
            JobMode::Streaming
        }
    }
}

impl From<JobMode> for String {
    fn from(value: JobMode) -> Self {
        value.as_str().to_string()
    }
}

impl JobMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Batch => "batch",
            JobMode::Streaming => "streaming",
        }
    }

    /// True when periodic flushing applies.
    pub fn is_streaming(&self) -> bool {
        matches!(self, JobMode::Streaming)
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform identity of the stage, carried in metric reports and alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIdentity {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub ds_id: String,
    #[serde(default)]
    pub ds_name: String,
    /// Table, topic or collection being checked
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub resource_comment: String,
    #[serde(default)]
    pub dept_id: String,
    #[serde(default)]
    pub dept_name: String,
    #[serde(default)]
    pub tenant_id: String,
    /// Creator of the job; alert recipient
    #[serde(default)]
    pub create_by: String,
}

/// Fully-resolved configuration of one quality stage.
///
/// # Example
/// ```rust
/// use rowaudit_core::config::{JobMode, RuleInfo, StageConfig, StoreConfig};
///
/// let config = StageConfig::new(JobMode::Batch)
///     .with_rule("r1", RuleInfo::new("regex", "notEmpty", ["email"]))
///     .with_metric_store(StoreConfig::new("memory://quality", "quality:job-1"))
///     .with_dirty_data_limit(3);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Rules keyed by rule id
    #[serde(deserialize_with = "deserialize_rule_infos")]
    pub rule_info: RuleInfos,
    /// Append the `check_result` verdict column
    #[serde(default)]
    pub open: bool,
    /// Dirty rows that trigger the one-shot alert; 0 disables alerting
    #[serde(default)]
    pub dirty_data_limit: u64,
    /// Platform identity
    #[serde(flatten)]
    pub identity: StageIdentity,
    /// Batch or streaming
    pub job_mode: JobMode,
    /// Preview runs neither alert nor report final metrics
    #[serde(default)]
    pub preview: bool,
    /// HTTP endpoint receiving metric reports
    #[serde(default)]
    pub metric_api: Option<String>,
    /// HTTP endpoint receiving dirty-data notices
    #[serde(default)]
    pub warning_api: Option<String>,
    /// Shared store receiving merged snapshots
    #[serde(default)]
    pub metric_store: Option<StoreConfig>,
    /// Period between streaming flushes
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_flush_interval_secs() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

impl StageConfig {
    /// Creates an empty configuration for the given job mode.
    pub fn new(job_mode: JobMode) -> Self {
        Self {
            rule_info: RuleInfos::new(),
            open: false,
            dirty_data_limit: 0,
            identity: StageIdentity::default(),
            job_mode,
            preview: false,
            metric_api: None,
            warning_api: None,
            metric_store: None,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    /// Returns a configuration error when the document does not deserialize.
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            QualityError::configuration(format!("Invalid stage configuration: {}", e))
        })
    }

    /// Builder method to add a rule.
    pub fn with_rule(mut self, rule_id: impl Into<String>, rule: RuleInfo) -> Self {
        self.rule_info.insert(rule_id.into(), rule);
        self
    }

    /// Builder method to enable or disable the verdict column.
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// Builder method to set the dirty-data limit.
    pub fn with_dirty_data_limit(mut self, limit: u64) -> Self {
        self.dirty_data_limit = limit;
        self
    }

    /// Builder method to set the platform identity.
    pub fn with_identity(mut self, identity: StageIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Builder method to mark the run as a preview.
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Builder method to set the metric endpoint.
    pub fn with_metric_api(mut self, url: impl Into<String>) -> Self {
        self.metric_api = Some(url.into());
        self
    }

    /// Builder method to set the alert endpoint.
    pub fn with_warning_api(mut self, url: impl Into<String>) -> Self {
        self.warning_api = Some(url.into());
        self
    }

    /// Builder method to set the shared metric store.
    pub fn with_metric_store(mut self, store: StoreConfig) -> Self {
        self.metric_store = Some(store);
        self
    }

    /// Builder method to set the flush period in seconds.
    pub fn with_flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    /// Flush period as a duration.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Alerting is active when a limit is set and the run is not a preview.
    pub fn alerting_enabled(&self) -> bool {
        self.dirty_data_limit > 0 && !self.preview
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error if:
    /// - `rule_info` is empty, or a rule has no type, code or columns
    /// - no flush target is configured for a non-preview run
    /// - both `metric_api` and `metric_store` are configured
    /// - an endpoint URL does not parse
    /// - `flush_interval_secs` is zero or above [`MAX_FLUSH_INTERVAL_SECS`]
    ///   for a streaming job
    pub fn validate(&self) -> crate::Result<()> {
        if self.rule_info.is_empty() {
            return Err(QualityError::configuration(
                "rule_info must contain at least one rule",
            ));
        }

        for (rule_id, rule) in &self.rule_info {
            if rule.rule_type.trim().is_empty() || rule.rule_code.trim().is_empty() {
                return Err(QualityError::configuration(format!(
                    "rule '{}' must define ruleType and ruleCode",
                    rule_id
                )));
            }
            if rule.column_names.is_empty() {
                return Err(QualityError::configuration(format!(
                    "rule '{}' must target at least one column",
                    rule_id
                )));
            }
        }

        match (&self.metric_api, &self.metric_store) {
            (Some(_), Some(_)) => {
                return Err(QualityError::configuration(
                    "metric_api and metric_store are mutually exclusive",
                ));
            }
            (None, None) if !self.preview => {
                return Err(QualityError::configuration(
                    "either metric_api or metric_store is required",
                ));
            }
            _ => {}
        }

        if let Some(api) = &self.metric_api {
            validate_endpoint("metric_api", api)?;
        }
        if let Some(api) = &self.warning_api {
            validate_endpoint("warning_api", api)?;
        }
        if let Some(store) = &self.metric_store {
            store.validate()?;
        }

        if self.job_mode.is_streaming() && self.flush_interval_secs == 0 {
            return Err(QualityError::configuration(
                "flush_interval_secs must be greater than 0 for streaming jobs",
            ));
        }
        if self.job_mode.is_streaming() && self.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS {
            return Err(QualityError::configuration(format!(
                "flush_interval_secs must not exceed {} for streaming jobs",
                MAX_FLUSH_INTERVAL_SECS
            )));
        }

        if self.alerting_enabled() && self.warning_api.is_none() {
            tracing::warn!(
                "dirty_data_limit is {} but no warning_api is configured; alerts will only be logged",
                self.dirty_data_limit
            );
        }

        Ok(())
    }
}

fn validate_endpoint(option: &str, url: &str) -> crate::Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| {
        QualityError::configuration(format!(
            "{} is not a valid URL ({}): {}",
            option,
            crate::error::redact_url(url),
            e
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(QualityError::configuration(format!(
            "{} must use http or https, got '{}'",
            option,
            parsed.scheme()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> StageConfig {
        StageConfig::new(JobMode::Streaming)
            .with_rule("r1", RuleInfo::new("regex", "notEmpty", ["email"]))
            .with_metric_store(StoreConfig::new("memory://q", "quality:1"))
    }

    #[test]
    fn test_job_mode_parsing() {
        assert_eq!(JobMode::from("batch".to_string()), JobMode::Batch);
        assert_eq!(JobMode::from("BATCH".to_string()), JobMode::Batch);
        assert_eq!(JobMode::from("streaming".to_string()), JobMode::Streaming);
        assert_eq!(JobMode::from("STREAMING".to_string()), JobMode::Streaming);
        assert!(JobMode::Streaming.is_streaming());
        assert!(!JobMode::Batch.is_streaming());
    }

    #[test]
    fn test_stage_config_from_platform_document() {
        let doc = json!({
            "rule_info": "{\"r1\":{\"ruleType\":\"regex\",\"ruleCode\":\"notEmpty\",\"columnNames\":[\"email\"]}}",
            "open": true,
            "dirty_data_limit": 3,
            "model_id": "m-1",
            "model_name": "customers",
            "resource": "crm.customers",
            "create_by": "u-42",
            "job_mode": "STREAMING",
            "metric_api": "http://metrics.local/api/quality",
            "warning_api": "http://metrics.local/api/warning"
        });

        let config = StageConfig::from_json_str(&doc.to_string()).unwrap();
        assert!(config.open);
        assert_eq!(config.dirty_data_limit, 3);
        assert_eq!(config.identity.model_name, "customers");
        assert_eq!(config.identity.create_by, "u-42");
        assert_eq!(config.job_mode, JobMode::Streaming);
        assert_eq!(config.flush_interval_secs, DEFAULT_FLUSH_INTERVAL_SECS);
        assert!(config.validate().is_ok());
        assert!(config.alerting_enabled());
    }

    #[test]
    fn test_validate_requires_rules() {
        let config = StageConfig::new(JobMode::Batch)
            .with_metric_store(StoreConfig::new("memory://q", "k"));
        assert!(matches!(
            config.validate(),
            Err(QualityError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rule_without_columns() {
        let config = base().with_rule("r2", RuleInfo::new("regex", "email", Vec::<String>::new()));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("r2"));
    }

    #[test]
    fn test_validate_flush_target() {
        let mut config = base();
        config.metric_store = None;
        assert!(config.validate().is_err());

        // preview runs never report, so they need no target
        assert!(config.clone().with_preview(true).validate().is_ok());

        let both = base().with_metric_api("http://metrics.local/q");
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_validate_endpoint_urls() {
        let mut config = base().with_warning_api("ftp://alerts.local");
        assert!(config.validate().is_err());

        config.warning_api = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.warning_api = Some("https://alerts.local/notice".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_flush_interval() {
        let config = base().with_flush_interval_secs(0);
        assert!(config.validate().is_err());
        assert!(base().with_flush_interval_secs(u64::MAX).validate().is_err());
        assert!(
            base()
                .with_flush_interval_secs(MAX_FLUSH_INTERVAL_SECS)
                .validate()
                .is_ok()
        );

        // batch jobs never schedule a timer
        let mut batch = config.clone();
        batch.job_mode = JobMode::Batch;
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn test_alerting_disabled_in_preview() {
        let config = base().with_dirty_data_limit(5).with_preview(true);
        assert!(!config.alerting_enabled());
        assert!(!base().alerting_enabled());
    }
}

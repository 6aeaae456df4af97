//! The quality stage: one instance per pipeline worker.
//!
//! A stage owns its rule set, metric tree, dirty-data threshold and flush
//! scheduler. Nothing is shared between instances; parallel workers of the
//! same job meet only in the shared metric store.
//!
//! # Example
//! ```rust
//! use rowaudit_core::config::{JobMode, RuleInfo, StageConfig};
//! use rowaudit_core::models::{Row, RowSchema};
//! use rowaudit_core::stage::QualityStage;
//! use rowaudit_core::rules::RuleCatalog;
//! use rowaudit_core::alert::LogAlertDispatcher;
//! use rowaudit_core::reporter::DiscardReporter;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> rowaudit_core::Result<()> {
//! let config = StageConfig::new(JobMode::Batch)
//!     .with_rule("r1", RuleInfo::new("regex", "notEmpty", ["email"]))
//!     .with_open(true)
//!     .with_preview(true);
//!
//! let mut stage = QualityStage::open(
//!     config,
//!     &RowSchema::from_names(["email"]),
//!     &RuleCatalog::builtin(),
//!     Arc::new(DiscardReporter),
//!     Arc::new(LogAlertDispatcher),
//! )?;
//!
//! let row = stage.process(Row::insert(vec![json!("")]))?;
//! assert_eq!(row.fields[1], json!("false"));
//! stage.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use uuid::Uuid;

use crate::alert::{AlertDispatcher, HttpAlertDispatcher, LogAlertDispatcher};
use crate::config::StageConfig;
use crate::error::QualityError;
use crate::evaluator::{Evaluation, QualityEvaluator};
use crate::merge::MergeClient;
use crate::metrics::{MetricsSnapshot, RowMetricsTree};
use crate::models::{Row, RowSchema, check_result_column};
use crate::reporter::{DiscardReporter, EndpointReporter, MetricsReporter};
use crate::rules::RuleCatalog;
use crate::scheduler::{PeriodicFlushScheduler, SchedulerState};

/// A running quality stage.
pub struct QualityStage {
    id: Uuid,
    config: StageConfig,
    evaluator: QualityEvaluator,
    output_schema: RowSchema,
    scheduler: PeriodicFlushScheduler,
}

impl std::fmt::Debug for QualityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityStage")
            .field("id", &self.id)
            .field("model_id", &self.config.identity.model_id)
            .field("job_mode", &self.config.job_mode)
            .field("evaluator", &self.evaluator)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl QualityStage {
    /// Opens a stage with explicit collaborators.
    ///
    /// Resolves every rule, allocates the metric tree and, for streaming jobs,
    /// starts the flush timer (which requires a Tokio runtime).
    ///
    /// # Errors
    /// - `QualityError::Configuration` for an invalid configuration
    /// - `QualityError::RuleNotFound` / `QualityError::ColumnResolution` when
    ///   rules cannot be bound to the catalog or schema
    pub fn open(
        config: StageConfig,
        schema: &RowSchema,
        catalog: &RuleCatalog,
        reporter: Arc<dyn MetricsReporter>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let metrics = Arc::new(RowMetricsTree::from_rules(&config.rule_info));
        let evaluator =
            QualityEvaluator::new(&config, schema, catalog, Arc::clone(&metrics), alerts)?;

        let output_schema = if config.open {
            schema.with_column(check_result_column())
        } else {
            schema.clone()
        };

        let mut scheduler = PeriodicFlushScheduler::new(
            Arc::clone(&reporter),
            metrics,
            config.job_mode.clone(),
            config.flush_interval(),
        )
        .with_final_flush(!config.preview);
        scheduler.start()?;

        tracing::info!(
            "Opened quality stage {} for model '{}' ({} rules, {} mode, reporting to {})",
            id,
            config.identity.model_id,
            config.rule_info.len(),
            config.job_mode,
            reporter.describe()
        );

        Ok(Self {
            id,
            config,
            evaluator,
            output_schema,
            scheduler,
        })
    }

    /// Opens a stage whose reporter and alert channel come from `config`.
    ///
    /// - `metric_store` → [`MergeClient`] over the configured store
    /// - `metric_api` → [`EndpointReporter`]
    /// - neither (preview only) → [`DiscardReporter`]
    /// - `warning_api` → [`HttpAlertDispatcher`], otherwise alerts are logged
    ///
    /// # Errors
    /// As [`QualityStage::open`], plus store connection failures.
    pub async fn from_config(
        config: StageConfig,
        schema: &RowSchema,
        catalog: &RuleCatalog,
    ) -> crate::Result<Self> {
        config.validate()?;

        let reporter: Arc<dyn MetricsReporter> = match (&config.metric_store, &config.metric_api) {
            (Some(store), _) => Arc::new(MergeClient::from_config(store).await?),
            (None, Some(api)) => Arc::new(EndpointReporter::new(
                api.clone(),
                config.identity.clone(),
                config.job_mode.clone(),
            )?),
            (None, None) => Arc::new(DiscardReporter),
        };

        let alerts: Arc<dyn AlertDispatcher> = match &config.warning_api {
            Some(api) => Arc::new(HttpAlertDispatcher::new(api.clone())?),
            None => Arc::new(LogAlertDispatcher),
        };

        Self::open(config, schema, catalog, reporter, alerts)
    }

    /// Evaluates one row and returns the row to pass downstream.
    ///
    /// # Errors
    /// Row-fatal errors (`ColumnResolution`, `RuleEvaluation`) for the pipeline's
    /// failure channel; the stage itself stays usable. `StageClosed` once the
    /// stage has been closed.
    pub fn process(&self, row: Row) -> crate::Result<Row> {
        self.evaluate(row).map(|evaluation| evaluation.row)
    }

    /// Evaluates one row, returning the verdict alongside the output row.
    ///
    /// # Errors
    /// See [`QualityStage::process`].
    pub fn evaluate(&self, row: Row) -> crate::Result<Evaluation> {
        if self.scheduler.state() == SchedulerState::Stopped {
            return Err(QualityError::stage_closed(self.id.to_string()));
        }
        self.evaluator.evaluate(row)
    }

    /// Schema of the rows this stage emits.
    pub fn output_schema(&self) -> &RowSchema {
        &self.output_schema
    }

    /// Live metrics not yet flushed.
    pub fn metrics(&self) -> &RowMetricsTree {
        self.evaluator.metrics()
    }

    /// Dirty rows counted since open.
    pub fn dirty_count(&self) -> u64 {
        self.evaluator.threshold().count()
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Flushes now, unless a flush is already running or nothing was dealt.
    pub async fn flush(&self) -> Option<MetricsSnapshot> {
        self.scheduler.flush_now().await
    }

    /// Stops the flush timer and performs the final flush.
    ///
    /// Returns the snapshot delivered by the final flush, if any.
    pub async fn close(&mut self) -> Option<MetricsSnapshot> {
        let delivered = self.scheduler.close().await;
        tracing::info!(
            "Closed quality stage {} ({} dirty rows seen)",
            self.id,
            self.dirty_count()
        );
        delivered
    }
}

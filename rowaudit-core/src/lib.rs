//! Core engine for rowaudit: streaming data-quality evaluation and metric
//! aggregation.
//!
//! A [`QualityStage`] sits in a row pipeline. For every row it applies the
//! configured rules to the target columns, counts passes and failures per
//! field and per table, and passes the row on (optionally with a
//! `check_result` verdict column). A background scheduler periodically folds
//! the counted deltas into a shared store or metric endpoint, and a one-shot
//! alert fires when dirty rows reach a configured limit.
//!
//! # Guarantees
//! - Counters are lock-free; the row path never waits on a flush
//! - Local counters are drained only after a flush is confirmed, and only by
//!   the amounts that were reported
//! - Merges into a shared store use compare-and-set, so concurrent workers do
//!   not overwrite each other
//! - Flush and alert failures are logged and contained; only row evaluation
//!   errors reach the pipeline
//! - Credentials in store URLs and endpoints are redacted in logs
//!
//! # Architecture
//! - [`rules`]: predicate families resolved once per rule at open
//! - [`metrics`]: atomic field and table counters, immutable snapshots
//! - [`codec`], [`store`], [`merge`], [`reporter`]: the flush path
//! - [`evaluator`], [`alert`], [`scheduler`], [`stage`]: per-row orchestration

pub mod alert;
pub mod codec;
pub mod config;
pub mod config_schema;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod reporter;
pub mod rules;
pub mod scheduler;
pub mod stage;
pub mod store;

// Re-export commonly used types
pub use alert::{AlertContext, AlertDispatcher, DirtyThreshold, HttpAlertDispatcher};
pub use config::{JobMode, RuleInfo, StageConfig, StageIdentity, StoreConfig};
pub use error::{QualityError, Result};
pub use evaluator::{Evaluation, QualityEvaluator};
pub use merge::{MergeClient, MergeOutcome};
pub use metrics::{CounterSnapshot, MetricsSnapshot, RowMetricsTree};
pub use models::{ColumnSpec, Row, RowKind, RowSchema};
pub use reporter::{EndpointReporter, MetricsReporter};
pub use rules::{Predicate, PredicateFamily, RuleCatalog};
pub use scheduler::{PeriodicFlushScheduler, SchedulerState};
pub use stage::QualityStage;
pub use store::{MemoryStore, MetricStore, open_store};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

pub use config_schema::validate_config_document;

//! In-memory quality metrics.
//!
//! Three granularities are tracked:
//! - field: one counter triple per (rule, column) pair
//! - rule: the fields of one rule, grouped for reporting
//! - table: one triple per stage instance, counted per row
//!
//! Live counters ([`RowMetricsTree`]) are lock-free and shared between the row
//! path and the flush path. Flushes work on immutable [`MetricsSnapshot`]s and
//! subtract exactly what they reported via [`RowMetricsTree::drain`].

mod counters;
mod snapshot;
mod tree;

pub use counters::Counters;
pub use snapshot::{CounterSnapshot, FieldSnapshot, MetricsSnapshot, RuleSnapshot};
pub use tree::{FieldMetric, RowMetricsTree, RuleMetrics, TableMetric};

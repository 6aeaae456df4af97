//! Live metric tree of one stage instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::counters::Counters;
use super::snapshot::{CounterSnapshot, FieldSnapshot, MetricsSnapshot, RuleSnapshot};
use crate::config::RuleInfos;

/// Counters owned by one (rule, column) pair.
#[derive(Debug)]
pub struct FieldMetric {
    pub rule_id: String,
    pub field_name: String,
    pub rule_name: String,
    pub field_label_id: Option<String>,
    pub counters: Counters,
}

impl FieldMetric {
    pub fn new(
        rule_id: impl Into<String>,
        field_name: impl Into<String>,
        rule_name: impl Into<String>,
        field_label_id: Option<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            field_name: field_name.into(),
            rule_name: rule_name.into(),
            field_label_id,
            counters: Counters::new(),
        }
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            rule_name: self.rule_name.clone(),
            field_label_id: self.field_label_id.clone(),
            counts: self.counters.snapshot(),
        }
    }
}

/// Row-granularity counters of one stage instance.
#[derive(Debug, Default)]
pub struct TableMetric {
    pub counters: Counters,
}

/// Field metrics of one rule, keyed and ordered by column name.
#[derive(Debug, Default)]
pub struct RuleMetrics {
    pub fields: BTreeMap<String, Arc<FieldMetric>>,
}

/// All field metrics grouped by rule, plus the table metric.
///
/// The set of rules and fields is fixed when the tree is built; only counter
/// values change afterwards. Field metrics are reference counted so the
/// evaluator can hold direct handles and skip map lookups per row.
#[derive(Debug, Default)]
pub struct RowMetricsTree {
    table: TableMetric,
    rules: BTreeMap<String, RuleMetrics>,
}

impl RowMetricsTree {
    /// Builds a zeroed tree with one field metric per distinct (rule, column).
    pub fn from_rules(rules: &RuleInfos) -> Self {
        let rules = rules
            .iter()
            .map(|(rule_id, rule)| {
                let rule_name = rule.display_name(rule_id);
                let fields = rule
                    .column_names
                    .iter()
                    .map(|column| {
                        let metric = FieldMetric::new(
                            rule_id.as_str(),
                            column.as_str(),
                            rule_name,
                            rule.field_label_id.clone(),
                        );
                        (column.clone(), Arc::new(metric))
                    })
                    .collect();
                (rule_id.clone(), RuleMetrics { fields })
            })
            .collect();

        Self {
            table: TableMetric::default(),
            rules,
        }
    }

    pub fn table(&self) -> &Counters {
        &self.table.counters
    }

    pub fn rules(&self) -> &BTreeMap<String, RuleMetrics> {
        &self.rules
    }

    pub fn field(&self, rule_id: &str, field_name: &str) -> Option<&Arc<FieldMetric>> {
        self.rules
            .get(rule_id)
            .and_then(|rule| rule.fields.get(field_name))
    }

    /// Iterates every field metric in rule, then column, order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldMetric>> {
        self.rules.values().flat_map(|rule| rule.fields.values())
    }

    /// Captures every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let row = self
            .rules
            .iter()
            .map(|(rule_id, rule)| {
                let fields: RuleSnapshot = rule
                    .fields
                    .iter()
                    .map(|(name, metric)| (name.clone(), metric.snapshot()))
                    .collect();
                (rule_id.clone(), fields)
            })
            .collect();

        MetricsSnapshot {
            table: self.table.counters.snapshot(),
            row,
        }
    }

    /// Subtracts a previously captured snapshot, preserving increments made
    /// since it was taken. Entries absent from this tree are ignored.
    pub fn drain(&self, taken: &MetricsSnapshot) {
        self.table.counters.drain(&taken.table);
        for (rule_id, fields) in &taken.row {
            for (field_name, field) in fields {
                if let Some(metric) = self.field(rule_id, field_name) {
                    metric.counters.drain(&field.counts);
                }
            }
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.table.counters.reset();
        for metric in self.fields() {
            metric.counters.reset();
        }
    }

    /// Table totals.
    pub fn table_snapshot(&self) -> CounterSnapshot {
        self.table.counters.snapshot()
    }
}

//! Per-row rule evaluation.
//!
//! Rules are resolved against the catalog and the input schema once, when the
//! evaluator is built. Evaluating a row then runs every predicate, decides the
//! verdict, and only afterwards touches counters, so a failing predicate never
//! leaves a partially counted row behind.

use serde_json::Value;
use std::sync::Arc;

use crate::alert::{AlertContext, AlertDispatcher, DirtyThreshold};
use crate::config::StageConfig;
use crate::error::QualityError;
use crate::metrics::{FieldMetric, RowMetricsTree};
use crate::models::{Row, RowSchema, value_to_text};
use crate::rules::{Predicate, RuleCatalog};

/// One target column of a resolved rule.
#[derive(Debug)]
struct ResolvedField {
    column_index: usize,
    metric: Arc<FieldMetric>,
}

/// A rule with its predicate and column positions looked up.
#[derive(Debug)]
struct ResolvedRule {
    rule_id: String,
    predicate: Arc<dyn Predicate>,
    fields: Vec<ResolvedField>,
}

/// Result of evaluating one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// True when every field of every rule passed
    pub passed: bool,
    /// The row to pass downstream, with the verdict column appended when
    /// enabled
    pub row: Row,
}

/// Applies the configured rules to rows and accumulates metrics.
pub struct QualityEvaluator {
    rules: Vec<ResolvedRule>,
    field_count: usize,
    metrics: Arc<RowMetricsTree>,
    threshold: DirtyThreshold,
    alerts: Arc<dyn AlertDispatcher>,
    alert_context: AlertContext,
    emit_result: bool,
}

impl std::fmt::Debug for QualityEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityEvaluator")
            .field("rules", &self.rules.len())
            .field("fields", &self.field_count)
            .field("threshold", &self.threshold)
            .field("emit_result", &self.emit_result)
            .finish_non_exhaustive()
    }
}

impl QualityEvaluator {
    /// Resolves every rule of `config` against `catalog` and `schema`.
    ///
    /// # Errors
    /// - `QualityError::RuleNotFound` for an unknown rule type or code
    /// - `QualityError::ColumnResolution` for a column missing from `schema`
    pub fn new(
        config: &StageConfig,
        schema: &RowSchema,
        catalog: &RuleCatalog,
        metrics: Arc<RowMetricsTree>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> crate::Result<Self> {
        let mut rules = Vec::with_capacity(config.rule_info.len());
        for (rule_id, rule) in &config.rule_info {
            let predicate = catalog.resolve(&rule.rule_type, &rule.rule_code)?;
            let rule_metrics = metrics.rules().get(rule_id).ok_or_else(|| {
                QualityError::configuration(format!("no metrics allocated for rule '{}'", rule_id))
            })?;

            let fields = rule_metrics
                .fields
                .iter()
                .map(|(column, metric)| -> crate::Result<ResolvedField> {
                    let column_index = schema.index_of(column).ok_or_else(|| {
                        QualityError::column_resolution(
                            column.as_str(),
                            format!("rule '{}' targets a column absent from the input schema", rule_id),
                        )
                    })?;
                    Ok(ResolvedField {
                        column_index,
                        metric: Arc::clone(metric),
                    })
                })
                .collect::<crate::Result<Vec<_>>>()?;

            tracing::debug!(
                "Resolved rule '{}' ({}/{}) over {} column(s)",
                rule_id,
                rule.rule_type,
                rule.rule_code,
                fields.len()
            );

            rules.push(ResolvedRule {
                rule_id: rule_id.clone(),
                predicate,
                fields,
            });
        }

        let field_count = rules.iter().map(|rule| rule.fields.len()).sum();
        let limit = if config.alerting_enabled() {
            config.dirty_data_limit
        } else {
            0
        };

        Ok(Self {
            rules,
            field_count,
            metrics,
            threshold: DirtyThreshold::new(limit),
            alerts,
            alert_context: AlertContext::from(&config.identity),
            emit_result: config.open,
        })
    }

    /// Evaluates one row.
    ///
    /// Insert rows update field and table counters and the dirty-row count.
    /// Update and delete rows only produce a verdict.
    ///
    /// # Errors
    /// - `QualityError::ColumnResolution` if the row is shorter than the schema
    /// - `QualityError::RuleEvaluation` if a predicate fails
    ///
    /// Counters are untouched when an error is returned.
    pub fn evaluate(&self, mut row: Row) -> crate::Result<Evaluation> {
        let mut outcomes = Vec::with_capacity(self.field_count);
        let mut passed = true;

        for rule in &self.rules {
            for field in &rule.fields {
                let value = row.field(field.column_index).ok_or_else(|| {
                    QualityError::column_resolution(
                        field.metric.field_name.as_str(),
                        format!(
                            "row has {} field(s), column index {} is out of range",
                            row.arity(),
                            field.column_index
                        ),
                    )
                })?;

                let result = rule
                    .predicate
                    .evaluate(&value_to_text(value))
                    .map_err(|e| {
                        QualityError::rule_evaluation(
                            rule.rule_id.as_str(),
                            field.metric.field_name.as_str(),
                            e.to_string(),
                        )
                    })?;

                passed &= result;
                outcomes.push(result);
            }
        }

        if row.kind.is_insert() {
            self.record(&outcomes, passed);
        }

        if self.emit_result {
            row.fields.push(Value::String(passed.to_string()));
        }

        Ok(Evaluation { passed, row })
    }

    fn record(&self, outcomes: &[bool], passed: bool) {
        let fields = self.rules.iter().flat_map(|rule| rule.fields.iter());
        for (field, result) in fields.zip(outcomes) {
            field.metric.counters.record(*result);
        }

        self.metrics.table().record(passed);

        if !passed && self.threshold.record_dirty() {
            tracing::debug!(
                "Dirty data reached the configured limit of {} rows",
                self.threshold.limit()
            );
            self.alerts.notify(&self.alert_context);
        }
    }

    pub fn metrics(&self) -> &Arc<RowMetricsTree> {
        &self.metrics
    }

    pub fn threshold(&self) -> &DirtyThreshold {
        &self.threshold
    }

    /// Whether the verdict column is appended.
    pub fn emits_result(&self) -> bool {
        self.emit_result
    }
}

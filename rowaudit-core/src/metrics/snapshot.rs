//! Immutable metric snapshots.
//!
//! These are the values that travel to the shared store and metric endpoints.
//! Field names follow the reporting platform's payload (`dealDataNum`,
//! `neatDataNum`, `dirtyDataNum`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::QualityError;

/// Point-in-time values of one counter triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Rows evaluated
    #[serde(rename = "dealDataNum", default)]
    pub dealt: u64,
    /// Rows that passed
    #[serde(rename = "neatDataNum", default)]
    pub neat: u64,
    /// Rows that failed
    #[serde(rename = "dirtyDataNum", default)]
    pub dirty: u64,
}

impl CounterSnapshot {
    pub fn new(dealt: u64, neat: u64, dirty: u64) -> Self {
        Self { dealt, neat, dirty }
    }

    /// True when `dealt == neat + dirty`.
    pub fn is_consistent(&self) -> bool {
        self.neat.checked_add(self.dirty) == Some(self.dealt)
    }

    pub fn is_zero(&self) -> bool {
        self.dealt == 0 && self.neat == 0 && self.dirty == 0
    }

    /// Adds `other` counter-wise.
    pub fn add(&mut self, other: &CounterSnapshot) {
        self.dealt = self.dealt.saturating_add(other.dealt);
        self.neat = self.neat.saturating_add(other.neat);
        self.dirty = self.dirty.saturating_add(other.dirty);
    }
}

/// Snapshot of one (rule, column) field metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    #[serde(default)]
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_label_id: Option<String>,
    #[serde(flatten)]
    pub counts: CounterSnapshot,
}

/// Fields of one rule keyed by column name.
pub type RuleSnapshot = BTreeMap<String, FieldSnapshot>;

/// Snapshot of a whole metric tree.
///
/// # Example
/// ```rust
/// use rowaudit_core::metrics::{CounterSnapshot, FieldSnapshot, MetricsSnapshot};
///
/// let mut remote = MetricsSnapshot::default();
/// remote.table = CounterSnapshot::new(2, 2, 0);
/// remote.row.entry("r1".into()).or_default().insert(
///     "email".into(),
///     FieldSnapshot { rule_name: "r1".into(), field_label_id: None, counts: CounterSnapshot::new(2, 2, 0) },
/// );
///
/// let mut local = remote.clone();
/// local.table = CounterSnapshot::new(1, 0, 1);
/// local.row.get_mut("r1").unwrap().get_mut("email").unwrap().counts = CounterSnapshot::new(1, 0, 1);
///
/// remote.merge_add(&local).unwrap();
/// assert_eq!(remote.table, CounterSnapshot::new(3, 2, 1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Row-granularity totals
    #[serde(default)]
    pub table: CounterSnapshot,
    /// Field totals keyed by rule id, then column name
    #[serde(default)]
    pub row: BTreeMap<String, RuleSnapshot>,
}

impl MetricsSnapshot {
    /// Looks up one field's counts.
    pub fn field(&self, rule_id: &str, field_name: &str) -> Option<&CounterSnapshot> {
        self.row
            .get(rule_id)
            .and_then(|fields| fields.get(field_name))
            .map(|field| &field.counts)
    }

    /// True when every counter in the tree is zero.
    pub fn is_zero(&self) -> bool {
        self.table.is_zero()
            && self
                .row
                .values()
                .flat_map(|fields| fields.values())
                .all(|field| field.counts.is_zero())
    }

    /// True when every triple satisfies `dealt == neat + dirty`.
    pub fn is_consistent(&self) -> bool {
        self.table.is_consistent()
            && self
                .row
                .values()
                .flat_map(|fields| fields.values())
                .all(|field| field.counts.is_consistent())
    }

    /// Verifies both snapshots describe the same rules and columns.
    ///
    /// # Errors
    /// Returns `QualityError::SchemaMismatch` naming the first difference.
    pub fn check_aligned(&self, other: &MetricsSnapshot) -> crate::Result<()> {
        let ours: BTreeSet<&String> = self.row.keys().collect();
        let theirs: BTreeSet<&String> = other.row.keys().collect();
        if ours != theirs {
            return Err(QualityError::schema_mismatch(format!(
                "rule ids differ: {:?} vs {:?}",
                ours, theirs
            )));
        }

        for (rule_id, fields) in &self.row {
            let ours: BTreeSet<&String> = fields.keys().collect();
            let theirs: BTreeSet<&String> = other
                .row
                .get(rule_id)
                .map(|f| f.keys().collect())
                .unwrap_or_default();
            if ours != theirs {
                return Err(QualityError::schema_mismatch(format!(
                    "fields of rule '{}' differ: {:?} vs {:?}",
                    rule_id, ours, theirs
                )));
            }
        }
        Ok(())
    }

    /// Adds `other` into this snapshot, table-wise and field-wise.
    ///
    /// Display attributes (rule name, field label) are taken from `other`,
    /// which is the local side of a merge and reflects current configuration.
    ///
    /// # Errors
    /// Returns `QualityError::SchemaMismatch` when the trees do not align;
    /// `self` is left untouched in that case.
    pub fn merge_add(&mut self, other: &MetricsSnapshot) -> crate::Result<()> {
        self.check_aligned(other)?;

        self.table.add(&other.table);
        for (rule_id, fields) in &other.row {
            let Some(target) = self.row.get_mut(rule_id) else {
                continue;
            };
            for (field_name, field) in fields {
                if let Some(existing) = target.get_mut(field_name) {
                    existing.counts.add(&field.counts);
                    existing.rule_name.clone_from(&field.rule_name);
                    existing.field_label_id.clone_from(&field.field_label_id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(table: (u64, u64, u64), email: (u64, u64, u64)) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            table: CounterSnapshot::new(table.0, table.1, table.2),
            ..Default::default()
        };
        snapshot.row.entry("r1".to_string()).or_default().insert(
            "email".to_string(),
            FieldSnapshot {
                rule_name: "email required".to_string(),
                field_label_id: Some("L-1".to_string()),
                counts: CounterSnapshot::new(email.0, email.1, email.2),
            },
        );
        snapshot
    }

    #[test]
    fn test_counter_snapshot_wire_names() {
        let value = serde_json::to_value(CounterSnapshot::new(3, 2, 1)).unwrap();
        assert_eq!(
            value,
            json!({"dealDataNum": 3, "neatDataNum": 2, "dirtyDataNum": 1})
        );
    }

    #[test]
    fn test_merge_add() {
        let mut remote = snapshot((10, 8, 2), (10, 9, 1));
        let local = snapshot((3, 2, 1), (3, 2, 1));

        remote.merge_add(&local).unwrap();
        assert_eq!(remote.table, CounterSnapshot::new(13, 10, 3));
        assert_eq!(
            remote.field("r1", "email"),
            Some(&CounterSnapshot::new(13, 11, 2))
        );
        assert!(remote.is_consistent());
    }

    #[test]
    fn test_merge_rejects_misaligned_rules() {
        let mut remote = snapshot((1, 1, 0), (1, 1, 0));
        let mut local = snapshot((1, 1, 0), (1, 1, 0));
        local.row.insert("r2".to_string(), RuleSnapshot::new());

        let before = remote.clone();
        assert!(matches!(
            remote.merge_add(&local),
            Err(QualityError::SchemaMismatch { .. })
        ));
        assert_eq!(remote, before);
    }

    #[test]
    fn test_merge_rejects_misaligned_fields() {
        let mut remote = snapshot((1, 1, 0), (1, 1, 0));
        let mut local = snapshot((1, 1, 0), (1, 1, 0));
        let field = local.row.get_mut("r1").unwrap().remove("email").unwrap();
        local
            .row
            .get_mut("r1")
            .unwrap()
            .insert("phone".to_string(), field);

        let err = remote.merge_add(&local).unwrap_err();
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_zero_and_consistency() {
        assert!(snapshot((0, 0, 0), (0, 0, 0)).is_zero());
        assert!(!snapshot((0, 0, 0), (1, 1, 0)).is_zero());
        assert!(!snapshot((2, 1, 0), (0, 0, 0)).is_consistent());
    }
}

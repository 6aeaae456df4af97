//! Rule configuration.
//!
//! Platforms deliver `rule_info` either as a JSON object or as a string that
//! contains the JSON object; both forms are accepted.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One configured quality rule.
///
/// Field names follow the platform's camelCase payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInfo {
    /// Predicate family (e.g. `regex`)
    pub rule_type: String,
    /// Predicate within the family (e.g. `notEmpty`)
    pub rule_code: String,
    /// Display name copied into every field metric of the rule
    #[serde(default)]
    pub rule_name: Option<String>,
    /// Field label id copied into every field metric of the rule
    #[serde(default)]
    pub field_label_id: Option<String>,
    /// Target columns, each evaluated independently
    pub column_names: Vec<String>,
}

impl RuleInfo {
    /// Creates a rule over the given columns.
    pub fn new<I, S>(rule_type: impl Into<String>, rule_code: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_type: rule_type.into(),
            rule_code: rule_code.into(),
            rule_name: None,
            field_label_id: None,
            column_names: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Builder method to set the display name.
    pub fn with_rule_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = Some(name.into());
        self
    }

    /// Builder method to set the field label id.
    pub fn with_field_label_id(mut self, label: impl Into<String>) -> Self {
        self.field_label_id = Some(label.into());
        self
    }

    /// Display name, falling back to the rule id.
    pub fn display_name<'a>(&'a self, rule_id: &'a str) -> &'a str {
        self.rule_name.as_deref().unwrap_or(rule_id)
    }
}

/// Rules keyed by rule id, iterated in id order.
pub type RuleInfos = BTreeMap<String, RuleInfo>;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleInfos {
    Encoded(String),
    Inline(RuleInfos),
}

pub(crate) fn deserialize_rule_infos<'de, D>(deserializer: D) -> Result<RuleInfos, D::Error>
where
    D: Deserializer<'de>,
{
    match RawRuleInfos::deserialize(deserializer)? {
        RawRuleInfos::Inline(rules) => Ok(rules),
        RawRuleInfos::Encoded(text) => serde_json::from_str(&text).map_err(|e| {
            serde::de::Error::custom(format!("rule_info is not a valid rule object: {}", e))
        }),
    }
}

//! JSON Schema validation of raw stage configuration documents.
//!
//! Pipelines hand the stage a loosely-typed option map. Before it is
//! deserialized into [`StageConfig`](crate::config::StageConfig) the document
//! is checked against an embedded schema so that every missing or malformed
//! option is reported in one pass instead of one serde error at a time.
//!
//! # Example
//! ```rust
//! use rowaudit_core::config_schema::validate_config_document;
//! use serde_json::json;
//!
//! let document = json!({
//!     "rule_info": {"r1": {"ruleType": "regex", "ruleCode": "notEmpty", "columnNames": ["email"]}},
//!     "model_id": "m-1",
//!     "ds_id": "ds-1",
//!     "ds_name": "crm",
//!     "dept_id": "d-1",
//!     "dept_name": "sales",
//!     "create_by": "u-42",
//!     "tenant_id": "t-1",
//!     "job_mode": "batch",
//!     "resource": "crm.customers"
//! });
//!
//! assert!(validate_config_document(&document).is_ok());
//! ```

use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::QualityError;

/// Options every stage configuration must carry.
pub const REQUIRED_OPTIONS: &[&str] = &[
    "rule_info",
    "model_id",
    "ds_id",
    "ds_name",
    "dept_id",
    "dept_name",
    "create_by",
    "tenant_id",
    "job_mode",
    "resource",
];

/// Embedded JSON Schema for stage configuration documents
const CONFIG_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "rowaudit quality stage configuration",
  "type": "object",
  "required": [
    "rule_info", "model_id", "ds_id", "ds_name", "dept_id",
    "dept_name", "create_by", "tenant_id", "job_mode", "resource"
  ],
  "properties": {
    "rule_info": {
      "oneOf": [
        { "type": "string", "minLength": 2 },
        {
          "type": "object",
          "minProperties": 1,
          "additionalProperties": { "$ref": "#/$defs/rule" }
        }
      ]
    },
    "open": { "type": "boolean" },
    "dirty_data_limit": { "type": "integer", "minimum": 0 },
    "model_id": { "type": "string" },
    "model_name": { "type": "string" },
    "ds_id": { "type": "string" },
    "ds_name": { "type": "string" },
    "resource": { "type": "string", "minLength": 1 },
    "resource_comment": { "type": "string" },
    "dept_id": { "type": "string" },
    "dept_name": { "type": "string" },
    "tenant_id": { "type": "string" },
    "create_by": { "type": "string" },
    "job_mode": { "type": "string", "minLength": 1 },
    "preview": { "type": "boolean" },
    "metric_api": { "type": "string", "minLength": 1 },
    "warning_api": { "type": "string", "minLength": 1 },
    "metric_store": {
      "type": "object",
      "required": ["url", "key"],
      "properties": {
        "url": { "type": "string", "minLength": 1 },
        "key": { "type": "string", "minLength": 1 },
        "max_merge_attempts": { "type": "integer", "minimum": 1 }
      }
    },
    "flush_interval_secs": { "type": "integer", "minimum": 1, "maximum": 86400 }
  },
  "$defs": {
    "rule": {
      "type": "object",
      "required": ["ruleType", "ruleCode", "columnNames"],
      "properties": {
        "ruleType": { "type": "string", "minLength": 1 },
        "ruleCode": { "type": "string", "minLength": 1 },
        "ruleName": { "type": ["string", "null"] },
        "fieldLabelId": { "type": ["string", "null"] },
        "columnNames": {
          "type": "array",
          "minItems": 1,
          "items": { "type": "string", "minLength": 1 }
        }
      }
    }
  }
}"##;

/// Compiled configuration schema (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

fn compiled_schema() -> crate::Result<&'static Validator> {
    if let Some(validator) = COMPILED_SCHEMA.get() {
        return Ok(validator);
    }

    let schema_json: Value = serde_json::from_str(CONFIG_SCHEMA)
        .map_err(|e| QualityError::serialization("Failed to parse embedded config schema", e))?;
    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        QualityError::configuration(format!("Config schema compilation error: {}", e))
    })?;

    // Another thread may have won the race; either instance is equivalent
    let _ = COMPILED_SCHEMA.set(compiled);
    COMPILED_SCHEMA
        .get()
        .ok_or_else(|| QualityError::configuration("Config schema validator unavailable"))
}

/// Validates a raw configuration document.
///
/// # Errors
/// Returns `QualityError::Configuration` listing every schema violation.
pub fn validate_config_document(document: &Value) -> crate::Result<()> {
    let schema = compiled_schema()?;

    let errors: Vec<String> = schema
        .iter_errors(document)
        .map(|error| error.to_string())
        .collect();

    if errors.is_empty() {
        return Ok(());
    }

    Err(QualityError::configuration(format!(
        "Configuration document failed validation with {} error(s): {}",
        errors.len(),
        errors.join("; ")
    )))
}

/// Lists required options absent from the document.
pub fn missing_options(document: &Value) -> Vec<&'static str> {
    REQUIRED_OPTIONS
        .iter()
        .copied()
        .filter(|option| document.get(option).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_document() -> Value {
        json!({
            "rule_info": {
                "r1": {"ruleType": "regex", "ruleCode": "notEmpty", "columnNames": ["email"]}
            },
            "model_id": "m-1",
            "ds_id": "ds-1",
            "ds_name": "crm",
            "dept_id": "d-1",
            "dept_name": "sales",
            "create_by": "u-42",
            "tenant_id": "t-1",
            "job_mode": "STREAMING",
            "resource": "crm.customers",
            "metric_store": {"url": "memory://q", "key": "quality:m-1"}
        })
    }

    #[test]
    fn test_complete_document_is_valid() {
        assert!(validate_config_document(&complete_document()).is_ok());
        assert!(missing_options(&complete_document()).is_empty());
    }

    #[test]
    fn test_encoded_rule_info_is_accepted() {
        let mut document = complete_document();
        document["rule_info"] = json!(
            "{\"r1\":{\"ruleType\":\"regex\",\"ruleCode\":\"email\",\"columnNames\":[\"email\"]}}"
        );
        assert!(validate_config_document(&document).is_ok());
    }

    #[test]
    fn test_missing_options_are_reported_together() {
        let mut document = complete_document();
        let object = document.as_object_mut().unwrap();
        object.remove("ds_id");
        object.remove("tenant_id");

        assert_eq!(missing_options(&document), vec!["ds_id", "tenant_id"]);

        let err = validate_config_document(&document).unwrap_err();
        assert!(matches!(err, QualityError::Configuration { .. }));
        let message = err.to_string();
        assert!(message.contains("ds_id"));
        assert!(message.contains("tenant_id"));
    }

    #[test]
    fn test_rule_without_columns_is_rejected() {
        let mut document = complete_document();
        document["rule_info"]["r1"]["columnNames"] = json!([]);
        assert!(validate_config_document(&document).is_err());
    }

    #[test]
    fn test_negative_limit_is_rejected() {
        let mut document = complete_document();
        document["dirty_data_limit"] = json!(-1);
        assert!(validate_config_document(&document).is_err());
    }

    #[test]
    fn test_embedded_schema_compiles() {
        assert!(compiled_schema().is_ok());
    }

    #[test]
    fn test_rule_definitions_are_checked_through_ref() {
        let mut document = complete_document();
        document["rule_info"]["r1"] = json!({"ruleType": "regex", "columnNames": ["email"]});
        let err = validate_config_document(&document).unwrap_err();
        assert!(err.to_string().contains("ruleCode"));
    }

    #[test]
    fn test_flush_interval_bounds() {
        let mut document = complete_document();
        document["flush_interval_secs"] = json!(0);
        assert!(validate_config_document(&document).is_err());

        document["flush_interval_secs"] = json!(u64::MAX);
        assert!(validate_config_document(&document).is_err());

        document["flush_interval_secs"] = json!(86_400);
        assert!(validate_config_document(&document).is_ok());
    }
}

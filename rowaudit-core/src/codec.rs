//! Text encoding of metric snapshots for the shared store.
//!
//! ```json
//! {
//!   "table": {"dealDataNum": 3, "neatDataNum": 2, "dirtyDataNum": 1},
//!   "row": {
//!     "r1": {
//!       "email": {"ruleName": "r1", "dealDataNum": 3, "neatDataNum": 2, "dirtyDataNum": 1}
//!     }
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored when decoding so that newer writers can add
//! attributes without breaking older readers.

use crate::error::QualityError;
use crate::metrics::MetricsSnapshot;

/// Encodes a snapshot as compact JSON.
///
/// # Errors
/// Returns `QualityError::Serialization` if encoding fails.
pub fn encode_snapshot(snapshot: &MetricsSnapshot) -> crate::Result<String> {
    serde_json::to_string(snapshot)
        .map_err(|e| QualityError::serialization("Failed to encode metrics snapshot", e))
}

/// Decodes a snapshot from its stored text.
///
/// # Errors
/// Returns `QualityError::SchemaMismatch` if the text is not a snapshot.
pub fn decode_snapshot(text: &str) -> crate::Result<MetricsSnapshot> {
    serde_json::from_str(text).map_err(|e| {
        QualityError::schema_mismatch(format!("stored value is not a metrics snapshot: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CounterSnapshot;
    use serde_json::{Value, json};

    #[test]
    fn test_decode_stored_value() {
        let text = json!({
            "table": {"dealDataNum": 3, "neatDataNum": 2, "dirtyDataNum": 1},
            "row": {
                "r1": {
                    "email": {
                        "ruleName": "email required",
                        "fieldLabelId": "L-1",
                        "dealDataNum": 3,
                        "neatDataNum": 2,
                        "dirtyDataNum": 1
                    }
                }
            }
        })
        .to_string();

        let snapshot = decode_snapshot(&text).unwrap();
        assert_eq!(snapshot.table, CounterSnapshot::new(3, 2, 1));
        assert_eq!(
            snapshot.field("r1", "email"),
            Some(&CounterSnapshot::new(3, 2, 1))
        );
        assert_eq!(
            snapshot.row["r1"]["email"].field_label_id.as_deref(),
            Some("L-1")
        );
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let text = json!({
            "table": {"dealDataNum": 1, "neatDataNum": 1, "dirtyDataNum": 0, "ratio": 1.0},
            "row": {},
            "updatedAt": "2024-05-01T00:00:00Z"
        })
        .to_string();

        let snapshot = decode_snapshot(&text).unwrap();
        assert_eq!(snapshot.table, CounterSnapshot::new(1, 1, 0));
    }

    #[test]
    fn test_decode_rejects_non_snapshot() {
        assert!(matches!(
            decode_snapshot("[1, 2, 3]"),
            Err(QualityError::SchemaMismatch { .. })
        ));
        assert!(decode_snapshot("{\"table\": {\"dealDataNum\": -1}}").is_err());
    }

    #[test]
    fn test_encoded_layout() {
        let snapshot = MetricsSnapshot {
            table: CounterSnapshot::new(2, 1, 1),
            ..Default::default()
        };
        let encoded: Value = serde_json::from_str(&encode_snapshot(&snapshot).unwrap()).unwrap();
        assert_eq!(encoded["table"]["dirtyDataNum"], 1);
        assert!(encoded["row"].as_object().unwrap().is_empty());
    }
}

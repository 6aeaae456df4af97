//! Reading row schemas and NDJSON rows, and writing rows back out.

use rowaudit_core::{ColumnSpec, QualityError, Result, Row, RowSchema};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Accepted layouts of a schema file.
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Names(Vec<String>),
    Columns(Vec<ColumnSpec>),
    Schema(RowSchema),
}

/// Parses a schema document: a list of column names, a list of column
/// specs, or `{"columns": [...]}`.
///
/// # Errors
/// Returns a configuration error for any other shape or an empty schema.
pub fn parse_schema(text: &str) -> Result<RowSchema> {
    let parsed: SchemaFile = serde_json::from_str(text)
        .map_err(|e| QualityError::configuration(format!("Invalid row schema: {}", e)))?;

    let schema = match parsed {
        SchemaFile::Names(names) => RowSchema::from_names(names),
        SchemaFile::Columns(columns) => RowSchema::new(columns),
        SchemaFile::Schema(schema) => schema,
    };

    if schema.is_empty() {
        return Err(QualityError::configuration("Row schema has no columns"));
    }
    Ok(schema)
}

/// Reads and parses a schema file.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, otherwise as
/// [`parse_schema`].
pub async fn load_schema(path: &Path) -> Result<RowSchema> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        QualityError::io(format!("Failed to read schema file {}", path.display()), e)
    })?;
    parse_schema(&text)
}

/// Parses one NDJSON line into a row.
///
/// - `[v1, v2, ...]` is an insert with positional fields
/// - `{"kind": "+U", "fields": [...]}` carries an explicit change kind
/// - any other object is an insert keyed by column name; missing columns
///   are null, so columns named `kind` or `fields` still resolve
///
/// # Errors
/// Returns a serialization error for malformed JSON and a column resolution
/// error for a value that is not an array or object.
pub fn parse_row(line: &str, schema: &RowSchema) -> Result<Row> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| QualityError::serialization("Failed to parse input row", e))?;

    match value {
        Value::Array(fields) => Ok(Row::insert(fields)),
        Value::Object(ref map) if is_change_row(map) => serde_json::from_value(value)
            .map_err(|e| QualityError::serialization("Failed to parse input row", e)),
        Value::Object(mut map) => {
            let fields = schema
                .columns
                .iter()
                .map(|column| map.remove(&column.name).unwrap_or(Value::Null))
                .collect();
            Ok(Row::insert(fields))
        }
        other => Err(QualityError::column_resolution(
            "<row>",
            format!("expected a JSON array or object, got {}", other),
        )),
    }
}

fn is_change_row(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("kind") && map.get("fields").is_some_and(Value::is_array)
}

/// Renders a processed row as one NDJSON line.
///
/// # Errors
/// Returns a serialization error if the row cannot be encoded.
pub fn render_row(row: &Row) -> Result<String> {
    serde_json::to_string(row)
        .map_err(|e| QualityError::serialization("Failed to encode output row", e))
}

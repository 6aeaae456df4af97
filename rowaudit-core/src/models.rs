//! Row and schema models for the processing pipeline.
//!
//! Rows are positional: `Row::fields[i]` belongs to `RowSchema::columns[i]`.
//! Values are carried as `serde_json::Value` so that any upstream connector
//! can hand rows to the engine without a dedicated type system.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the column appended when the verdict output is enabled.
pub const CHECK_RESULT_COLUMN: &str = "check_result";

/// Maximum width of the appended verdict column.
pub const CHECK_RESULT_MAX_LENGTH: u32 = 255;

/// Change kind of a row in a change-data-capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Newly inserted row (`+I`)
    #[default]
    #[serde(alias = "+I")]
    Insert,
    /// Row image before an update (`-U`)
    #[serde(alias = "-U")]
    UpdateBefore,
    /// Row image after an update (`+U`)
    #[serde(alias = "+U")]
    UpdateAfter,
    /// Deleted row (`-D`)
    #[serde(alias = "-D")]
    Delete,
}

impl RowKind {
    /// Only inserts contribute to metric counters; update and delete images
    /// are replays of rows that were already counted.
    pub fn is_insert(&self) -> bool {
        matches!(self, RowKind::Insert)
    }

    /// Short change-log notation.
    pub fn short_name(&self) -> &'static str {
        match self {
            RowKind::Insert => "+I",
            RowKind::UpdateBefore => "-U",
            RowKind::UpdateAfter => "+U",
            RowKind::Delete => "-D",
        }
    }
}

impl std::fmt::Display for RowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A single row flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Change kind
    #[serde(default)]
    pub kind: RowKind,
    /// Positional field values
    pub fields: Vec<Value>,
}

impl Row {
    /// Creates an insert row.
    pub fn insert(fields: Vec<Value>) -> Self {
        Self {
            kind: RowKind::Insert,
            fields,
        }
    }

    /// Creates a row with an explicit change kind.
    pub fn with_kind(kind: RowKind, fields: Vec<Value>) -> Self {
        Self { kind, fields }
    }

    /// Returns the field at `index`, if present.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// Number of fields in the row.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// Renders a field value as the text handed to predicates.
///
/// Strings are passed verbatim, null becomes the empty string, and all other
/// values use their compact JSON rendering (`42`, `true`, `[1,2]`).
pub fn value_to_text(value: &Value) -> std::borrow::Cow<'_, str> {
    match value {
        Value::String(s) => std::borrow::Cow::Borrowed(s.as_str()),
        Value::Null => std::borrow::Cow::Borrowed(""),
        other => std::borrow::Cow::Owned(other.to_string()),
    }
}

/// Column description in a row schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// Creates a nullable string column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: default_data_type(),
            nullable: true,
            max_length: None,
        }
    }

    /// Builder method to set the data type.
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    /// Builder method to set nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Builder method to set the maximum length.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Ordered column layout of the rows entering the stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSchema {
    pub columns: Vec<ColumnSpec>,
}

impl RowSchema {
    /// Creates a schema from column specs.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Creates a schema of nullable string columns from names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(ColumnSpec::new).collect(),
        }
    }

    /// Position of the named column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns a copy of this schema with one more column appended.
    pub fn with_column(&self, column: ColumnSpec) -> Self {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// The verdict column appended when `open` is enabled.
pub fn check_result_column() -> ColumnSpec {
    ColumnSpec::new(CHECK_RESULT_COLUMN)
        .with_data_type("string")
        .with_nullable(true)
        .with_max_length(CHECK_RESULT_MAX_LENGTH)
}

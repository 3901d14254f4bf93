//! Data model shared by the compiler, the runtime and the HTTP layer.
//!
//! Dataset and chart descriptors are owned by external stores; Quarry only
//! reads them. Result sets are produced by the execution gateway and cached
//! immutably.

use chrono::{DateTime, Utc};
use quarry_error::{ErrorCode, ErrorContext, QuarryError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetKind {
    /// Stored SQL text, wrapped as a derived table at compile time.
    RawSql,
    /// A table addressed by name.
    PhysicalTable,
}

impl DatasetKind {
    /// Maps the type tag the dataset store persists (`sql`, `db`).
    pub fn from_stored(tag: &str) -> Option<Self> {
        match tag {
            "sql" => Some(Self::RawSql),
            "db" => Some(Self::PhysicalTable),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::RawSql => write!(f, "RAW_SQL"),
            DatasetKind::PhysicalTable => write!(f, "PHYSICAL_TABLE"),
        }
    }
}

/// A queryable relation, backed by a physical table or stored SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    pub kind: DatasetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub datasource_id: String,
}

impl Dataset {
    pub fn physical_table(
        id: impl Into<String>,
        table_name: impl Into<String>,
        datasource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: DatasetKind::PhysicalTable,
            sql_text: None,
            table_name: Some(table_name.into()),
            datasource_id: datasource_id.into(),
        }
    }

    pub fn raw_sql(
        id: impl Into<String>,
        sql_text: impl Into<String>,
        datasource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: DatasetKind::RawSql,
            sql_text: Some(sql_text.into()),
            table_name: None,
            datasource_id: datasource_id.into(),
        }
    }

    /// Builds a descriptor from the row layout the dataset store persists:
    /// a type tag, the physical table name and an `info` JSON blob that holds
    /// `{"sql": "..."}` for SQL datasets.
    pub fn from_stored(
        id: impl Into<String>,
        type_tag: &str,
        table_name: Option<String>,
        info: Option<&str>,
        datasource_id: impl Into<String>,
    ) -> quarry_error::Result<Self> {
        let id = id.into();
        let kind = DatasetKind::from_stored(type_tag).ok_or_else(|| {
            invalid_dataset(&id, None, format!("Unknown dataset type '{}'", type_tag))
        })?;

        let sql_text = match kind {
            DatasetKind::RawSql => {
                let raw = info.unwrap_or_default();
                let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                    invalid_dataset(&id, Some(kind), format!("Invalid dataset info: {}", e))
                })?;
                let sql = parsed
                    .get("sql")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        invalid_dataset(&id, Some(kind), "Dataset info has no 'sql' string")
                    })?;
                Some(sql.to_string())
            }
            DatasetKind::PhysicalTable => None,
        };

        Ok(Self {
            id,
            kind,
            sql_text,
            table_name: table_name.filter(|t| !t.is_empty()),
            datasource_id: datasource_id.into(),
        })
    }
}

fn invalid_dataset(
    id: &str,
    kind: Option<DatasetKind>,
    message: impl Into<String>,
) -> QuarryError {
    QuarryError::new(ErrorCode::InvalidDataset, message).with_context(ErrorContext::Dataset {
        dataset_id: id.to_string(),
        kind: kind.map(|k| k.to_string()),
    })
}

/// The stored chart definition. Axis blobs are decoded by the field spec model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    pub id: String,
    pub dataset_id: String,
    /// Dimension configuration, `{"fields": [...]}`
    #[serde(default)]
    pub x_axis: Option<String>,
    /// Measure configuration, `{"fields": [...]}`
    #[serde(default)]
    pub y_axis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Like,
    In,
    /// Anything else. The compiler drops these conditions.
    Other(String),
}

impl FilterOperator {
    pub fn as_str(&self) -> &str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::GtEq => ">=",
            FilterOperator::LtEq => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::Other(op) => op,
        }
    }
}

impl From<String> for FilterOperator {
    fn from(op: String) -> Self {
        match op.as_str() {
            "=" => Self::Eq,
            "!=" => Self::NotEq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::GtEq,
            "<=" => Self::LtEq,
            "LIKE" => Self::Like,
            "IN" => Self::In,
            _ => Self::Other(op),
        }
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> String {
        op.as_str().to_string()
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime filter supplied with a chart request. Values are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterCondition {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::from(operator.into()),
            value: value.into(),
        }
    }
}

/// Runtime part of a chart request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    /// Values of zero count as "not supplied".
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// A single result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Plain JSON form used in API responses. Timestamps render as RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int64(v) => serde_json::Value::from(*v),
            Value::Float64(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(v) => serde_json::Value::String(v.clone()),
            Value::Timestamp(v) => serde_json::Value::String(v.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Tabular query result: ordered columns and rows of cells in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Iterates rows as ordered (column, value) pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}

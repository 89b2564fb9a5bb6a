use serde::{Deserialize, Serialize};
use std::fmt;

/// Warehouse field type tag as it appears in a table schema.
///
/// Legacy and standard spellings (`INTEGER` / `INT64`) are kept distinct, the
/// remote side reports whichever one the table was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Int64,
    Float,
    Float64,
    Numeric,
    Bignumeric,
    Boolean,
    Bool,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Json,
    Record,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Int64 => "INT64",
            FieldType::Float => "FLOAT",
            FieldType::Float64 => "FLOAT64",
            FieldType::Numeric => "NUMERIC",
            FieldType::Bignumeric => "BIGNUMERIC",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Bool => "BOOL",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::Datetime => "DATETIME",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
            FieldType::Record => "RECORD",
            FieldType::Other(s) => s,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Int64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::Float | FieldType::Float64)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, FieldType::Boolean | FieldType::Bool)
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" => FieldType::Integer,
            "INT64" => FieldType::Int64,
            "FLOAT" => FieldType::Float,
            "FLOAT64" => FieldType::Float64,
            "NUMERIC" => FieldType::Numeric,
            "BIGNUMERIC" => FieldType::Bignumeric,
            "BOOLEAN" => FieldType::Boolean,
            "BOOL" => FieldType::Bool,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::Datetime,
            "GEOGRAPHY" => FieldType::Geography,
            "JSON" => FieldType::Json,
            "RECORD" => FieldType::Record,
            _ => FieldType::Other(s),
        }
    }
}

impl From<&str> for FieldType {
    fn from(s: &str) -> Self {
        FieldType::from(s.to_string())
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            description: None,
            fields: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = Some("REQUIRED".to_string());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

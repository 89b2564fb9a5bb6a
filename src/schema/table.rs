use serde::{Deserialize, Serialize};
use super::field::{Field, FieldType};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive lookup.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// `(lowercased name, type)` pairs sorted by name.
    pub fn normalized(&self) -> Vec<(String, FieldType)> {
        let mut pairs: Vec<(String, FieldType)> = self
            .fields
            .iter()
            .map(|f| (f.name.to_lowercase(), f.field_type.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Same `(name, type)` pairs, ignoring order and name case.
    pub fn matches(&self, other: &TableSchema) -> bool {
        self.normalized() == other.normalized()
    }

    /// Every `(name, type)` pair of `self` appears in `other`.
    pub fn is_subset_of(&self, other: &TableSchema) -> bool {
        let remote = other.normalized();
        self.normalized().iter().all(|field| remote.contains(field))
    }

    /// Local fields that have no counterpart in `other`, for error messages.
    pub fn missing_from(&self, other: &TableSchema) -> Vec<String> {
        let remote = other.normalized();
        self.fields
            .iter()
            .filter(|f| !remote.contains(&(f.name.to_lowercase(), f.field_type.clone())))
            .map(|f| format!("{} {}", f.name, f.field_type))
            .collect()
    }
}

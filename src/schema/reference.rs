use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GbqError, Result};

const PARTITION_SEPARATOR: char = '$';

/// `(project, dataset, table)` address of a table, optionally carrying a
/// `$YYYYMMDD` partition decorator on the table id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Parses `dataset.table[$partition]`.
    pub fn parse(project_id: &str, destination: &str) -> Result<Self> {
        let (dataset, table) = destination.rsplit_once('.').ok_or_else(|| {
            GbqError::NotFound(
                "Invalid Table Name. Should be of the form 'datasetId.tableId'".to_string(),
            )
        })?;

        if dataset.is_empty() || table.is_empty() {
            return Err(GbqError::NotFound(format!(
                "Invalid Table Name '{}'. Should be of the form 'datasetId.tableId'",
                destination
            )));
        }

        Ok(Self::new(project_id, dataset, table))
    }

    pub fn has_partition_decorator(&self) -> bool {
        contains_partition_decorator(&self.table_id)
    }

    /// Table id without the decorator.
    pub fn root_table_id(&self) -> &str {
        match self.table_id.rsplit_once(PARTITION_SEPARATOR) {
            Some((root, _)) => root,
            None => &self.table_id,
        }
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.table_id
            .rsplit_once(PARTITION_SEPARATOR)
            .map(|(_, partition)| partition)
    }

    /// Day of a `$YYYYMMDD` decorator, if it is one.
    pub fn partition_date(&self) -> Option<NaiveDate> {
        self.partition_id()
            .and_then(|p| NaiveDate::parse_from_str(p, "%Y%m%d").ok())
    }

    pub fn root(&self) -> TableReference {
        self.with_table_id(self.root_table_id())
    }

    pub fn with_table_id(&self, table_id: impl Into<String>) -> TableReference {
        TableReference::new(&self.project_id, &self.dataset_id, table_id)
    }

    pub fn for_partition(&self, date: NaiveDate) -> TableReference {
        self.with_table_id(format!(
            "{}{}{}",
            self.root_table_id(),
            PARTITION_SEPARATOR,
            date.format("%Y%m%d")
        ))
    }

    /// `dataset.table` form used in legacy SQL and upload destinations.
    pub fn dataset_table(&self) -> String {
        format!("{}.{}", self.dataset_id, self.table_id)
    }
}

pub fn contains_partition_decorator(table_id: &str) -> bool {
    table_id.contains(PARTITION_SEPARATOR)
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        let r = TableReference::parse("proj", "analytics.events").unwrap();
        assert_eq!(r, TableReference::new("proj", "analytics", "events"));
        assert!(!r.has_partition_decorator());
        assert_eq!(r.root_table_id(), "events");
        assert_eq!(r.partition_id(), None);
    }

    #[test]
    fn test_parse_destination_with_partition() {
        let r = TableReference::parse("proj", "analytics.events$20240615").unwrap();
        assert!(r.has_partition_decorator());
        assert_eq!(r.root_table_id(), "events");
        assert_eq!(r.partition_id(), Some("20240615"));
        assert_eq!(r.partition_date(), NaiveDate::from_ymd_opt(2024, 6, 15));
        assert_eq!(r.root().table_id, "events");
    }

    #[test]
    fn test_parse_destination_without_dataset() {
        let err = TableReference::parse("proj", "events").unwrap_err();
        assert!(matches!(err, GbqError::NotFound(_)));
        assert!(err.to_string().contains("Invalid Table Name"));
    }

    #[test]
    fn test_for_partition_replaces_decorator() {
        let r = TableReference::new("p", "d", "events$20240101");
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(r.for_partition(day).table_id, "events$20240229");
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(TableReference::new("p", "d", "t")).unwrap();
        assert_eq!(json["projectId"], "p");
        assert_eq!(json["datasetId"], "d");
        assert_eq!(json["tableId"], "t");
    }

    #[test]
    fn test_display() {
        assert_eq!(TableReference::new("p", "d", "t$20240101").to_string(), "p:d.t$20240101");
    }
}

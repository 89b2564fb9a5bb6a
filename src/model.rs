//! Wire shapes of the BigQuery v2 REST job API.
//!
//! Responses are decoded leniently: every field the service may omit is an
//! `Option`, unknown fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ErrorEntry, GbqError, Result};
use crate::schema::{TableReference, TableSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Query,
    Copy,
    Load,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Query => "query",
            JobKind::Copy => "copy",
            JobKind::Load => "load",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryJobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_large_results: Option<bool>,
    /// Client-side poll timeout; stripped before the job is posted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyJobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uris: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_leading_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Exactly one job kind with its options; serializes as `{"<kind>": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobConfiguration {
    Query(QueryJobConfig),
    Copy(CopyJobConfig),
    Load(LoadJobConfig),
}

impl JobConfiguration {
    pub fn kind(&self) -> JobKind {
        match self {
            JobConfiguration::Query(_) => JobKind::Query,
            JobConfiguration::Copy(_) => JobKind::Copy,
            JobConfiguration::Load(_) => JobKind::Load,
        }
    }

    /// Validates a free-form overlay such as `{"query": {"priority": "BATCH"}}`.
    pub fn from_overlay(overlay: &Value) -> Result<Self> {
        let map = overlay.as_object().ok_or_else(|| {
            GbqError::Configuration("job configuration must be a JSON object".to_string())
        })?;

        if map.len() != 1 {
            let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            return Err(GbqError::Configuration(format!(
                "Only one job type must be specified, but given {}",
                keys.join(",")
            )));
        }

        serde_json::from_value(overlay.clone()).map_err(|e| {
            GbqError::Configuration(format!("invalid job configuration: {}", e))
        })
    }

    pub fn as_query(&self) -> Option<&QueryJobConfig> {
        match self {
            JobConfiguration::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_query_mut(&mut self) -> Option<&mut QueryJobConfig> {
        match self {
            JobConfiguration::Query(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobState::Pending),
            "RUNNING" => Some(JobState::Running),
            "DONE" => Some(JobState::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error_result: Option<ErrorEntry>,
    #[serde(default)]
    pub errors: Option<Vec<ErrorEntry>>,
}

impl JobStatus {
    pub fn state(&self) -> Option<JobState> {
        self.state.as_deref().and_then(JobState::parse)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResource {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub statistics: Option<Value>,
}

impl JobResource {
    pub fn state(&self) -> Option<JobState> {
        self.status.as_ref().and_then(|s| s.state())
    }

    pub fn is_done(&self) -> bool {
        self.state() == Some(JobState::Done)
    }

    pub fn error_result(&self) -> Option<&ErrorEntry> {
        self.status.as_ref().and_then(|s| s.error_result.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(rename = "v", default)]
    pub value: Value,
}

/// Undecoded result row, `{"f": [{"v": ...}, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "f", default)]
    pub cells: Option<Vec<RawCell>>,
}

impl RawRow {
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            cells: Some(values.into_iter().map(|value| RawCell { value }).collect()),
        }
    }

    pub fn cells(&self) -> &[RawCell] {
        self.cells.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: Option<bool>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub rows: Option<Vec<RawRow>>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub cache_hit: Option<bool>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub total_bytes_processed: Option<u64>,
    #[serde(default)]
    pub errors: Option<Vec<ErrorEntry>>,
}

impl QueryResults {
    pub fn is_complete(&self) -> bool {
        self.job_complete.unwrap_or(false)
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRow {
    pub insert_id: String,
    pub json: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertAllRequest {
    pub rows: Vec<InsertRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertError {
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub errors: Option<Vec<ErrorEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAllResponse {
    #[serde(default)]
    pub insert_errors: Option<Vec<InsertError>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    #[serde(rename = "type")]
    pub partition_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl TimePartitioning {
    pub fn day() -> Self {
        Self {
            partition_type: "DAY".to_string(),
            field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResource {
    pub table_reference: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partitioning: Option<TimePartitioning>,
    #[serde(default, deserialize_with = "string_or_number", skip_serializing)]
    pub num_rows: Option<u64>,
}

impl TableResource {
    pub fn new(table_reference: TableReference, schema: TableSchema) -> Self {
        Self {
            table_reference,
            schema: Some(schema),
            time_partitioning: None,
            num_rows: None,
        }
    }

    pub fn with_time_partitioning(mut self, partitioning: TimePartitioning) -> Self {
        self.time_partitioning = Some(partitioning);
        self
    }

    pub fn is_partitioned(&self) -> bool {
        self.time_partitioning.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResource {
    pub dataset_reference: DatasetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableListEntry {
    pub table_reference: TableReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableList {
    #[serde(default)]
    pub tables: Option<Vec<TableListEntry>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListEntry {
    pub dataset_reference: DatasetReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetList {
    #[serde(default)]
    pub datasets: Option<Vec<DatasetListEntry>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// The REST API encodes 64-bit counters as strings; accept either form.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {}", n))),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected integer string, got '{}'", s))),
        Some(other) => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}

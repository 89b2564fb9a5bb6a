use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::Settings;
use crate::connector::Connector;
use crate::datasets::Datasets;
use crate::error::{GbqError, Result};
use crate::frame::Frame;
use crate::jobs::{Jobs, ResultSet};
use crate::model::QueryJobConfig;
use crate::reconcile::Reconciler;
use crate::schema::{TableReference, TableSchema};
use crate::tabledata::{InsertReport, Tabledata};
use crate::tables::Tables;
use crate::upload::{IfExists, Uploader};

/// Lowercased substrings that mark a query as partition-restricted.
const PARTITION_FILTERS: &[&str] = &["partitiondate", "_partitiontime", "_table_suffix", "$"];

const STRICT_MODE_MESSAGE: &str = "partition reference not found in query, please add a partitiondate, _partitiontime or _table_suffix restriction in the where-clause or set strict = False if you are confident in what you're doing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Standard,
    Legacy,
}

impl Dialect {
    pub fn use_legacy_sql(&self) -> bool {
        *self == Dialect::Legacy
    }
}

impl FromStr for Dialect {
    type Err = GbqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Dialect::Standard),
            "legacy" => Ok(Dialect::Legacy),
            other => Err(GbqError::Configuration(format!(
                "'{}' is not valid for dialect",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Batch,
    Interactive,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Batch => "BATCH",
            Priority::Interactive => "INTERACTIVE",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = GbqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BATCH" => Ok(Priority::Batch),
            "INTERACTIVE" => Ok(Priority::Interactive),
            other => Err(GbqError::Configuration(format!(
                "'{}' is not valid for priority",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub dialect: Dialect,
    pub priority: Priority,
    /// Overrides `Settings::strict` for this call.
    pub strict: Option<bool>,
    /// Job configuration overlay, e.g. `{"query": {"maximumBytesBilled": "1000"}}`.
    pub configuration: Option<Value>,
    pub timeout_ms: Option<u64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn configuration(mut self, configuration: Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

pub fn contains_partition_filter(query: &str) -> bool {
    let lowered = query.to_lowercase();
    PARTITION_FILTERS.iter().any(|f| lowered.contains(f))
}

/// Rejects queries without a partition restriction while `strict` is on.
pub fn check_strict(query: &str, strict: bool) -> Result<()> {
    if strict && !contains_partition_filter(query) {
        return Err(GbqError::StrictMode(STRICT_MODE_MESSAGE.to_string()));
    }
    Ok(())
}

/// Entry point tying the operation modules to one connector.
#[derive(Clone)]
pub struct BigQuery {
    connector: Connector,
    jobs: Jobs,
    tables: Tables,
    datasets: Datasets,
    tabledata: Tabledata,
}

impl BigQuery {
    pub fn new(connector: Connector) -> Self {
        Self {
            jobs: Jobs::new(connector.clone()),
            tables: Tables::new(connector.clone()),
            datasets: Datasets::new(connector.clone()),
            tabledata: Tabledata::new(connector.clone()),
            connector,
        }
    }

    pub async fn connect(settings: Settings) -> Result<Self> {
        Ok(Self::new(Connector::connect(settings).await?))
    }

    pub fn project_id(&self) -> &str {
        self.connector.project_id()
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn jobs(&self) -> &Jobs {
        &self.jobs
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    pub fn tabledata(&self) -> &Tabledata {
        &self.tabledata
    }

    pub fn table_reference(&self, destination: &str) -> Result<TableReference> {
        TableReference::parse(self.project_id(), destination)
    }

    /// Runs a query to completion and returns the schema with raw pages.
    pub async fn run_query_job(&self, query: &str, options: &QueryOptions) -> Result<ResultSet> {
        self.guard(query, options)?;

        let overlay = forced_overlay(options);
        let output = self
            .jobs
            .query(base_config(query, options), overlay.as_ref(), options.timeout_ms)
            .await?;

        Ok(output.result)
    }

    /// Runs a query and decodes the rows.
    pub async fn query(&self, query: &str, options: &QueryOptions) -> Result<Frame> {
        let result = self.run_query_job(query, options).await?;
        Frame::from_pages(&result.schema, &result.pages)
    }

    /// Submits a query and returns its job id without waiting.
    pub async fn submit_query_job(&self, query: &str, options: &QueryOptions) -> Result<String> {
        self.guard(query, options)?;

        let overlay = forced_overlay(options);
        self.jobs
            .query_async(base_config(query, options), overlay.as_ref())
            .await
    }

    pub async fn run_copy_job(
        &self,
        source: &TableReference,
        destination: &TableReference,
        configuration: Option<&Value>,
    ) -> Result<()> {
        self.jobs
            .copy(source.clone(), destination.clone(), configuration)
            .await?;
        Ok(())
    }

    /// Writes `frame` to `dataset.table` or `dataset.table$YYYYMMDD`.
    pub async fn upload(
        &self,
        frame: &Frame,
        destination: &str,
        if_exists: IfExists,
        chunk_size: Option<usize>,
    ) -> Result<InsertReport> {
        let destination = self.table_reference(destination)?;
        Uploader::new(self.connector.clone())
            .upload(frame, &destination, if_exists, chunk_size)
            .await
    }

    pub async fn schemas_equivalent(
        &self,
        dataset_id: &str,
        table_id: &str,
        schema: &TableSchema,
    ) -> Result<bool> {
        let table = self.tables.reference(dataset_id, table_id);
        Reconciler::new(self.connector.clone())
            .verify_schema(&table, schema)
            .await
    }

    pub async fn is_subset(
        &self,
        dataset_id: &str,
        table_id: &str,
        schema: &TableSchema,
    ) -> Result<bool> {
        let table = self.tables.reference(dataset_id, table_id);
        Reconciler::new(self.connector.clone())
            .verify_subset(&table, schema)
            .await
    }

    fn guard(&self, query: &str, options: &QueryOptions) -> Result<()> {
        let strict = options.strict.unwrap_or(self.connector.settings().strict);
        check_strict(query, strict)?;
        debug!("Query passed strict check (strict = {})", strict);
        Ok(())
    }
}

fn base_config(query: &str, options: &QueryOptions) -> QueryJobConfig {
    QueryJobConfig {
        query: Some(query.to_string()),
        use_legacy_sql: Some(options.dialect.use_legacy_sql()),
        priority: Some(options.priority.as_str().to_string()),
        ..Default::default()
    }
}

/// Dialect and priority come from the call, not the overlay.
fn forced_overlay(options: &QueryOptions) -> Option<Value> {
    let mut overlay = options.configuration.clone()?;

    if let Some(query) = overlay.get_mut("query").and_then(Value::as_object_mut) {
        query.insert(
            "useLegacySql".to_string(),
            Value::Bool(options.dialect.use_legacy_sql()),
        );
        query.insert(
            "priority".to_string(),
            Value::String(options.priority.as_str().to_string()),
        );
    }

    Some(overlay)
}

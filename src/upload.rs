use arrow::array::{Array, Int64Array};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connector::Connector;
use crate::error::{GbqError, Result};
use crate::frame::Frame;
use crate::jobs::Jobs;
use crate::model::{JobConfiguration, JobKind, QueryJobConfig, TableResource};
use crate::reconcile::require_subset;
use crate::schema::{TableReference, TableSchema};
use crate::tabledata::{InsertReport, Tabledata};
use crate::tables::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    #[default]
    Fail,
    Replace,
    Append,
}

impl FromStr for IfExists {
    type Err = GbqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            other => Err(GbqError::Configuration(format!(
                "'{}' is not valid for if_exists",
                other
            ))),
        }
    }
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfExists::Fail => write!(f, "fail"),
            IfExists::Replace => write!(f, "replace"),
            IfExists::Append => write!(f, "append"),
        }
    }
}

/// Writes a frame into a table or a single `$YYYYMMDD` partition.
pub struct Uploader {
    connector: Connector,
    tables: Tables,
    tabledata: Tabledata,
    jobs: Jobs,
}

impl Uploader {
    pub fn new(connector: Connector) -> Self {
        Self {
            tables: Tables::new(connector.clone()),
            tabledata: Tabledata::new(connector.clone()),
            jobs: Jobs::new(connector.clone()),
            connector,
        }
    }

    pub async fn upload(
        &self,
        frame: &Frame,
        destination: &TableReference,
        if_exists: IfExists,
        chunk_size: Option<usize>,
    ) -> Result<InsertReport> {
        let chunk_size = chunk_size.unwrap_or(self.connector.settings().chunk_size);
        let schema = frame.table_schema();

        if destination.has_partition_decorator() {
            self.upload_partition(frame, &schema, destination, if_exists, chunk_size)
                .await
        } else {
            self.upload_table(frame, &schema, destination, if_exists, chunk_size)
                .await
        }
    }

    async fn upload_table(
        &self,
        frame: &Frame,
        schema: &TableSchema,
        destination: &TableReference,
        if_exists: IfExists,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        if self.tables.exists(destination).await? {
            match if_exists {
                IfExists::Fail => {
                    return Err(GbqError::TableCreation(
                        "Could not create the table because it already exists. Change the if_exists parameter to append or replace data."
                            .to_string(),
                    ));
                }
                IfExists::Replace => {
                    self.tables.delete_and_recreate(destination, schema).await?;
                }
                IfExists::Append => {
                    let remote = self.tables.get_schema(destination).await?;
                    require_subset(schema, &remote)?;
                }
            }
        } else {
            self.tables.insert(destination, schema, None).await?;
        }

        self.tabledata.insert_frame(destination, frame, chunk_size).await
    }

    async fn upload_partition(
        &self,
        frame: &Frame,
        schema: &TableSchema,
        destination: &TableReference,
        if_exists: IfExists,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        let root = destination.root();

        if !self.tables.exists(&root).await? {
            return Err(GbqError::NotFound(
                "Could not write to the partition because the table does not exist.".to_string(),
            ));
        }

        let root_table = self.tables.get(&root).await?;
        if !root_table.is_partitioned() {
            return Err(GbqError::InvalidSchema(
                "Could not write to the partition because the table is not partitioned."
                    .to_string(),
            ));
        }

        if self.partition_row_count(destination).await? == 0 {
            return self.tabledata.insert_frame(destination, frame, chunk_size).await;
        }

        match if_exists {
            IfExists::Fail => Err(GbqError::TableCreation(
                "Could not create the partition because it already exists. Change the if_exists parameter to append or replace data."
                    .to_string(),
            )),
            IfExists::Append => {
                require_subset(schema, &remote_schema(&root_table))?;
                self.tabledata.insert_frame(destination, frame, chunk_size).await
            }
            IfExists::Replace => {
                require_subset(schema, &remote_schema(&root_table))?;
                self.replace_partition(frame, schema, destination, chunk_size).await
            }
        }
    }

    /// Stages the frame in a temporary table and overwrites the partition
    /// with one server-side `WRITE_TRUNCATE` query. The live partition never
    /// receives a direct write.
    async fn replace_partition(
        &self,
        frame: &Frame,
        schema: &TableSchema,
        destination: &TableReference,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        let temp = destination.with_table_id(temporary_table_id(destination));
        info!("Staging partition {} in {}", destination, temp);

        self.tables.insert(&temp, schema, None).await?;

        let outcome = self.stage_and_overwrite(frame, &temp, destination, chunk_size).await;

        match outcome {
            Ok(report) => {
                self.tables.delete_if_present(&temp).await?;
                Ok(report)
            }
            Err(e) => {
                if let Err(cleanup) = self.tables.delete_if_present(&temp).await {
                    warn!("Could not delete temporary table {}: {}", temp, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn stage_and_overwrite(
        &self,
        frame: &Frame,
        temp: &TableReference,
        destination: &TableReference,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        let report = self.tabledata.insert_frame(temp, frame, chunk_size).await?;

        // Streamed rows are not visible to queries right away.
        tokio::time::sleep(self.connector.settings().consistency_delay()).await;

        let config = QueryJobConfig {
            query: Some(format!("select * from {}", temp.dataset_table())),
            use_legacy_sql: Some(false),
            priority: Some("INTERACTIVE".to_string()),
            destination_table: Some(destination.clone()),
            create_disposition: Some("CREATE_IF_NEEDED".to_string()),
            write_disposition: Some("WRITE_TRUNCATE".to_string()),
            allow_large_results: Some(true),
            ..Default::default()
        };

        // The overwrite returns no rows worth reading; wait for completion only.
        let handle = self
            .jobs
            .submitter()
            .submit(JobKind::Query, JobConfiguration::Query(config), None)
            .await?;
        self.jobs.poller().await_query(&handle, None).await?;
        info!("Replaced partition {}", destination);

        Ok(report)
    }

    /// Row count of one partition via a legacy-SQL `COUNT(*)`.
    pub async fn partition_row_count(&self, partition: &TableReference) -> Result<i64> {
        let config = QueryJobConfig {
            query: Some(format!(
                "SELECT COUNT(*) AS num_rows FROM [{}]",
                partition.dataset_table()
            )),
            use_legacy_sql: Some(true),
            priority: Some("INTERACTIVE".to_string()),
            ..Default::default()
        };

        let output = self.jobs.query(config, None, None).await?;
        let frame = Frame::from_pages(&output.result.schema, &output.result.pages)?;

        let Some(column) = frame.column("num_rows") else {
            return Ok(0);
        };
        let counts = column.as_any().downcast_ref::<Int64Array>().ok_or_else(|| {
            GbqError::Decode(format!(
                "unexpected partition row count type {}",
                column.data_type()
            ))
        })?;

        if counts.is_empty() || counts.is_null(0) {
            Ok(0)
        } else {
            Ok(counts.value(0))
        }
    }
}

fn remote_schema(table: &TableResource) -> TableSchema {
    table.schema.clone().unwrap_or_default()
}

fn temporary_table_id(destination: &TableReference) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        destination.root_table_id(),
        destination.partition_id().unwrap_or_default(),
        &suffix[..8]
    )
}

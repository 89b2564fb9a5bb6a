mod paginate;
mod poll;
mod submit;

use serde_json::Value;
use tracing::info;

use crate::connector::{Connector, ProgressEvent, Stopwatch};
use crate::error::Result;
use crate::model::{
    CopyJobConfig, JobConfiguration, JobKind, JobResource, LoadJobConfig, QueryJobConfig,
    QueryResults,
};
use crate::schema::TableReference;

pub use paginate::{Paginator, ResultPage, ResultSet};
pub use poll::Poller;
pub use submit::{merge_configuration, Submitter};

/// A submitted job. Lives for the duration of polling and paging.
#[derive(Debug, Clone)]
pub struct JobHandle {
    project_id: String,
    job_id: String,
    location: Option<String>,
    kind: JobKind,
    stopwatch: Stopwatch,
    timeout_ms: Option<u64>,
    initial: JobResource,
}

impl JobHandle {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }

    /// `timeoutMs` taken from the configuration overlay, if any.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    /// Job resource as returned by `jobs.insert`.
    pub fn initial(&self) -> &JobResource {
        &self.initial
    }
}

#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub job_id: String,
    pub result: ResultSet,
    pub cache_hit: bool,
    pub bytes_processed: Option<u64>,
}

/// Submit / wait / page in one call per job kind.
#[derive(Clone)]
pub struct Jobs {
    connector: Connector,
}

impl Jobs {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn submitter(&self) -> Submitter<'_> {
        Submitter::new(&self.connector)
    }

    pub fn poller(&self) -> Poller<'_> {
        Poller::new(&self.connector)
    }

    pub fn paginator(&self) -> Paginator<'_> {
        Paginator::new(&self.connector)
    }

    pub async fn query(
        &self,
        config: QueryJobConfig,
        overlay: Option<&Value>,
        timeout_ms: Option<u64>,
    ) -> Result<QueryOutput> {
        let handle = self
            .submitter()
            .submit(JobKind::Query, JobConfiguration::Query(config), overlay)
            .await?;

        let first_page = self.poller().await_query(&handle, timeout_ms).await?;
        self.report_completion(&first_page);

        let cache_hit = first_page.cache_hit.unwrap_or(false);
        let bytes_processed = first_page.total_bytes_processed;
        let result = self.paginator().drain(&handle, first_page).await?;

        info!(
            "Got {} rows. Total time taken {} s.",
            result.row_count(),
            handle.stopwatch().elapsed_secs()
        );

        Ok(QueryOutput {
            job_id: handle.job_id().to_string(),
            result,
            cache_hit,
            bytes_processed,
        })
    }

    /// Submits without waiting; returns the job id.
    pub async fn query_async(&self, config: QueryJobConfig, overlay: Option<&Value>) -> Result<String> {
        let handle = self
            .submitter()
            .submit(JobKind::Query, JobConfiguration::Query(config), overlay)
            .await?;

        Ok(handle.job_id().to_string())
    }

    pub async fn copy(
        &self,
        source: TableReference,
        destination: TableReference,
        overlay: Option<&Value>,
    ) -> Result<JobResource> {
        info!("Copying {} to {}", source, destination);

        let base = CopyJobConfig {
            source_table: Some(source),
            destination_table: Some(destination),
            ..Default::default()
        };

        let handle = self
            .submitter()
            .submit(JobKind::Copy, JobConfiguration::Copy(base), overlay)
            .await?;

        self.poller().await_job(&handle, None).await
    }

    pub async fn load(&self, config: LoadJobConfig, overlay: Option<&Value>) -> Result<JobResource> {
        let handle = self
            .submitter()
            .submit(JobKind::Load, JobConfiguration::Load(config), overlay)
            .await?;

        self.poller().await_job(&handle, None).await
    }

    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        self.connector
            .transport()
            .cancel_job(self.connector.project_id(), job_id, self.connector.location())
            .await
            .map_err(|e| self.connector.translate(e))?;

        info!("Cancellation requested for job {}", job_id);
        Ok(())
    }

    fn report_completion(&self, results: &QueryResults) {
        self.connector.report(ProgressEvent::QueryDone {
            cache_hit: results.cache_hit.unwrap_or(false),
            bytes_processed: results.total_bytes_processed,
        });
    }
}

use tracing::{debug, warn};

use crate::connector::Connector;
use crate::error::{GbqError, Result};
use crate::model::{JobResource, QueryResults, QueryResultsParams};
use super::JobHandle;

pub struct Poller<'a> {
    connector: &'a Connector,
}

impl<'a> Poller<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self { connector }
    }

    /// Polls `jobs.get` until the job reports DONE. A DONE job carrying an
    /// `errorResult` is a failure.
    pub async fn await_job(&self, handle: &JobHandle, timeout_ms: Option<u64>) -> Result<JobResource> {
        let timeout_ms = timeout_ms.or(handle.timeout_ms());
        let mut job = handle.initial().clone();

        while !job.is_done() {
            self.check_timeout(handle, timeout_ms).await?;

            job = self
                .connector
                .transport()
                .get_job(handle.project_id(), handle.job_id(), handle.location())
                .await
                .map_err(|e| self.connector.translate(e))?;

            self.connector.report_elapsed(handle.stopwatch());
            debug!("Job {} state: {:?}", handle.job_id(), job.state());

            if !job.is_done() {
                tokio::time::sleep(self.connector.settings().poll_interval()).await;
            }
        }

        if let Some(failure) = job.error_result() {
            return Err(GbqError::Generic {
                message: format!("Reason: {}, Message: {}", failure.reason, failure.message),
                reason: Some(failure.reason.clone()),
                status: None,
            });
        }

        Ok(job)
    }

    /// Polls `jobs.getQueryResults` with zero rows requested until the query
    /// completes; the returned response carries schema and `totalRows`.
    pub async fn await_query(&self, handle: &JobHandle, timeout_ms: Option<u64>) -> Result<QueryResults> {
        let timeout_ms = timeout_ms.or(handle.timeout_ms());
        let params = QueryResultsParams {
            page_token: None,
            max_results: Some(0),
            location: handle.location().map(String::from),
        };

        loop {
            self.check_timeout(handle, timeout_ms).await?;

            let results = self
                .connector
                .transport()
                .get_query_results(handle.project_id(), handle.job_id(), &params)
                .await
                .map_err(|e| self.connector.translate(e))?;

            self.connector.report_elapsed(handle.stopwatch());

            if results.is_complete() {
                return Ok(results);
            }

            debug!("Query {} not complete yet", handle.job_id());
            tokio::time::sleep(self.connector.settings().poll_interval()).await;
        }
    }

    async fn check_timeout(&self, handle: &JobHandle, timeout_ms: Option<u64>) -> Result<()> {
        let Some(limit) = timeout_ms else {
            return Ok(());
        };

        let elapsed_ms = handle.stopwatch().elapsed_ms();
        if elapsed_ms <= limit {
            return Ok(());
        }

        if self.connector.settings().cancel_on_timeout {
            if let Err(e) = self
                .connector
                .transport()
                .cancel_job(handle.project_id(), handle.job_id(), handle.location())
                .await
            {
                warn!("Failed to cancel job {} after timeout: {}", handle.job_id(), e);
            }
        } else {
            warn!("Job {} left running after client timeout", handle.job_id());
        }

        Err(GbqError::QueryTimeout {
            timeout_ms: limit,
            elapsed_ms,
        })
    }
}

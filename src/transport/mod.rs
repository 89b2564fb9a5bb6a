mod bigquery;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::model::{
    DatasetList, DatasetResource, InsertAllRequest, InsertAllResponse, JobRequest, JobResource,
    QueryResults, QueryResultsParams, TableList, TableResource,
};
use crate::schema::TableReference;

pub use bigquery::BqTransport;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// The REST calls the job protocol consumes. One implementation talks to
/// BigQuery; tests substitute a scripted double.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn insert_job(&self, project_id: &str, job: &JobRequest) -> TransportResult<JobResource>;

    async fn get_job(
        &self,
        project_id: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> TransportResult<JobResource>;

    async fn get_query_results(
        &self,
        project_id: &str,
        job_id: &str,
        params: &QueryResultsParams,
    ) -> TransportResult<QueryResults>;

    async fn cancel_job(
        &self,
        project_id: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> TransportResult<()>;

    async fn insert_all(
        &self,
        table: &TableReference,
        request: &InsertAllRequest,
    ) -> TransportResult<InsertAllResponse>;

    async fn get_table(&self, table: &TableReference) -> TransportResult<TableResource>;

    async fn insert_table(&self, table: &TableResource) -> TransportResult<TableResource>;

    async fn delete_table(&self, table: &TableReference) -> TransportResult<()>;

    async fn list_tables(
        &self,
        project_id: &str,
        dataset_id: &str,
        page_token: Option<&str>,
    ) -> TransportResult<TableList>;

    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> TransportResult<DatasetResource>;

    async fn insert_dataset(&self, dataset: &DatasetResource) -> TransportResult<DatasetResource>;

    async fn delete_dataset(
        &self,
        project_id: &str,
        dataset_id: &str,
        delete_contents: bool,
    ) -> TransportResult<()>;

    async fn list_datasets(
        &self,
        project_id: &str,
        page_token: Option<&str>,
    ) -> TransportResult<DatasetList>;
}

use async_trait::async_trait;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{parse_bq_error, ErrorContext, TransportError};
use crate::model::{
    DatasetList, DatasetResource, InsertAllRequest, InsertAllResponse, JobRequest, JobResource,
    QueryResults, QueryResultsParams, TableList, TableResource,
};
use crate::schema::TableReference;
use super::{Transport, TransportResult};

/// [`Transport`] backed by `gcp_bigquery_client`.
#[derive(Clone)]
pub struct BqTransport {
    client: Client,
}

impl BqTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_application_default_credentials() -> TransportResult<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                parse_bq_error(e, ctx)
            })?;

        Ok(Self { client })
    }

    pub async fn from_service_account_key_file(path: &str) -> TransportResult<Self> {
        let client = Client::from_service_account_key_file(path)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                parse_bq_error(e, ctx)
            })?;

        Ok(Self { client })
    }
}

/// Moves a value between our wire model and the client's model types.
/// Both mirror the REST JSON representation, so a JSON round trip suffices.
fn convert<T: Serialize, U: DeserializeOwned>(value: &T) -> TransportResult<U> {
    let json = serde_json::to_value(value).map_err(|e| TransportError::Decode {
        message: e.to_string(),
    })?;
    serde_json::from_value(json).map_err(|e| TransportError::Decode {
        message: e.to_string(),
    })
}

#[async_trait]
impl Transport for BqTransport {
    async fn insert_job(&self, project_id: &str, job: &JobRequest) -> TransportResult<JobResource> {
        let body: Job = convert(job)?;

        let reply = self.client
            .job()
            .insert(project_id, body)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("jobs.insert");
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn get_job(
        &self,
        project_id: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> TransportResult<JobResource> {
        let reply = self.client
            .job()
            .get_job(project_id, job_id, location)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("jobs.get")
                    .with_job(project_id, job_id);
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn get_query_results(
        &self,
        project_id: &str,
        job_id: &str,
        params: &QueryResultsParams,
    ) -> TransportResult<QueryResults> {
        let parameters: GetQueryResultsParameters = convert(params)?;

        let reply = self.client
            .job()
            .get_query_results(project_id, job_id, parameters)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("jobs.getQueryResults")
                    .with_job(project_id, job_id);
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn cancel_job(
        &self,
        project_id: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> TransportResult<()> {
        self.client
            .job()
            .cancel_job(project_id, job_id, location)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("jobs.cancel")
                    .with_job(project_id, job_id);
                parse_bq_error(e, ctx)
            })?;

        Ok(())
    }

    async fn insert_all(
        &self,
        table: &TableReference,
        request: &InsertAllRequest,
    ) -> TransportResult<InsertAllResponse> {
        let ctx = ErrorContext::new()
            .with_operation("tabledata.insertAll")
            .with_table(&table.project_id, &table.dataset_id, &table.table_id);

        let mut insert_request = TableDataInsertAllRequest::new();
        for row in &request.rows {
            insert_request
                .add_row(Some(row.insert_id.clone()), &row.json)
                .map_err(|e| parse_bq_error(e, ctx.clone()))?;
        }

        debug!("Streaming {} rows into {}", request.rows.len(), table);

        let reply = self.client
            .tabledata()
            .insert_all(&table.project_id, &table.dataset_id, &table.table_id, insert_request)
            .await
            .map_err(|e| parse_bq_error(e, ctx))?;

        convert(&reply)
    }

    async fn get_table(&self, table: &TableReference) -> TransportResult<TableResource> {
        let reply = self.client
            .table()
            .get(&table.project_id, &table.dataset_id, &table.table_id, None)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("tables.get")
                    .with_table(&table.project_id, &table.dataset_id, &table.table_id);
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn insert_table(&self, table: &TableResource) -> TransportResult<TableResource> {
        let body: Table = convert(table)?;
        let reference = &table.table_reference;

        let reply = self.client
            .table()
            .create(body)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("tables.insert")
                    .with_table(&reference.project_id, &reference.dataset_id, &reference.table_id);
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn delete_table(&self, table: &TableReference) -> TransportResult<()> {
        self.client
            .table()
            .delete(&table.project_id, &table.dataset_id, &table.table_id)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("tables.delete")
                    .with_table(&table.project_id, &table.dataset_id, &table.table_id);
                parse_bq_error(e, ctx)
            })
    }

    async fn list_tables(
        &self,
        project_id: &str,
        dataset_id: &str,
        page_token: Option<&str>,
    ) -> TransportResult<TableList> {
        let mut options = gcp_bigquery_client::table::ListOptions::default();
        if let Some(token) = page_token {
            options = options.page_token(token.to_string());
        }

        let reply = self.client
            .table()
            .list(project_id, dataset_id, options)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("tables.list");
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> TransportResult<DatasetResource> {
        let reply = self.client
            .dataset()
            .get(project_id, dataset_id)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("datasets.get");
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn insert_dataset(&self, dataset: &DatasetResource) -> TransportResult<DatasetResource> {
        let body: Dataset = convert(dataset)?;

        let reply = self.client
            .dataset()
            .create(body)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("datasets.insert");
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }

    async fn delete_dataset(
        &self,
        project_id: &str,
        dataset_id: &str,
        delete_contents: bool,
    ) -> TransportResult<()> {
        self.client
            .dataset()
            .delete(project_id, dataset_id, delete_contents)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("datasets.delete");
                parse_bq_error(e, ctx)
            })
    }

    async fn list_datasets(
        &self,
        project_id: &str,
        page_token: Option<&str>,
    ) -> TransportResult<DatasetList> {
        let mut options = gcp_bigquery_client::dataset::ListOptions::default();
        if let Some(token) = page_token {
            options = options.page_token(token.to_string());
        }

        let reply = self.client
            .dataset()
            .list(project_id, options)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("datasets.list");
                parse_bq_error(e, ctx)
            })?;

        convert(&reply)
    }
}

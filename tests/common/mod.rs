#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use bqframe::config::Settings;
use bqframe::connector::{Connector, CredentialKind, Progress, ProgressEvent};
use bqframe::error::{ErrorEntry, TransportError};
use bqframe::model::{
    DatasetList, DatasetListEntry, DatasetReference, DatasetResource, InsertAllRequest,
    InsertAllResponse, InsertError, JobConfiguration, JobReference, JobRequest, JobResource,
    JobStatus, QueryResults, QueryResultsParams, RawRow, TableList, TableListEntry,
    TableResource, TimePartitioning,
};
use bqframe::schema::{Field, TableReference, TableSchema};
use bqframe::transport::{Transport, TransportResult};

pub const PROJECT: &str = "test-project";

/// Every boundary call the mock received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    InsertJob(JobRequest),
    GetJob(String),
    GetQueryResults {
        job_id: String,
        page_token: Option<String>,
        max_results: Option<u32>,
    },
    CancelJob(String),
    InsertAll {
        table: TableReference,
        insert_ids: Vec<String>,
    },
    GetTable(TableReference),
    InsertTable(TableReference),
    DeleteTable(TableReference),
    ListTables(String),
    GetDataset(String),
    InsertDataset(String),
    DeleteDataset(String),
    ListDatasets,
}

/// Scripted answers for one query job.
#[derive(Debug, Clone, Default)]
pub struct QueryScript {
    /// Zero-row polls answered with `jobComplete: false` before completing.
    pub pending_polls: usize,
    pub completion: QueryResults,
    /// Pages keyed by the token used to request them; `None` is the first page.
    pub pages: HashMap<Option<String>, QueryResults>,
}

impl QueryScript {
    pub fn empty() -> Self {
        Self {
            pending_polls: 0,
            completion: completion(TableSchema::new(), 0),
            pages: HashMap::new(),
        }
    }

    pub fn never_completes() -> Self {
        Self {
            pending_polls: usize::MAX,
            ..Self::empty()
        }
    }

    /// `chain` lists `(requesting token, rows, next token)` per page.
    pub fn paged(
        schema: TableSchema,
        total_rows: u64,
        chain: Vec<(Option<&str>, Vec<RawRow>, Option<&str>)>,
    ) -> Self {
        let pages = chain
            .into_iter()
            .map(|(token, rows, next)| (token.map(String::from), page(rows, next)))
            .collect();

        Self {
            pending_polls: 0,
            completion: completion(schema, total_rows),
            pages,
        }
    }

    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }
}

pub fn completion(schema: TableSchema, total_rows: u64) -> QueryResults {
    QueryResults {
        job_complete: Some(true),
        schema: Some(schema),
        total_rows: Some(total_rows),
        ..Default::default()
    }
}

pub fn page(rows: Vec<RawRow>, next_token: Option<&str>) -> QueryResults {
    QueryResults {
        job_complete: Some(true),
        rows: Some(rows),
        page_token: next_token.map(String::from),
        ..Default::default()
    }
}

/// Rows of string cells, the way the service encodes them.
pub fn rows(values: &[&[&str]]) -> Vec<RawRow> {
    values
        .iter()
        .map(|row| RawRow::from_values(row.iter().map(|v| json!(v))))
        .collect()
}

pub fn int_rows(range: std::ops::Range<u64>) -> Vec<RawRow> {
    range
        .map(|n| RawRow::from_values([json!(n.to_string())]))
        .collect()
}

pub fn schema(fields: &[(&str, &str)]) -> TableSchema {
    TableSchema::from_fields(fields.iter().map(|(n, t)| Field::new(*n, *t)).collect())
}

pub fn done_job(error: Option<ErrorEntry>) -> JobResource {
    JobResource {
        job_reference: None,
        status: Some(JobStatus {
            state: Some("DONE".to_string()),
            error_result: error,
            errors: None,
        }),
        statistics: None,
    }
}

pub fn running_job() -> JobResource {
    JobResource {
        job_reference: None,
        status: Some(JobStatus {
            state: Some("RUNNING".to_string()),
            ..Default::default()
        }),
        statistics: None,
    }
}

pub fn table(dataset: &str, table_id: &str, fields: &[(&str, &str)], partitioned: bool) -> TableResource {
    let mut resource = TableResource::new(TableReference::new(PROJECT, dataset, table_id), schema(fields));
    if partitioned {
        resource = resource.with_time_partitioning(TimePartitioning::day());
    }
    resource
}

pub fn row_error(index: u64, reason: &str, location: &str, message: &str) -> InsertAllResponse {
    InsertAllResponse {
        insert_errors: Some(vec![InsertError {
            index,
            errors: Some(vec![ErrorEntry {
                reason: reason.to_string(),
                message: message.to_string(),
                location: Some(location.to_string()),
            }]),
        }]),
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_job: u32,
    query_scripts: Vec<(String, QueryScript)>,
    default_script: Option<QueryScript>,
    job_scripts: HashMap<String, QueryScript>,
    job_statuses: VecDeque<JobResource>,
    insert_job_error: Option<TransportError>,
    failing_queries: Vec<(String, TransportError)>,
    insert_all_responses: VecDeque<InsertAllResponse>,
    tables: HashMap<String, TableResource>,
    datasets: HashSet<String>,
}

fn table_key(table: &TableReference) -> String {
    format!("{}.{}", table.dataset_id, table.table_id)
}

/// In-memory stand-in for the BigQuery REST API.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Query jobs whose SQL contains `needle` follow `script`.
    pub fn script_query(&self, needle: &str, script: QueryScript) {
        self.state.lock().unwrap().query_scripts.push((needle.to_string(), script));
    }

    pub fn set_default_script(&self, script: QueryScript) {
        self.state.lock().unwrap().default_script = Some(script);
    }

    pub fn push_job_status(&self, job: JobResource) {
        self.state.lock().unwrap().job_statuses.push_back(job);
    }

    pub fn fail_next_insert_job(&self, err: TransportError) {
        self.state.lock().unwrap().insert_job_error = Some(err);
    }

    /// Query jobs whose SQL contains `needle` are rejected by `jobs.insert`.
    pub fn fail_query(&self, needle: &str, err: TransportError) {
        self.state.lock().unwrap().failing_queries.push((needle.to_string(), err));
    }

    pub fn push_insert_all_response(&self, response: InsertAllResponse) {
        self.state.lock().unwrap().insert_all_responses.push_back(response);
    }

    pub fn add_table(&self, table: TableResource) {
        let mut state = self.state.lock().unwrap();
        state.datasets.insert(table.table_reference.dataset_id.clone());
        state.tables.insert(table_key(&table.table_reference), table);
    }

    pub fn add_dataset(&self, dataset: &str) {
        self.state.lock().unwrap().datasets.insert(dataset.to_string());
    }

    pub fn has_table(&self, dataset: &str, table_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .contains_key(&format!("{}.{}", dataset, table_id))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn posted_jobs(&self) -> Vec<JobRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::InsertJob(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    pub fn insert_all_calls(&self) -> Vec<(TableReference, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::InsertAll { table, insert_ids } => Some((table, insert_ids)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn insert_job(&self, project_id: &str, job: &JobRequest) -> TransportResult<JobResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InsertJob(job.clone()));

        if let Some(err) = state.insert_job_error.take() {
            return Err(err);
        }

        if let JobConfiguration::Query(query) = &job.configuration {
            let sql = query.query.as_deref().unwrap_or_default();
            let failure = state
                .failing_queries
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()));
            if let Some((_, err)) = failure {
                return Err(err.clone());
            }
        }

        state.next_job += 1;
        let job_id = format!("job_{}", state.next_job);

        let script = match &job.configuration {
            JobConfiguration::Query(query) => {
                let sql = query.query.clone().unwrap_or_default();
                state
                    .query_scripts
                    .iter()
                    .find(|(needle, _)| sql.contains(needle.as_str()))
                    .map(|(_, script)| script.clone())
                    .or_else(|| state.default_script.clone())
                    .unwrap_or_else(QueryScript::empty)
            }
            _ => QueryScript::empty(),
        };
        state.job_scripts.insert(job_id.clone(), script);

        Ok(JobResource {
            job_reference: Some(JobReference {
                project_id: project_id.to_string(),
                job_id,
                location: None,
            }),
            status: Some(JobStatus {
                state: Some("PENDING".to_string()),
                ..Default::default()
            }),
            statistics: None,
        })
    }

    async fn get_job(
        &self,
        _project_id: &str,
        job_id: &str,
        _location: Option<&str>,
    ) -> TransportResult<JobResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetJob(job_id.to_string()));
        Ok(state.job_statuses.pop_front().unwrap_or_else(|| done_job(None)))
    }

    async fn get_query_results(
        &self,
        _project_id: &str,
        job_id: &str,
        params: &QueryResultsParams,
    ) -> TransportResult<QueryResults> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetQueryResults {
            job_id: job_id.to_string(),
            page_token: params.page_token.clone(),
            max_results: params.max_results,
        });

        let script = state
            .job_scripts
            .get_mut(job_id)
            .ok_or_else(|| TransportError::not_found(format!("Not found: Job {}", job_id)))?;

        if params.max_results == Some(0) {
            if script.pending_polls > 0 {
                script.pending_polls -= 1;
                return Ok(QueryResults {
                    job_complete: Some(false),
                    ..Default::default()
                });
            }
            return Ok(script.completion.clone());
        }

        script
            .pages
            .get(&params.page_token)
            .cloned()
            .ok_or_else(|| TransportError::not_found(format!("Not found: page {:?}", params.page_token)))
    }

    async fn cancel_job(
        &self,
        _project_id: &str,
        job_id: &str,
        _location: Option<&str>,
    ) -> TransportResult<()> {
        self.record(Call::CancelJob(job_id.to_string()));
        Ok(())
    }

    async fn insert_all(
        &self,
        table: &TableReference,
        request: &InsertAllRequest,
    ) -> TransportResult<InsertAllResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InsertAll {
            table: table.clone(),
            insert_ids: request.rows.iter().map(|r| r.insert_id.clone()).collect(),
        });
        Ok(state.insert_all_responses.pop_front().unwrap_or_default())
    }

    async fn get_table(&self, table: &TableReference) -> TransportResult<TableResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetTable(table.clone()));
        state
            .tables
            .get(&table_key(table))
            .cloned()
            .ok_or_else(|| TransportError::not_found(format!("Not found: Table {}", table)))
    }

    async fn insert_table(&self, table: &TableResource) -> TransportResult<TableResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InsertTable(table.table_reference.clone()));
        state.tables.insert(table_key(&table.table_reference), table.clone());
        Ok(table.clone())
    }

    async fn delete_table(&self, table: &TableReference) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteTable(table.clone()));
        state
            .tables
            .remove(&table_key(table))
            .map(|_| ())
            .ok_or_else(|| TransportError::not_found(format!("Not found: Table {}", table)))
    }

    async fn list_tables(
        &self,
        _project_id: &str,
        dataset_id: &str,
        _page_token: Option<&str>,
    ) -> TransportResult<TableList> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListTables(dataset_id.to_string()));

        let mut tables: Vec<TableListEntry> = state
            .tables
            .values()
            .filter(|t| t.table_reference.dataset_id == dataset_id)
            .map(|t| TableListEntry {
                table_reference: t.table_reference.clone(),
            })
            .collect();
        tables.sort_by(|a, b| a.table_reference.table_id.cmp(&b.table_reference.table_id));

        Ok(TableList {
            tables: Some(tables),
            next_page_token: None,
        })
    }

    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> TransportResult<DatasetResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetDataset(dataset_id.to_string()));

        if !state.datasets.contains(dataset_id) {
            return Err(TransportError::not_found(format!("Not found: Dataset {}", dataset_id)));
        }

        Ok(DatasetResource {
            dataset_reference: DatasetReference {
                project_id: project_id.to_string(),
                dataset_id: dataset_id.to_string(),
            },
            location: None,
        })
    }

    async fn insert_dataset(&self, dataset: &DatasetResource) -> TransportResult<DatasetResource> {
        let mut state = self.state.lock().unwrap();
        let id = dataset.dataset_reference.dataset_id.clone();
        state.calls.push(Call::InsertDataset(id.clone()));
        state.datasets.insert(id);
        Ok(dataset.clone())
    }

    async fn delete_dataset(
        &self,
        _project_id: &str,
        dataset_id: &str,
        _delete_contents: bool,
    ) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteDataset(dataset_id.to_string()));
        if state.datasets.remove(dataset_id) {
            Ok(())
        } else {
            Err(TransportError::not_found(format!("Not found: Dataset {}", dataset_id)))
        }
    }

    async fn list_datasets(&self, project_id: &str, _page_token: Option<&str>) -> TransportResult<DatasetList> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListDatasets);

        let mut ids: Vec<String> = state.datasets.iter().cloned().collect();
        ids.sort();

        Ok(DatasetList {
            datasets: Some(
                ids.into_iter()
                    .map(|dataset_id| DatasetListEntry {
                        dataset_reference: DatasetReference {
                            project_id: project_id.to_string(),
                            dataset_id,
                        },
                    })
                    .collect(),
            ),
            next_page_token: None,
        })
    }
}

/// Settings with every wait shortened for tests.
pub fn fast_settings() -> Settings {
    Settings {
        project_id: Some(PROJECT.to_string()),
        poll_interval_ms: 5,
        consistency_delay_secs: 0,
        schema_change_delay_secs: 0,
        ..Settings::default()
    }
}

pub fn connector(mock: &Arc<MockTransport>) -> Connector {
    connector_with(mock, fast_settings())
}

pub fn connector_with(mock: &Arc<MockTransport>, settings: Settings) -> Connector {
    Connector::new(PROJECT, CredentialKind::ServiceAccount, mock.clone(), settings)
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Progress for RecordingProgress {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

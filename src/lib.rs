pub mod error;
pub mod schema;
pub mod model;
pub mod transport;
pub mod config;
pub mod connector;
pub mod jobs;
pub mod reconcile;
pub mod tables;
pub mod datasets;
pub mod tabledata;
pub mod upload;
pub mod frame;
pub mod retry;
pub mod client;

pub use error::{GbqError, ErrorKind, Result, TransportError, ErrorEntry};
pub use schema::{Field, FieldType, TableSchema, TableReference};
pub use model::{JobKind, JobConfiguration, QueryJobConfig, CopyJobConfig, LoadJobConfig, JobResource, QueryResults, RawRow, TimePartitioning};
pub use transport::{Transport, TransportResult, BqTransport};
pub use config::Settings;
pub use connector::{Connector, CredentialKind, Progress, ProgressEvent, TracingProgress, Stopwatch, RowInsertError, format_bytes};
pub use jobs::{Jobs, JobHandle, Submitter, Poller, Paginator, ResultPage, ResultSet, QueryOutput};
pub use reconcile::{schemas_equivalent, is_subset, Reconciler};
pub use tables::Tables;
pub use datasets::Datasets;
pub use tabledata::{Tabledata, InsertReport};
pub use upload::{IfExists, Uploader};
pub use frame::Frame;
pub use retry::{run_with_retry, RetryPolicy};
pub use client::{BigQuery, Dialect, Priority, QueryOptions, check_strict};

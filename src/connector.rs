use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::{GbqError, Result, TransportError};
use crate::model::InsertError;
use crate::transport::{BqTransport, Transport};

const SERVICE_ACCOUNT_DENIED: &str = "The service account credentials are not valid";
const USER_ACCOUNT_DENIED: &str =
    "The credentials have been revoked or expired, please re-run the application to re-authorize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ServiceAccount,
    UserAccount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Elapsed { secs: f64 },
    PageFetched { page: usize, rows_so_far: u64, total_rows: u64 },
    InsertProgress { rows_sent: usize, total_rows: usize },
    QueryDone { cache_hit: bool, bytes_processed: Option<u64> },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Elapsed { secs } => write!(f, "Elapsed {} s. Waiting...", secs),
            ProgressEvent::PageFetched { page, rows_so_far, total_rows } => {
                write!(f, "Retrieved page {}: {} of {} rows", page, rows_so_far, total_rows)
            }
            ProgressEvent::InsertProgress { rows_sent, total_rows } => {
                let pct = if *total_rows == 0 {
                    100.0
                } else {
                    *rows_sent as f64 * 100.0 / *total_rows as f64
                };
                write!(f, "Streaming Insert is {:.0}% Complete", pct)
            }
            ProgressEvent::QueryDone { cache_hit: true, .. } => write!(f, "Query done. Cache hit."),
            ProgressEvent::QueryDone { bytes_processed, .. } => write!(
                f,
                "Query done. Processed: {}",
                format_bytes(bytes_processed.unwrap_or(0))
            ),
        }
    }
}

/// Receives progress notifications from long-running operations.
pub trait Progress: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Forwards progress to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn report(&self, event: &ProgressEvent) {
        info!("{}", event);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Seconds, rounded to two decimals.
    pub fn elapsed_secs(&self) -> f64 {
        (self.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Human readable byte count: `0.0 B`, `1.5 KB`, `3.0 GB`.
pub fn format_bytes(num: u64) -> String {
    const UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];

    let mut value = num as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}B", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} YB", value)
}

/// One failing row of a streaming insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInsertError {
    pub row: u64,
    pub reason: String,
    pub location: String,
    pub message: String,
}

impl fmt::Display for RowInsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error at Row: {}, Reason: {}, Location: {}, Message: {}",
            self.row, self.reason, self.location, self.message
        )
    }
}

/// Shared collaborator handed to every operation module: project, credential
/// kind, transport, settings and the progress sink.
#[derive(Clone)]
pub struct Connector {
    project_id: String,
    credential: CredentialKind,
    transport: Arc<dyn Transport>,
    settings: Settings,
    progress: Arc<dyn Progress>,
}

impl Connector {
    pub fn new(
        project_id: impl Into<String>,
        credential: CredentialKind,
        transport: Arc<dyn Transport>,
        settings: Settings,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            credential,
            transport,
            settings,
            progress: Arc::new(TracingProgress),
        }
    }

    /// Builds a BigQuery-backed connector from settings: a service-account key
    /// file when `key_path` is set, application default credentials otherwise.
    pub async fn connect(settings: Settings) -> Result<Self> {
        let project_id = settings.require_project()?.to_string();

        let (transport, credential) = match &settings.key_path {
            Some(path) => {
                let path_str = path.to_str().ok_or_else(|| {
                    GbqError::InvalidPrivateKeyFormat(format!(
                        "key path is not valid UTF-8: {}",
                        path.display()
                    ))
                })?;
                debug!("Authenticating with service account key {}", path_str);
                let transport = BqTransport::from_service_account_key_file(path_str)
                    .await
                    .map_err(|e| match e {
                        TransportError::Auth { reason } => GbqError::InvalidPrivateKeyFormat(reason),
                        other => translate_error(CredentialKind::ServiceAccount, other),
                    })?;
                (transport, CredentialKind::ServiceAccount)
            }
            None => {
                debug!("Authenticating with application default credentials");
                let transport = BqTransport::from_application_default_credentials()
                    .await
                    .map_err(|e| translate_error(CredentialKind::UserAccount, e))?;
                (transport, CredentialKind::UserAccount)
            }
        };

        Ok(Self::new(project_id, credential, Arc::new(transport), settings))
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn credential(&self) -> CredentialKind {
        self.credential
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn location(&self) -> Option<&str> {
        self.settings.location.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.settings.verbose
    }

    pub fn report(&self, event: ProgressEvent) {
        self.progress.report(&event);
    }

    /// Emits an elapsed-time notice once the operation has run past the
    /// configured threshold.
    pub fn report_elapsed(&self, stopwatch: &Stopwatch) {
        if stopwatch.elapsed() > self.settings.progress_threshold() {
            self.report(ProgressEvent::Elapsed {
                secs: stopwatch.elapsed_secs(),
            });
        }
    }

    pub fn access_denied(&self) -> GbqError {
        access_denied(self.credential)
    }

    pub fn translate(&self, err: TransportError) -> GbqError {
        translate_error(self.credential, err)
    }

    /// Flattens row-level insert errors. Without verbose reporting the first
    /// failure aborts the batch; with it every failure is logged and returned.
    pub fn process_insert_errors(&self, errors: &[InsertError]) -> Result<Vec<RowInsertError>> {
        let mut failures = Vec::new();

        for insert_error in errors {
            for entry in insert_error.errors.as_deref().unwrap_or(&[]) {
                let failure = RowInsertError {
                    row: insert_error.index,
                    reason: entry.reason.clone(),
                    location: entry.location.clone().unwrap_or_default(),
                    message: entry.message.clone(),
                };

                if !self.verbose() {
                    return Err(GbqError::StreamingInsert(format!(
                        "{}\nEnable verbose logging to see all errors",
                        failure
                    )));
                }

                error!("{}", failure);
                failures.push(failure);
            }
        }

        Ok(failures)
    }
}

pub fn access_denied(credential: CredentialKind) -> GbqError {
    match credential {
        CredentialKind::ServiceAccount => GbqError::AccessDenied(SERVICE_ACCOUNT_DENIED.to_string()),
        CredentialKind::UserAccount => GbqError::AccessDenied(USER_ACCOUNT_DENIED.to_string()),
    }
}

/// Maps a transport failure onto the caller-facing taxonomy. Structured
/// payloads surface their first `(reason, message)` entry.
pub fn translate_error(credential: CredentialKind, err: TransportError) -> GbqError {
    match err {
        TransportError::Auth { .. } => access_denied(credential),
        TransportError::Response { status, errors, raw, .. } => match errors.into_iter().next() {
            Some(first) => GbqError::Generic {
                message: format!("Reason: {}, Message: {}", first.reason, first.message),
                reason: Some(first.reason),
                status: Some(status),
            },
            None => GbqError::Generic {
                reason: None,
                status: Some(status),
                message: raw,
            },
        },
        TransportError::Connection { reason } => GbqError::Connection(reason),
        TransportError::Decode { message } => GbqError::Decode(message),
    }
}

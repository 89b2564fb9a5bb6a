use gcp_bigquery_client::error::{BQError, ResponseError};
use regex::Regex;
use super::transport::{ErrorEntry, TransportError};

pub fn parse_bq_error(error: BQError, context: ErrorContext) -> TransportError {
    match &error {
        BQError::ResponseError { error: resp } => parse_response_error(resp, &context),

        BQError::RequestError(req_err) => {
            TransportError::Connection {
                reason: context.describe(&req_err.to_string()),
            }
        }

        BQError::NoToken => {
            TransportError::Auth {
                reason: "No authentication token available".to_string(),
            }
        }

        BQError::AuthError(auth_err) => {
            TransportError::Auth {
                reason: format!("{:?}", auth_err),
            }
        }

        BQError::YupAuthError(yup_err) => {
            TransportError::Auth {
                reason: yup_err.to_string(),
            }
        }

        BQError::InvalidServiceAccountKey(io_err) => {
            TransportError::Auth {
                reason: io_err.to_string(),
            }
        }

        BQError::InvalidServiceAccountAuthenticator(io_err) => {
            TransportError::Auth {
                reason: io_err.to_string(),
            }
        }

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            TransportError::Auth {
                reason: io_err.to_string(),
            }
        }

        BQError::SerializationError(serde_err) => {
            TransportError::Decode {
                message: context.describe(&serde_err.to_string()),
            }
        }

        BQError::NoDataAvailable => {
            TransportError::Decode {
                message: context.describe("No data available in response"),
            }
        }

        BQError::ConnectionPoolError(msg) => {
            TransportError::Connection {
                reason: context.describe(msg),
            }
        }

        BQError::TonicTransportError(tonic_err) => {
            TransportError::Connection {
                reason: context.describe(&tonic_err.to_string()),
            }
        }

        _ => TransportError::Connection {
            reason: context.describe(&error.to_string()),
        },
    }
}

fn parse_response_error(resp: &ResponseError, context: &ErrorContext) -> TransportError {
    let status = status_code(resp.error.code);
    let message = resp.error.message.clone();

    let errors = resp
        .error
        .errors
        .iter()
        .map(|e| {
            let message = e.get("message").cloned().unwrap_or_default();
            let location = e
                .get("location")
                .cloned()
                .or_else(|| extract_query_location(&message));
            ErrorEntry {
                reason: e.get("reason").cloned().unwrap_or_default(),
                message,
                location,
            }
        })
        .collect();

    TransportError::Response {
        status,
        message: context.describe(&message),
        errors,
        raw: format!("{:?}", resp),
    }
}

/// HTTP status from the payload's `code`; out-of-range values become 0.
fn status_code(code: i64) -> u16 {
    u16::try_from(code).unwrap_or(0)
}

/// Pulls a `line:column` position out of messages such as `... at [3:15]`.
fn extract_query_location(message: &str) -> Option<String> {
    let line_col_re = Regex::new(r"\[(\d+):(\d+)\]").ok()?;
    if let Some(caps) = line_col_re.captures(message) {
        return Some(format!("{}:{}", &caps[1], &caps[2]));
    }

    let verbose_re = Regex::new(r"line\s+(\d+).*column\s+(\d+)").ok()?;
    verbose_re
        .captures(message)
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]))
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub resource: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_table(mut self, project: &str, dataset: &str, table: &str) -> Self {
        self.resource = Some(format!("{}.{}.{}", project, dataset, table));
        self
    }

    pub fn with_job(mut self, project: &str, job_id: &str) -> Self {
        self.resource = Some(format!("{}:{}", project, job_id));
        self
    }

    fn describe(&self, message: &str) -> String {
        match (&self.operation, &self.resource) {
            (Some(op), Some(res)) => format!("{} [{} on {}]", message, op, res),
            (Some(op), None) => format!("{} [{}]", message, op),
            (None, Some(res)) => format!("{} [{}]", message, res),
            (None, None) => message.to_string(),
        }
    }
}

use serde_json::Value;
use tracing::{debug, info};

use crate::connector::{Connector, Stopwatch};
use crate::error::{GbqError, Result};
use crate::model::{JobConfiguration, JobKind, JobRequest};
use super::JobHandle;

pub struct Submitter<'a> {
    connector: &'a Connector,
}

impl<'a> Submitter<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self { connector }
    }

    /// Merges the overlay into `base`, posts the job and returns without
    /// waiting. The handle's stopwatch starts before the request goes out.
    pub async fn submit(
        &self,
        kind: JobKind,
        base: JobConfiguration,
        overlay: Option<&Value>,
    ) -> Result<JobHandle> {
        let stopwatch = Stopwatch::start();

        let mut configuration = merge_configuration(kind, base, overlay)?;
        // `timeoutMs: 0` means no limit.
        let timeout_ms = configuration
            .as_query_mut()
            .and_then(|query| query.timeout_ms.take())
            .filter(|ms| *ms > 0);

        let request = JobRequest { configuration };
        debug!("Submitting {} job: {}", kind, serde_json::to_string(&request)?);

        let job = self
            .connector
            .transport()
            .insert_job(self.connector.project_id(), &request)
            .await
            .map_err(|e| self.connector.translate(e))?;

        let reference = job.job_reference.clone().ok_or_else(|| {
            GbqError::Decode("jobs.insert response carried no jobReference".to_string())
        })?;

        info!("Job {} submitted ({})", reference.job_id, kind);

        Ok(JobHandle {
            project_id: reference.project_id,
            job_id: reference.job_id,
            location: reference
                .location
                .or_else(|| self.connector.location().map(String::from)),
            kind,
            stopwatch,
            timeout_ms,
            initial: job,
        })
    }
}

/// Shallow per-key merge of an overlay `{"<kind>": {...}}` onto the base
/// configuration; overlay keys win.
pub fn merge_configuration(
    kind: JobKind,
    base: JobConfiguration,
    overlay: Option<&Value>,
) -> Result<JobConfiguration> {
    if base.kind() != kind {
        return Err(wrong_kind(kind));
    }

    let mut merged = base;

    if let Some(overlay) = overlay {
        let requested = JobConfiguration::from_overlay(overlay)?;
        if requested.kind() != kind {
            return Err(wrong_kind(kind));
        }

        let overrides = overlay
            .get(kind.as_str())
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match kind {
            JobKind::Copy
                if overrides.contains_key("sourceTable")
                    || overrides.contains_key("destinationTable") =>
            {
                return Err(GbqError::Configuration(
                    "source and destination table must be specified as parameters".to_string(),
                ));
            }
            JobKind::Query
                if overrides.contains_key("query")
                    && merged.as_query().map_or(false, |q| q.query.is_some()) =>
            {
                return Err(GbqError::Configuration(
                    "Query statement can't be specified inside config while it is specified as parameter"
                        .to_string(),
                ));
            }
            _ => {}
        }

        let mut value = serde_json::to_value(&merged)?;
        if let Some(target) = value.get_mut(kind.as_str()).and_then(Value::as_object_mut) {
            for (key, v) in overrides {
                target.insert(key, v);
            }
        }

        merged = serde_json::from_value(value).map_err(|e| {
            GbqError::Configuration(format!("invalid {} job configuration: {}", kind, e))
        })?;
    }

    if let Some(query) = merged.as_query_mut() {
        if query.destination_table.is_some() {
            query.allow_large_results = Some(true);
        }
    }

    Ok(merged)
}

fn wrong_kind(kind: JobKind) -> GbqError {
    GbqError::Configuration(format!("Only '{}' job type is supported", kind))
}

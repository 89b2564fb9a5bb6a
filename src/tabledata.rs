use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::connector::{Connector, ProgressEvent, RowInsertError};
use crate::error::{GbqError, Result};
use crate::frame::Frame;
use crate::model::{InsertAllRequest, InsertError, InsertRow};
use crate::schema::TableReference;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertReport {
    pub rows_sent: usize,
    /// Row failures tolerated in verbose mode; always empty otherwise.
    pub failed_rows: Vec<RowInsertError>,
}

impl InsertReport {
    pub fn is_clean(&self) -> bool {
        self.failed_rows.is_empty()
    }
}

/// Streaming inserts through `tabledata.insertAll`.
#[derive(Clone)]
pub struct Tabledata {
    connector: Connector,
}

impl Tabledata {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    pub async fn insert_frame(
        &self,
        table: &TableReference,
        frame: &Frame,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        self.insert_all(table, frame.to_json_rows()?, chunk_size).await
    }

    /// Sends `rows` in batches of `chunk_size`. Every row gets the insert id
    /// `<batch uuid><row index>` so retried batches deduplicate remotely.
    pub async fn insert_all(
        &self,
        table: &TableReference,
        rows: Vec<Map<String, Value>>,
        chunk_size: usize,
    ) -> Result<InsertReport> {
        if chunk_size == 0 {
            return Err(GbqError::Configuration("chunk size must be at least 1".to_string()));
        }

        let batch_id = Uuid::new_v4().simple().to_string();
        let total_rows = rows.len();
        let mut report = InsertReport::default();

        let mut pending = rows.into_iter().enumerate().peekable();
        while pending.peek().is_some() {
            let offset = report.rows_sent;
            let chunk: Vec<InsertRow> = pending
                .by_ref()
                .take(chunk_size)
                .map(|(index, json)| InsertRow {
                    insert_id: format!("{}{}", batch_id, index),
                    json,
                })
                .collect();

            let chunk_len = chunk.len();
            debug!("Inserting rows {}..{} into {}", offset, offset + chunk_len, table);

            let response = self
                .connector
                .transport()
                .insert_all(table, &InsertAllRequest { rows: chunk })
                .await
                .map_err(|e| self.connector.translate(e))?;

            report.rows_sent += chunk_len;
            self.connector.report(ProgressEvent::InsertProgress {
                rows_sent: report.rows_sent,
                total_rows,
            });

            if let Some(errors) = response.insert_errors.filter(|e| !e.is_empty()) {
                let absolute: Vec<InsertError> = errors
                    .into_iter()
                    .map(|mut e| {
                        e.index += offset as u64;
                        e
                    })
                    .collect();
                report
                    .failed_rows
                    .extend(self.connector.process_insert_errors(&absolute)?);
            }
        }

        info!("Streamed {} rows into {}", report.rows_sent, table);
        Ok(report)
    }
}

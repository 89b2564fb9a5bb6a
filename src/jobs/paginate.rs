use tracing::debug;

use crate::connector::{Connector, ProgressEvent};
use crate::error::{GbqError, Result};
use crate::model::{QueryResults, QueryResultsParams, RawRow};
use crate::schema::TableSchema;
use super::JobHandle;

/// One batch of undecoded rows as delivered by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<RawRow>,
    /// Rows received up to and including this page.
    pub running_total: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub schema: TableSchema,
    pub total_rows: u64,
    pub pages: Vec<ResultPage>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.pages.iter().map(|p| p.rows.len()).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &RawRow> {
        self.pages.iter().flat_map(|p| p.rows.iter())
    }
}

pub struct Paginator<'a> {
    connector: &'a Connector,
}

impl<'a> Paginator<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self { connector }
    }

    /// Follows the page-token chain until `totalRows` rows are collected.
    /// The schema is taken from `first_page` only.
    pub async fn drain(&self, handle: &JobHandle, first_page: QueryResults) -> Result<ResultSet> {
        let schema = first_page.schema.clone().unwrap_or_default();
        let total_rows = first_page.total_rows();

        let mut result = ResultSet {
            schema,
            total_rows,
            pages: Vec::new(),
        };

        if total_rows == 0 {
            return Ok(result);
        }

        // A zero-row completion check carries no rows; start the chain fresh.
        let mut reply = if first_page.rows.is_none() {
            self.fetch(handle, None).await?
        } else {
            first_page
        };

        let mut current_row: u64 = 0;
        let mut seen_tokens: Vec<String> = Vec::new();

        while let Some(rows) = reply.rows.take() {
            current_row += rows.len() as u64;
            result.pages.push(ResultPage {
                rows,
                running_total: current_row,
            });

            self.connector.report(ProgressEvent::PageFetched {
                page: result.pages.len(),
                rows_so_far: current_row,
                total_rows,
            });

            if current_row >= total_rows {
                break;
            }

            let token = match reply.page_token.take() {
                Some(token) => token,
                None => {
                    return Err(GbqError::InvalidPageToken(format!(
                        "Required pageToken was missing. Received {} of {} rows",
                        current_row, total_rows
                    )))
                }
            };

            if seen_tokens.contains(&token) {
                return Err(GbqError::InvalidPageToken(
                    "A duplicate pageToken was returned".to_string(),
                ));
            }

            seen_tokens.push(token.clone());
            reply = self.fetch(handle, Some(token)).await?;
        }

        if current_row < total_rows {
            return Err(GbqError::InvalidPageToken(format!(
                "Page chain ended after {} of {} rows",
                current_row, total_rows
            )));
        }

        debug!(
            "Drained {} rows in {} pages for job {}",
            current_row,
            result.pages.len(),
            handle.job_id()
        );

        Ok(result)
    }

    async fn fetch(&self, handle: &JobHandle, page_token: Option<String>) -> Result<QueryResults> {
        let params = QueryResultsParams {
            page_token,
            max_results: None,
            location: handle.location().map(String::from),
        };

        self.connector
            .transport()
            .get_query_results(handle.project_id(), handle.job_id(), &params)
            .await
            .map_err(|e| self.connector.translate(e))
    }
}

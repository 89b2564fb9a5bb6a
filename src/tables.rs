use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::datasets::Datasets;
use crate::error::{GbqError, Result};
use crate::model::{TableResource, TimePartitioning};
use crate::reconcile::schemas_equivalent;
use crate::schema::{TableReference, TableSchema};

/// Table CRUD. Partition decorators are stripped wherever the call
/// addresses the table itself.
#[derive(Clone)]
pub struct Tables {
    connector: Connector,
}

impl Tables {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    pub fn reference(&self, dataset_id: &str, table_id: &str) -> TableReference {
        TableReference::new(self.connector.project_id(), dataset_id, table_id)
    }

    pub async fn exists(&self, table: &TableReference) -> Result<bool> {
        match self.connector.transport().get_table(&table.root()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(self.connector.translate(e)),
        }
    }

    pub async fn get(&self, table: &TableReference) -> Result<TableResource> {
        match self.connector.transport().get_table(&table.root()).await {
            Ok(resource) => Ok(resource),
            Err(e) if e.is_not_found() => Err(GbqError::NotFound(format!(
                "Table {} does not exist",
                table.root()
            ))),
            Err(e) => Err(self.connector.translate(e)),
        }
    }

    pub async fn get_schema(&self, table: &TableReference) -> Result<TableSchema> {
        Ok(self.get(table).await?.schema.unwrap_or_default())
    }

    /// Creates the table, and its dataset when that is missing.
    pub async fn insert(
        &self,
        table: &TableReference,
        schema: &TableSchema,
        partitioning: Option<TimePartitioning>,
    ) -> Result<TableResource> {
        if self.exists(table).await? {
            return Err(GbqError::TableCreation(format!(
                "Table {} already exists",
                table.root_table_id()
            )));
        }

        let datasets = Datasets::new(self.connector.clone());
        if !datasets.exists(&table.dataset_id).await? {
            datasets.insert(&table.dataset_id).await?;
        }

        let mut resource = TableResource::new(table.root(), schema.clone());
        if let Some(partitioning) = partitioning {
            resource = resource.with_time_partitioning(partitioning);
        }

        let created = self
            .connector
            .transport()
            .insert_table(&resource)
            .await
            .map_err(|e| self.connector.translate(e))?;

        info!("Created table {}", table.root());
        Ok(created)
    }

    pub async fn delete(&self, table: &TableReference) -> Result<()> {
        if !self.exists(table).await? {
            return Err(GbqError::NotFound("Table does not exist".to_string()));
        }

        self.delete_if_present(table).await
    }

    /// Deletes without the existence check; a 404 counts as success.
    pub async fn delete_if_present(&self, table: &TableReference) -> Result<()> {
        match self.connector.transport().delete_table(&table.root()).await {
            Ok(()) => {
                info!("Deleted table {}", table.root());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Table {} already gone", table.root());
                Ok(())
            }
            Err(e) => Err(self.connector.translate(e)),
        }
    }

    pub async fn list(&self, dataset_id: &str) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .connector
                .transport()
                .list_tables(self.connector.project_id(), dataset_id, page_token.as_deref())
                .await
                .map_err(|e| self.connector.translate(e))?;

            tables.extend(
                page.tables
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| t.table_reference.table_id),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(tables)
    }

    /// Drops and recreates the table with `schema`. Schema changes take a
    /// while to propagate, so a changed schema waits `schema_change_delay`.
    pub async fn delete_and_recreate(&self, table: &TableReference, schema: &TableSchema) -> Result<()> {
        let current = self.get(table).await?;
        let changed = !schemas_equivalent(schema, &current.schema.clone().unwrap_or_default());

        self.delete(table).await?;
        self.insert(table, schema, current.time_partitioning).await?;

        if changed {
            let delay = self.connector.settings().schema_change_delay();
            warn!(
                "The existing table has a different schema. Waiting {} s for the change to propagate",
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }
}

use crate::connector::Connector;
use crate::error::{GbqError, Result};
use crate::schema::{TableReference, TableSchema};
use crate::tables::Tables;

const SCHEMA_MISMATCH: &str = "Please verify that the structure and data types in the DataFrame match the schema of the destination table.";

/// Same `(name, type)` pairs regardless of order and name case.
pub fn schemas_equivalent(local: &TableSchema, remote: &TableSchema) -> bool {
    local.matches(remote)
}

/// Every local field exists remotely; the remote side may carry more.
pub fn is_subset(local: &TableSchema, remote: &TableSchema) -> bool {
    local.is_subset_of(remote)
}

/// Gate for appends and replaces: fails before any write is issued.
pub fn require_subset(local: &TableSchema, remote: &TableSchema) -> Result<()> {
    if is_subset(local, remote) {
        return Ok(());
    }

    let missing = local.missing_from(remote);
    Err(GbqError::InvalidSchema(format!(
        "{} Fields not in destination: {}",
        SCHEMA_MISMATCH,
        missing.join(", ")
    )))
}

/// Compares a local schema against a table's current remote schema.
pub struct Reconciler {
    tables: Tables,
}

impl Reconciler {
    pub fn new(connector: Connector) -> Self {
        Self {
            tables: Tables::new(connector),
        }
    }

    pub async fn verify_schema(&self, table: &TableReference, schema: &TableSchema) -> Result<bool> {
        let remote = self.tables.get_schema(&table.root()).await?;
        Ok(schemas_equivalent(schema, &remote))
    }

    pub async fn verify_subset(&self, table: &TableReference, schema: &TableSchema) -> Result<bool> {
        let remote = self.tables.get_schema(&table.root()).await?;
        Ok(is_subset(schema, &remote))
    }
}

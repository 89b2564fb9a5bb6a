use tracing::{debug, info};

use crate::connector::Connector;
use crate::error::{GbqError, Result};
use crate::model::{DatasetReference, DatasetResource};

/// Dataset CRUD. Existence checks treat 404 as absence.
#[derive(Clone)]
pub struct Datasets {
    connector: Connector,
}

impl Datasets {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    pub async fn exists(&self, dataset_id: &str) -> Result<bool> {
        match self
            .connector
            .transport()
            .get_dataset(self.connector.project_id(), dataset_id)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(self.connector.translate(e)),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .connector
                .transport()
                .list_datasets(self.connector.project_id(), page_token.as_deref())
                .await
                .map_err(|e| self.connector.translate(e))?;

            datasets.extend(
                page.datasets
                    .unwrap_or_default()
                    .into_iter()
                    .map(|d| d.dataset_reference.dataset_id),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(datasets)
    }

    pub async fn insert(&self, dataset_id: &str) -> Result<()> {
        if self.exists(dataset_id).await? {
            return Err(GbqError::DatasetCreation(format!(
                "Dataset {} already exists",
                dataset_id
            )));
        }

        let resource = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: self.connector.project_id().to_string(),
                dataset_id: dataset_id.to_string(),
            },
            location: self.connector.location().map(String::from),
        };

        self.connector
            .transport()
            .insert_dataset(&resource)
            .await
            .map_err(|e| self.connector.translate(e))?;

        info!("Created dataset {}", dataset_id);
        Ok(())
    }

    pub async fn delete(&self, dataset_id: &str, delete_contents: bool) -> Result<()> {
        if !self.exists(dataset_id).await? {
            return Err(GbqError::NotFound(format!(
                "Dataset {} does not exist",
                dataset_id
            )));
        }

        match self
            .connector
            .transport()
            .delete_dataset(self.connector.project_id(), dataset_id, delete_contents)
            .await
        {
            Ok(()) => {
                info!("Deleted dataset {}", dataset_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Dataset {} already gone", dataset_id);
                Ok(())
            }
            Err(e) => Err(self.connector.translate(e)),
        }
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::datastore::{DataStore, DataStoreExt};
use crate::sync::SyncError;
use std::sync::Arc;
use velaux_models::constants::{AUTO_GEN_PROJECT_DESC, DEFAULT_PROJECT_OWNER};
use velaux_models::models::Project;
use velaux_utils::telemetry::prelude::*;

/// Project look-up and creation.
#[derive(Clone)]
pub struct ProjectService {
    ds: Arc<dyn DataStore>,
}

impl ProjectService {
    pub fn new(ds: Arc<dyn DataStore>) -> Self {
        Self { ds }
    }

    /// Retrieves a project by name.
    ///
    /// # Returns
    ///
    /// `SyncError::NotFound` when no project carries the name.
    pub async fn get(&self, name: &str) -> Result<Project, SyncError> {
        self.ds
            .find(Project {
                name: name.to_string(),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("project {}", name)))
    }

    /// Creates a project, failing when the name is taken.
    pub async fn create(&self, project: Project) -> Result<Project, SyncError> {
        let name = project.name.clone();
        match self.ds.insert(project).await {
            Ok(created) => {
                info!("created project {}", created.name);
                Ok(created)
            }
            Err(e) if e.is_exist() => Err(SyncError::AlreadyExists(format!("project {}", name))),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the named project, creating it when absent.
    pub async fn ensure(&self, name: &str) -> Result<Project, SyncError> {
        if let Some(project) = self
            .ds
            .find(Project {
                name: name.to_string(),
                ..Default::default()
            })
            .await?
        {
            return Ok(project);
        }

        let created = self
            .create(Project {
                name: name.to_string(),
                alias: name.to_string(),
                description: AUTO_GEN_PROJECT_DESC.to_string(),
                owner: DEFAULT_PROJECT_OWNER.to_string(),
                ..Default::default()
            })
            .await;
        match created {
            // Lost a race with another writer.
            Err(SyncError::AlreadyExists(_)) => self.get(name).await,
            other => other,
        }
    }

    pub async fn list(&self) -> Result<Vec<Project>, SyncError> {
        Ok(self.ds.list_as(Project::default(), None).await?)
    }
}

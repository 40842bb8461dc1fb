/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::datastore::{DataStore, DataStoreExt, ListOptions};
use crate::sync::SyncError;
use std::sync::Arc;
use velaux_models::models::Target;
use velaux_utils::telemetry::prelude::*;

/// Delivery targets, unique by `(cluster, namespace)`.
#[derive(Clone)]
pub struct TargetService {
    ds: Arc<dyn DataStore>,
}

impl TargetService {
    pub fn new(ds: Arc<dyn DataStore>) -> Self {
        Self { ds }
    }

    /// Creates a target unless one with the same cluster identity or name
    /// exists, in which case the existing target is returned.
    pub async fn create(&self, target: Target) -> Result<Target, SyncError> {
        if let Some(cluster) = target.cluster.clone() {
            let same_identity = self
                .ds
                .list_as(
                    Target {
                        cluster: Some(cluster),
                        ..Default::default()
                    },
                    None,
                )
                .await?;
            if let Some(existing) = same_identity.into_iter().next() {
                return Ok(existing);
            }
        }

        let name = target.name.clone();
        match self.ds.insert(target).await {
            Ok(created) => {
                info!("created target {} in project {}", created.name, created.project);
                Ok(created)
            }
            Err(e) if e.is_exist() => Ok(self
                .ds
                .fetch(Target {
                    name,
                    ..Default::default()
                })
                .await?),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Target, SyncError> {
        self.ds
            .find(Target {
                name: name.to_string(),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("target {}", name)))
    }

    /// Lists targets, optionally narrowed to a project and a set of names.
    pub async fn list(
        &self,
        project: Option<&str>,
        names: Option<Vec<String>>,
    ) -> Result<Vec<Target>, SyncError> {
        let query = Target {
            project: project.unwrap_or_default().to_string(),
            ..Default::default()
        };
        let options = names.map(|names| ListOptions::with_in("name", names));
        Ok(self.ds.list_as(query, options.as_ref()).await?)
    }
}

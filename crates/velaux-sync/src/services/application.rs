/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::datastore::{DataStore, DataStoreExt};
use crate::sync::SyncError;
use std::sync::Arc;
use velaux_models::models::{
    Application, ApplicationComponent, ApplicationPolicy, ApplicationRevision, EnvBinding,
    Workflow, WorkflowRecord,
};
use velaux_models::Kind;
use velaux_utils::telemetry::prelude::*;

/// Application lifecycle operations that span the child tables.
#[derive(Clone)]
pub struct ApplicationService {
    ds: Arc<dyn DataStore>,
}

impl ApplicationService {
    pub fn new(ds: Arc<dyn DataStore>) -> Self {
        Self { ds }
    }

    /// Deletes an application and every record scoped to it.
    ///
    /// Children go first and the application row last, so an interrupted
    /// delete can be rerun. Rows already gone are not an error.
    pub async fn delete_application(&self, app: &Application) -> Result<(), SyncError> {
        let key = app.name.clone();
        let components = self
            .delete_children(ApplicationComponent {
                app_primary_key: key.clone(),
                ..Default::default()
            })
            .await?;
        let policies = self
            .delete_children(ApplicationPolicy {
                app_primary_key: key.clone(),
                ..Default::default()
            })
            .await?;
        self.delete_children(Workflow {
            app_primary_key: key.clone(),
            ..Default::default()
        })
        .await?;
        self.delete_children(EnvBinding {
            app_primary_key: key.clone(),
            ..Default::default()
        })
        .await?;
        self.delete_children(ApplicationRevision {
            app_primary_key: key.clone(),
            ..Default::default()
        })
        .await?;
        self.delete_children(WorkflowRecord {
            app_primary_key: key.clone(),
            ..Default::default()
        })
        .await?;

        match self
            .ds
            .remove(Application {
                name: key.clone(),
                ..Default::default()
            })
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_exist() => {}
            Err(e) => return Err(e.into()),
        }
        info!(
            "deleted application {} with {} components and {} policies",
            key, components, policies
        );
        Ok(())
    }

    async fn delete_children<E: Kind>(&self, query: E) -> Result<usize, SyncError> {
        let rows = self.ds.list_as(query, None).await?;
        let count = rows.len();
        for row in rows {
            match self.ds.remove(row).await {
                Ok(()) => {}
                Err(e) if e.is_not_exist() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(count)
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::datastore::{DataStore, DataStoreExt};
use crate::sync::SyncError;
use crate::workflow::merge;
use std::sync::Arc;
use velaux_models::models::{Application, Env, EnvBinding};
use velaux_utils::telemetry::prelude::*;

/// Environments: a namespace in a project plus the targets it deploys to.
#[derive(Clone)]
pub struct EnvService {
    ds: Arc<dyn DataStore>,
}

impl EnvService {
    pub fn new(ds: Arc<dyn DataStore>) -> Self {
        Self { ds }
    }

    pub async fn get(&self, name: &str) -> Result<Env, SyncError> {
        self.ds
            .find(Env {
                name: name.to_string(),
                ..Default::default()
            })
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("env {}", name)))
    }

    pub async fn list(&self, project: Option<&str>) -> Result<Vec<Env>, SyncError> {
        Ok(self
            .ds
            .list_as(
                Env {
                    project: project.unwrap_or_default().to_string(),
                    ..Default::default()
                },
                None,
            )
            .await?)
    }

    /// Creates an environment.
    ///
    /// The namespace defaults to the env name and may belong to one env only.
    pub async fn create(&self, mut env: Env) -> Result<Env, SyncError> {
        if env.namespace.is_empty() {
            env.namespace = env.name.clone();
        }
        if self
            .ds
            .exists(Env {
                name: env.name.clone(),
                ..Default::default()
            })
            .await?
        {
            return Err(SyncError::AlreadyExists(format!("env {}", env.name)));
        }
        let bound = self
            .ds
            .list_as(
                Env {
                    namespace: env.namespace.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        if let Some(other) = bound.first() {
            return Err(SyncError::Conflict(format!(
                "namespace {} is bound to env {}",
                env.namespace, other.name
            )));
        }

        let created = self.ds.insert(env).await?;
        info!("created env {} in project {}", created.name, created.project);
        Ok(created)
    }

    /// Replaces the targets of an env and merges the change into the
    /// workflows of every application bound to it.
    ///
    /// # Arguments
    ///
    /// * `env_name` - The environment to update
    /// * `targets` - The complete, ordered target list
    ///
    /// # Returns
    ///
    /// The stored env. Failures on individual applications are logged.
    pub async fn update_env_targets(
        &self,
        env_name: &str,
        targets: Vec<String>,
    ) -> Result<Env, SyncError> {
        let mut env = self.get(env_name).await?;
        env.targets = targets;
        let env = self.ds.update(env).await?;

        let bindings = self
            .ds
            .list_as(
                EnvBinding {
                    name: env.name.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        for binding in bindings {
            let app = self
                .ds
                .find(Application {
                    name: binding.app_primary_key.clone(),
                    ..Default::default()
                })
                .await?;
            let Some(app) = app else {
                warn!(
                    "env {} is bound to missing app {}",
                    env.name, binding.app_primary_key
                );
                continue;
            };
            if let Err(e) = merge::update_env_workflow(self.ds.as_ref(), &app, &env).await {
                error!(
                    "failed to update workflow of app {} in env {}: {}",
                    app.name, env.name, e
                );
            }
        }
        Ok(env)
    }
}

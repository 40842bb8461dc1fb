/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CR2UX
//!
//! Projects one cluster Application at a time into the datastore.
//!
//! For every event the engine decides whether the object is its to sync
//! (provenance and the generation cache), resolves which datastore identity
//! the object maps to, then either runs the convert-and-persist pipeline or
//! the delete cascade. The Application row is written last, so a reader that
//! finds it can rely on its children being in place.
//!
//! ## Identity
//!
//! Two cluster namespaces may hold Applications with the same name. The
//! first one synced keeps the bare name; later ones land under
//! `name-namespace`. The sync namespace label on the stored row tells the two
//! cases apart.

use crate::datastore::{DataStore, DataStoreExt};
use crate::k8s::cluster::ClusterReader;
use crate::k8s::resources;
use crate::metrics;
use crate::services::{ApplicationService, ProjectService, TargetService};
use crate::sync::cache::{CachedApp, SyncCache};
use crate::sync::convert::{self, ConvertError, ConvertedApp};
use crate::sync::{SyncError, SyncOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use velaux_models::constants::{SourceOfTruth, AUTO_GEN_POLICY, AUTO_GEN_REF_POLICY};
use velaux_models::models::{
    Application, ApplicationComponent, ApplicationPolicy, Workflow, WorkflowRecord,
};
use velaux_models::Record;
use velaux_utils::telemetry::prelude::*;

/// The sync engine. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct Cr2Ux {
    ds: Arc<dyn DataStore>,
    cluster: Arc<dyn ClusterReader>,
    cache: SyncCache,
    projects: ProjectService,
    targets: TargetService,
    apps: Option<ApplicationService>,
}

fn identity(cr: &resources::Application) -> Result<(String, String), ConvertError> {
    let name = cr
        .metadata
        .name
        .clone()
        .ok_or(ConvertError::MissingMetadata("name"))?;
    let namespace = cr
        .metadata
        .namespace
        .clone()
        .ok_or(ConvertError::MissingMetadata("namespace"))?;
    Ok((name, namespace))
}

impl Cr2Ux {
    /// Creates an engine that cascades deletes through [`ApplicationService`].
    pub fn new(ds: Arc<dyn DataStore>, cluster: Arc<dyn ClusterReader>) -> Self {
        Self {
            projects: ProjectService::new(ds.clone()),
            targets: TargetService::new(ds.clone()),
            apps: Some(ApplicationService::new(ds.clone())),
            cache: SyncCache::new(),
            ds,
            cluster,
        }
    }

    /// Deletes only the Application row on delete events, leaving children.
    pub fn without_cascade(mut self) -> Self {
        self.apps = None;
        self
    }

    pub fn cache(&self) -> &SyncCache {
        &self.cache
    }

    /// Resolves the datastore identity of the cluster Application `name` in
    /// `namespace`.
    ///
    /// # Returns
    ///
    /// The stored Application when one maps to the object, and the primary
    /// key the object maps to. When nothing is stored the key is the one a
    /// create would use: the bare name, or the composed name when the bare
    /// name belongs to another namespace.
    pub async fn get_app(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<(Option<Application>, String), SyncError> {
        let composed = convert::compose_name(name, namespace);
        if let Some(app) = self
            .ds
            .find(Application {
                name: composed.clone(),
                ..Default::default()
            })
            .await?
        {
            return Ok((Some(app), composed));
        }

        match self
            .ds
            .find(Application {
                name: name.to_string(),
                ..Default::default()
            })
            .await?
        {
            Some(app) if app.synced_namespace() == Some(namespace) => Ok((Some(app), name.to_string())),
            Some(_) => Ok((None, composed)),
            None => Ok((None, name.to_string())),
        }
    }

    /// Whether an event for `cr` needs work.
    ///
    /// Addon applications always pass; their persisted provenance decides
    /// later. Objects declaring platform provenance never pass. Otherwise a
    /// cache hit at the same generation suppresses the event, unless the
    /// stored row is gone or the event is a delete, which drop the entry.
    pub async fn should_sync(&self, cr: &resources::Application, delete: bool) -> bool {
        let Ok((name, namespace)) = identity(cr) else {
            return false;
        };
        if convert::is_addon(cr) {
            return true;
        }
        match convert::declared_source_of_truth(cr) {
            SourceOfTruth::FromUx | SourceOfTruth::FromInner => return false,
            SourceOfTruth::FromCr => {}
        }

        let key = convert::compose_name(&name, &namespace);
        if let Some(cached) = self.cache.get(&key) {
            match self.get_app(&name, &namespace).await {
                Ok((Some(_), _)) if !delete => {
                    if cached.generation == cr.metadata.generation.unwrap_or_default() {
                        return false;
                    }
                }
                _ => self.cache.remove(&key),
            }
        }
        true
    }

    /// Converts `cr` and persists every record derived from it.
    ///
    /// A failure aborts the pipeline without writing the cache entry, so the
    /// next resync of the object retries. Steps already persisted are not
    /// rolled back.
    #[instrument(skip_all, fields(app = ?cr.metadata.name, namespace = ?cr.metadata.namespace))]
    pub async fn add_or_update(&self, cr: &resources::Application) -> Result<SyncOutcome, SyncError> {
        if !self.should_sync(cr, false).await {
            debug!("skipping application event");
            return Ok(SyncOutcome::Skipped);
        }
        let (name, namespace) = identity(cr)?;
        let (existing, app_key) = self.get_app(&name, &namespace).await?;
        if let Some(sot) = existing.as_ref().and_then(Application::source_of_truth) {
            if sot != SourceOfTruth::FromCr {
                debug!("application {} is owned by {}, not syncing", app_key, sot);
                return Ok(SyncOutcome::Skipped);
            }
        }
        let timer = metrics::sync_duration_seconds()
            .with_label_values(&[])
            .start_timer();

        let source_of_truth = if convert::is_addon(cr) {
            SourceOfTruth::FromInner
        } else {
            SourceOfTruth::FromCr
        };
        let converted = convert::convert_app(
            self.ds.as_ref(),
            self.cluster.as_ref(),
            cr,
            &app_key,
            source_of_truth,
        )
        .await?;
        let target_count = converted.targets.len() as i64;
        self.persist(converted, existing).await?;

        let generation = cr.metadata.generation.unwrap_or_default();
        self.cache.insert(
            convert::compose_name(&name, &namespace),
            CachedApp {
                generation,
                target_count,
            },
        );
        timer.observe_duration();
        info!(
            "synced application {}/{} as {} at generation {}",
            namespace, name, app_key, generation
        );
        Ok(SyncOutcome::Synced)
    }

    async fn persist(
        &self,
        converted: ConvertedApp,
        existing: Option<Application>,
    ) -> Result<(), SyncError> {
        let ConvertedApp {
            mut app,
            env,
            env_reused,
            env_binding,
            targets,
            components,
            policies,
            workflow,
            revision,
            record,
        } = converted;
        let app_key = app.name.clone();

        self.projects.ensure(&app.project).await?;
        for target in targets {
            self.targets.create(target).await?;
        }

        let env = self.ds.upsert(env).await?;
        if !env_reused {
            info!("created env {} for namespace {}", env.name, env.namespace);
        }
        self.ds.upsert(env_binding).await?;

        // Components are replaced wholesale.
        let stale = self
            .ds
            .list_as(
                ApplicationComponent {
                    app_primary_key: app_key.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        for component in stale {
            self.ds.remove(component).await?;
        }
        let mut records: Vec<Record> = components.into_iter().map(Into::into).collect();
        self.ds.batch_add(&mut records).await?;

        // Policies written by earlier syncs go; user-defined ones stay.
        let mut preserved = HashSet::new();
        let current = self
            .ds
            .list_as(
                ApplicationPolicy {
                    app_primary_key: app_key.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        for policy in current {
            if policy.creator == AUTO_GEN_POLICY || policy.creator == AUTO_GEN_REF_POLICY {
                self.ds.remove(policy).await?;
            } else {
                preserved.insert(policy.name);
            }
        }
        let mut records: Vec<Record> = policies
            .into_iter()
            .filter(|p| !preserved.contains(&p.name))
            .map(Into::into)
            .collect();
        self.ds.batch_add(&mut records).await?;

        let workflows = self
            .ds
            .list_as(
                Workflow {
                    app_primary_key: app_key.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        for other in workflows.into_iter().filter(|w| w.name != workflow.name) {
            self.ds.remove(other).await?;
        }
        self.ds.upsert(workflow).await?;

        if let Some(revision) = revision {
            if !self.ds.exists(revision.clone()).await? {
                self.ds.insert(revision).await?;
            }
        }
        if let Some(record) = record {
            let lookup = WorkflowRecord {
                name: record.name.clone(),
                ..Default::default()
            };
            if !self.ds.exists(lookup).await? {
                self.ds.insert(record).await?;
            }
        }

        match existing {
            Some(existing) => {
                app.create_time = existing.create_time;
                if app.icon.is_empty() {
                    app.icon = existing.icon;
                }
                self.ds.update(app).await?;
            }
            None => {
                self.ds.insert(app).await?;
            }
        }
        Ok(())
    }

    /// Removes the records of a deleted cluster Application.
    ///
    /// An object with no stored identity is a no-op. Rows owned by the
    /// platform API are left to it.
    #[instrument(skip_all, fields(app = ?cr.metadata.name, namespace = ?cr.metadata.namespace))]
    pub async fn delete_app(&self, cr: &resources::Application) -> Result<SyncOutcome, SyncError> {
        if !self.should_sync(cr, true).await {
            return Ok(SyncOutcome::Skipped);
        }
        let (name, namespace) = identity(cr)?;
        let (existing, app_key) = self.get_app(&name, &namespace).await?;
        let Some(app) = existing else {
            debug!("no stored application for {}/{}", namespace, name);
            return Ok(SyncOutcome::Skipped);
        };
        // Rows without a provenance label count as synced from the cluster.
        if app.source_of_truth().unwrap_or(SourceOfTruth::FromCr) != SourceOfTruth::FromCr {
            debug!("application {} is owned by the platform, keeping it", app_key);
            return Ok(SyncOutcome::Skipped);
        }

        match self.apps.as_ref() {
            Some(apps) => apps.delete_application(&app).await?,
            None => {
                self.ds
                    .remove(Application {
                        name: app_key.clone(),
                        ..Default::default()
                    })
                    .await?
            }
        }
        info!("deleted application {} synced from {}/{}", app_key, namespace, name);
        Ok(SyncOutcome::Deleted)
    }

    /// Seeds the cache from the generation labels of stored applications.
    ///
    /// # Returns
    ///
    /// The number of entries seeded.
    pub async fn init_cache(&self) -> Result<usize, SyncError> {
        let apps = self.ds.list_as(Application::default(), None).await?;
        let mut seeded = 0;
        for app in apps {
            let Some(generation) = app.synced_generation() else {
                continue;
            };
            let namespace = app.synced_namespace().unwrap_or_default();
            let key = if !namespace.is_empty() && app.name.ends_with(&format!("-{}", namespace)) {
                app.name.clone()
            } else {
                convert::compose_name(&app.name, namespace)
            };
            self.cache.insert(
                key,
                CachedApp {
                    generation,
                    target_count: 0,
                },
            );
            seeded += 1;
        }
        info!("seeded the sync cache with {} applications", seeded);
        Ok(seeded)
    }
}

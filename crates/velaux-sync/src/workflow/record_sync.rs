/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Polls the cluster for the execution status of unfinished workflow records.
//!
//! A record follows the live Application while that Application still runs
//! the record's revision. Once the Application moved on, the ApplicationRevision
//! the record belongs to holds the final status.

use crate::datastore::{DataStore, DataStoreExt};
use crate::k8s::cluster::ClusterReader;
use crate::k8s::resources::{self, WorkflowStatus};
use crate::metrics;
use crate::sync::convert::{revision_status, step_statuses};
use crate::sync::SyncError;
use std::collections::BTreeMap;
use std::sync::Arc;
use velaux_models::constants::{
    REVISION_STATUS_TERMINATED, WORKFLOW_RECORD_STATUS_FAIL, WORKFLOW_RECORD_STATUS_TERMINATED,
};
use velaux_models::models::{
    ApplicationRevision, EnvBinding, Workflow, WorkflowRecord, WorkflowStepStatus,
};
use velaux_utils::telemetry::prelude::*;

/// What one poll did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Status copied from the cluster.
    Updated,
    /// The Application or its revision is gone.
    Terminated,
    /// The revision row is gone; the record is closed as failed.
    Failed,
    /// Nothing to copy yet.
    Pending,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Updated => "updated",
            RecordOutcome::Terminated => "terminated",
            RecordOutcome::Failed => "failed",
            RecordOutcome::Pending => "pending",
        }
    }
}

/// The workflow record poller.
#[derive(Clone)]
pub struct WorkflowRecordSync {
    ds: Arc<dyn DataStore>,
    cluster: Arc<dyn ClusterReader>,
}

impl WorkflowRecordSync {
    pub fn new(ds: Arc<dyn DataStore>, cluster: Arc<dyn ClusterReader>) -> Self {
        Self { ds, cluster }
    }

    /// Polls every unfinished record once. A failing record is logged and
    /// skipped.
    ///
    /// # Returns
    ///
    /// The number of records visited.
    pub async fn sync_once(&self) -> Result<usize, SyncError> {
        let records = self
            .ds
            .list_as(
                WorkflowRecord {
                    finished: "false".to_string(),
                    ..Default::default()
                },
                None,
            )
            .await?;
        let visited = records.len();

        for record in records {
            let name = record.name.clone();
            let result = match self.sync_record(record).await {
                Ok(outcome) => outcome.as_str(),
                Err(e) => {
                    error!("failed to sync workflow record {}: {}", name, e);
                    "error"
                }
            };
            metrics::workflow_records_synced_total()
                .with_label_values(&[result])
                .inc();
        }
        Ok(visited)
    }

    /// Brings one record up to date with the cluster.
    pub async fn sync_record(&self, record: WorkflowRecord) -> Result<RecordOutcome, SyncError> {
        let workflow = self
            .ds
            .fetch(Workflow {
                app_primary_key: record.app_primary_key.clone(),
                name: record.workflow_name.clone(),
                ..Default::default()
            })
            .await?;
        let binding = self
            .ds
            .find(EnvBinding {
                app_primary_key: record.app_primary_key.clone(),
                name: workflow.env_name.clone(),
                ..Default::default()
            })
            .await?;
        let deploy_name = binding
            .map(|b| b.app_deploy_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.app_primary_key.clone());

        let Some(app) = self
            .cluster
            .get_application(&record.namespace, &deploy_name)
            .await?
        else {
            self.terminate(record).await?;
            return Ok(RecordOutcome::Terminated);
        };
        let Some(status) = app.status.as_ref().and_then(|s| s.workflow.as_ref()) else {
            return Ok(RecordOutcome::Pending);
        };

        let revision = self
            .ds
            .find(ApplicationRevision {
                app_primary_key: record.app_primary_key.clone(),
                version: record.revision_primary_key.clone(),
                ..Default::default()
            })
            .await?;

        if status.record_name() == record.name {
            self.copy_status(record, revision, status).await?;
            return Ok(RecordOutcome::Updated);
        }

        // The application moved on; the revision holds the final status.
        let Some(revision) = revision else {
            let mut record = record;
            record.set_finished(true);
            record.status = WORKFLOW_RECORD_STATUS_FAIL.to_string();
            info!("revision of workflow record {} is gone, closing it", record.name);
            self.ds.update(record).await?;
            return Ok(RecordOutcome::Failed);
        };
        let Some(snapshot) = self
            .cluster
            .get_revision_application(&app_namespace(&app, &record), &revision.revision_cr_name)
            .await?
        else {
            self.terminate(record).await?;
            return Ok(RecordOutcome::Terminated);
        };
        let Some(mut status) = snapshot.status.and_then(|s| s.workflow) else {
            return Ok(RecordOutcome::Pending);
        };
        if !status.finished {
            status.finished = true;
            status.terminated = true;
        }
        if status.record_name() != record.name {
            warn!(
                "revision {} does not match workflow record {}, retrying later",
                revision.revision_cr_name, record.name
            );
            return Ok(RecordOutcome::Pending);
        }
        self.copy_status(record, Some(revision), &status).await?;
        Ok(RecordOutcome::Updated)
    }

    async fn copy_status(
        &self,
        mut record: WorkflowRecord,
        revision: Option<ApplicationRevision>,
        status: &WorkflowStatus,
    ) -> Result<(), SyncError> {
        record.status = status.status.clone();
        record.message = status.message.clone();
        record.mode = status.mode_string();
        record.steps = merge_step_statuses(&record.steps, &status.steps);
        record.set_finished(status.finished);
        record.end_time = status.end_time;
        let finished = record.is_finished();
        let record = self.ds.update(record).await?;

        if let Some(mut revision) = revision {
            revision.status = revision_status(&status.status).to_string();
            self.ds.update(revision).await?;
        }
        if finished {
            info!(
                "workflow record {} of app {} finished with status {}",
                record.name, record.app_primary_key, record.status
            );
        }
        Ok(())
    }

    async fn terminate(&self, mut record: WorkflowRecord) -> Result<(), SyncError> {
        let revision = self
            .ds
            .find(ApplicationRevision {
                app_primary_key: record.app_primary_key.clone(),
                version: record.revision_primary_key.clone(),
                ..Default::default()
            })
            .await?;
        record.status = WORKFLOW_RECORD_STATUS_TERMINATED.to_string();
        record.set_finished(true);
        info!("application of workflow record {} is gone, terminating it", record.name);
        self.ds.update(record).await?;
        if let Some(mut revision) = revision {
            revision.status = REVISION_STATUS_TERMINATED.to_string();
            self.ds.update(revision).await?;
        }
        Ok(())
    }
}

fn app_namespace(app: &resources::Application, record: &WorkflowRecord) -> String {
    app.metadata
        .namespace
        .clone()
        .unwrap_or_else(|| record.namespace.clone())
}

/// Replaces the record's steps with their cluster status by name, keeping
/// the aliases the record already knows. A record without steps takes every
/// cluster step.
fn merge_step_statuses(
    current: &[WorkflowStepStatus],
    cluster: &[resources::WorkflowStepStatus],
) -> Vec<WorkflowStepStatus> {
    let mut aliases = BTreeMap::new();
    for step in current {
        aliases.insert(step.name.clone(), step.alias.clone());
        for sub in &step.sub_steps_status {
            aliases.insert(sub.name.clone(), sub.alias.clone());
        }
    }
    let converted = step_statuses(cluster, &aliases);
    if current.is_empty() {
        return converted;
    }
    current
        .iter()
        .map(|step| {
            converted
                .iter()
                .find(|c| c.name == step.name)
                .cloned()
                .unwrap_or_else(|| step.clone())
        })
        .collect()
}

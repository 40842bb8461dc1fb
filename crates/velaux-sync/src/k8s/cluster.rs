/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Read access to the cluster objects the sync depends on.
//!
//! The engine only ever reads by name, so the surface is a small trait the
//! integration tests replace with an in-memory fake.

use crate::k8s::api::{with_retries, RetryConfig};
use crate::k8s::resources::{
    self, application_revision_resource, policy_resource, workflow_resource, AppPolicy,
    Application, WorkflowStepSpec,
};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client};
use std::future::Future;
use std::time::Duration;
use velaux_utils::telemetry::prelude::*;

/// Errors raised while reading cluster objects.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("timed out reading {0}")]
    Timeout(String),
    #[error("failed to decode cluster object: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Name-based reads of `core.oam.dev` objects. A missing object is `None`.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError>;

    /// Steps of a Workflow resource.
    async fn get_workflow_steps(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<WorkflowStepSpec>>, ClusterError>;

    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AppPolicy>, ClusterError>;

    /// The Application recorded by an ApplicationRevision, carrying the
    /// revision's workflow status.
    async fn get_revision_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError>;
}

/// [`ClusterReader`] over the Kubernetes API.
///
/// Every read is bounded by `timeout`; transient API errors are retried within
/// that bound.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
    timeout: Duration,
}

impl KubeClusterReader {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn bounded<T, F, Fut>(&self, what: String, operation: F) -> Result<T, ClusterError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        let retried = with_retries(operation, RetryConfig::bounded(self.timeout));
        match tokio::time::timeout(self.timeout, retried).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("timed out after {:?} reading {}", self.timeout, what);
                Err(ClusterError::Timeout(what))
            }
        }
    }

    async fn get_dynamic(
        &self,
        resource: ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let what = format!("{} {}/{}", resource.kind, namespace, name);
        self.bounded(what, || api.get_opt(name)).await
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError> {
        let api: Api<Application> = Api::namespaced(self.client.clone(), namespace);
        let what = format!("Application {}/{}", namespace, name);
        self.bounded(what, || api.get_opt(name)).await
    }

    async fn get_workflow_steps(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<WorkflowStepSpec>>, ClusterError> {
        let Some(obj) = self
            .get_dynamic(workflow_resource(), namespace, name)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(resources::workflow_steps(&obj)?))
    }

    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AppPolicy>, ClusterError> {
        let obj = self.get_dynamic(policy_resource(), namespace, name).await?;
        Ok(obj.as_ref().map(resources::policy_of))
    }

    async fn get_revision_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError> {
        let Some(obj) = self
            .get_dynamic(application_revision_resource(), namespace, name)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(resources::revision_application(&obj)?))
    }
}

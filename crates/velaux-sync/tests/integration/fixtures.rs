/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Test fixture: the memory datastore, a scripted cluster and the wired
//! engine, plus the Application manifests the tests sync.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use velaux_sync::datastore::memory::MemoryStore;
use velaux_sync::k8s::cluster::{ClusterError, ClusterReader};
use velaux_sync::k8s::resources::{AppPolicy, Application, WorkflowStepSpec};
use velaux_sync::utils::AppContext;

pub const EXAMPLE_APP: &str = r#"
apiVersion: core.oam.dev/v1beta1
kind: Application
metadata:
  name: example
  namespace: ns1
  generation: 1
spec:
  components:
    - name: nginx
      type: webservice
      properties:
        image: nginx
    - name: nginx2
      type: webservice
      properties:
        image: nginx2
      traits:
        - type: scaler
          properties:
            replicas: 2
  policies:
    - name: env-bindings
      type: env-binding
      properties:
        envs:
          - name: staging
            placement:
              clusterSelector:
                name: local
              namespaceSelector:
                name: staging
    - name: topology-beijing-demo
      type: topology
      properties:
        clusters: ["beijing"]
        namespace: demo
    - name: topology-local
      type: topology
      properties:
        clusters: ["local"]
        namespace: demo
  workflow:
    steps:
      - name: deploy
        type: deploy
        properties:
          policies: ["topology-beijing-demo", "topology-local"]
"#;

pub const BLOG_APP: &str = r#"
apiVersion: core.oam.dev/v1beta1
kind: Application
metadata:
  name: blog
  namespace: project-e
  generation: 1
spec:
  components:
    - name: wordpress
      type: webservice
      properties:
        image: wordpress
"#;

pub const RUNNING_APP: &str = r#"
apiVersion: core.oam.dev/v1beta1
kind: Application
metadata:
  name: podinfo
  namespace: default
  generation: 2
spec:
  components:
    - name: podinfo
      type: webservice
      properties:
        image: stefanprodan/podinfo
  workflow:
    ref: podinfo-release
status:
  workflow:
    appRevision: "podinfo-v1"
    status: executing
    mode: DAG-DAG
    finished: false
    steps:
      - name: deploy
        type: deploy
        phase: running
"#;

pub fn app_from_yaml(manifest: &str) -> Application {
    serde_yaml::from_str(manifest).expect("valid Application manifest")
}

/// Parses `manifest` and overrides name, namespace and generation.
pub fn app_named(manifest: &str, name: &str, namespace: &str, generation: i64) -> Application {
    let mut app = app_from_yaml(manifest);
    app.metadata.name = Some(name.to_string());
    app.metadata.namespace = Some(namespace.to_string());
    app.metadata.generation = Some(generation);
    app
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// In-memory stand-in for the `core.oam.dev` objects of a cluster.
#[derive(Default)]
pub struct FakeCluster {
    applications: Mutex<HashMap<Key, Application>>,
    workflows: Mutex<HashMap<Key, Vec<WorkflowStepSpec>>>,
    policies: Mutex<HashMap<Key, AppPolicy>>,
    revisions: Mutex<HashMap<Key, Application>>,
}

impl FakeCluster {
    pub fn put_application(&self, app: Application) {
        let k = key(
            app.metadata.namespace.as_deref().unwrap_or_default(),
            app.metadata.name.as_deref().unwrap_or_default(),
        );
        self.applications.lock().unwrap().insert(k, app);
    }

    pub fn remove_application(&self, namespace: &str, name: &str) {
        self.applications.lock().unwrap().remove(&key(namespace, name));
    }

    pub fn put_workflow(&self, namespace: &str, name: &str, steps: Vec<WorkflowStepSpec>) {
        self.workflows
            .lock()
            .unwrap()
            .insert(key(namespace, name), steps);
    }

    pub fn put_policy(&self, namespace: &str, policy: AppPolicy) {
        let k = key(namespace, &policy.name);
        self.policies.lock().unwrap().insert(k, policy);
    }

    pub fn put_revision(&self, namespace: &str, name: &str, snapshot: Application) {
        self.revisions
            .lock()
            .unwrap()
            .insert(key(namespace, name), snapshot);
    }
}

#[async_trait]
impl ClusterReader for FakeCluster {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn get_workflow_steps(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<WorkflowStepSpec>>, ClusterError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AppPolicy>, ClusterError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn get_revision_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, ClusterError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }
}

/// Memory datastore, fake cluster and the context wired over them.
pub struct TestFixture {
    pub ds: Arc<MemoryStore>,
    pub cluster: Arc<FakeCluster>,
    pub ctx: AppContext,
}

impl TestFixture {
    pub fn new() -> Self {
        let ds = Arc::new(MemoryStore::new());
        let cluster = Arc::new(FakeCluster::default());
        let ctx = AppContext::new(ds.clone(), cluster.clone());
        Self { ds, cluster, ctx }
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Cluster resource types
//!
//! The typed subset of the `core.oam.dev` resources the sync reads.
//!
//! `Application` is a full `kube` resource so it can be watched. Workflow,
//! Policy and ApplicationRevision are only ever fetched by name, so they are
//! read as [`DynamicObject`] and decoded through the helpers at the bottom of
//! this module.

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GROUP: &str = "core.oam.dev";

/// Desired state of a KubeVela Application.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<AppPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<TraitSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct TraitSpec {
    #[serde(rename = "type")]
    pub trait_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

/// A policy declared inline on the Application, or the body of a Policy resource.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AppPolicy {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct WorkflowSpec {
    /// Name of a Workflow resource holding the steps.
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub workflow_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<WorkflowStepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<WorkflowStepSpec>,
}

impl WorkflowStepSpec {
    /// String array property of the step, empty when absent.
    pub fn property_strings(&self, key: &str) -> Vec<String> {
        self.properties
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Observed state of an Application.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied_resources: Vec<AppliedResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<LatestRevision>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppliedResource {
    pub cluster: String,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub api_version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LatestRevision {
    pub name: String,
    pub revision: i64,
    pub revision_hash: String,
}

/// Execution state of the Application workflow.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStatus {
    pub app_revision: String,
    /// `StepByStep-DAG` on current controllers, `{steps, subSteps}` on older ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Value>,
    #[serde(alias = "phase")]
    pub status: String,
    pub message: String,
    pub suspend: bool,
    pub terminated: bool,
    pub finished: bool,
    pub steps: Vec<WorkflowStepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkflowStatus {
    /// Record name derived from the app revision; the default revision carries a `:`.
    pub fn record_name(&self) -> String {
        self.app_revision.replacen(':', "-", 1)
    }

    /// Execution mode rendered as `<steps>-<subSteps>`.
    pub fn mode_string(&self) -> String {
        match &self.mode {
            Some(Value::String(mode)) => mode.clone(),
            Some(Value::Object(mode)) => {
                let part = |key: &str| mode.get(key).and_then(Value::as_str).unwrap_or_default();
                format!("{}-{}", part("steps"), part("subSteps"))
            }
            _ => String::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStepStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub phase: String,
    pub message: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_execute_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execute_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_steps_status: Vec<WorkflowStepStatus>,
}

fn api_resource(version: &str, kind: &str) -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(GROUP, version, kind))
}

/// `core.oam.dev/v1alpha1` Workflow.
pub fn workflow_resource() -> ApiResource {
    api_resource("v1alpha1", "Workflow")
}

/// `core.oam.dev/v1alpha1` Policy.
pub fn policy_resource() -> ApiResource {
    api_resource("v1alpha1", "Policy")
}

/// `core.oam.dev/v1beta1` ApplicationRevision.
pub fn application_revision_resource() -> ApiResource {
    api_resource("v1beta1", "ApplicationRevision")
}

/// Steps of a Workflow resource; they sit at the top level of the object.
pub fn workflow_steps(obj: &DynamicObject) -> Result<Vec<WorkflowStepSpec>, serde_json::Error> {
    match obj.data.get("steps") {
        Some(steps) => serde_json::from_value(steps.clone()),
        None => Ok(Vec::new()),
    }
}

/// A Policy resource as an inline policy; type and properties sit at the top level.
pub fn policy_of(obj: &DynamicObject) -> AppPolicy {
    AppPolicy {
        name: obj.metadata.name.clone().unwrap_or_default(),
        policy_type: obj
            .data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        properties: obj.data.get("properties").cloned(),
    }
}

/// The Application snapshot an ApplicationRevision recorded, with the
/// revision's own workflow status when it carries one.
pub fn revision_application(obj: &DynamicObject) -> Result<Application, serde_json::Error> {
    let snapshot = obj
        .data
        .get("spec")
        .and_then(|spec| spec.get("application"))
        .cloned()
        .unwrap_or(Value::Null);
    let mut app: Application = serde_json::from_value(snapshot)?;
    if let Some(workflow) = obj.data.get("status").and_then(|s| s.get("workflow")) {
        let workflow: WorkflowStatus = serde_json::from_value(workflow.clone())?;
        app.status.get_or_insert_with(Default::default).workflow = Some(workflow);
    }
    Ok(app)
}

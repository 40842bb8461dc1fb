/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Decomposition of a cluster Application into datastore records.
//!
//! [`convert_app`] produces every row the engine persists for one
//! Application. Apart from looking up existing targets and environments and
//! fetching referenced Workflow and Policy resources it is a pure function of
//! the object.

use crate::datastore::{DataStore, DataStoreError, DataStoreExt};
use crate::k8s::cluster::{ClusterError, ClusterReader};
use crate::k8s::resources::{self, AppPolicy, WorkflowStatus, WorkflowStepSpec};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use velaux_models::constants::*;
use velaux_models::models::{
    Application, ApplicationComponent, ApplicationPolicy, ApplicationRevision, ApplicationTrait,
    ClusterTarget, Env, EnvBinding, Target, Workflow, WorkflowRecord, WorkflowStep,
    WorkflowStepStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("application has no {0}")]
    MissingMetadata(&'static str),
    #[error("workflow {namespace}/{name} referenced by the application does not exist")]
    MissingWorkflow { namespace: String, name: String },
    #[error("policy {namespace}/{name} referenced by a workflow step does not exist")]
    MissingPolicy { namespace: String, name: String },
    #[error(transparent)]
    DataStore(#[from] DataStoreError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Every record derived from one cluster Application.
#[derive(Debug, Clone)]
pub struct ConvertedApp {
    pub app: Application,
    pub env: Env,
    /// The env already existed and is reused rather than created.
    pub env_reused: bool,
    pub env_binding: EnvBinding,
    pub targets: Vec<Target>,
    pub components: Vec<ApplicationComponent>,
    pub policies: Vec<ApplicationPolicy>,
    pub workflow: Workflow,
    pub revision: Option<ApplicationRevision>,
    pub record: Option<WorkflowRecord>,
}

/// `name-namespace`, the identity used when the bare name is taken.
pub fn compose_name(name: &str, namespace: &str) -> String {
    format!("{}-{}", name, namespace)
}

/// Whether the Application was installed by the addon manager.
pub fn is_addon(cr: &resources::Application) -> bool {
    cr.metadata
        .name
        .as_deref()
        .is_some_and(|n| n.starts_with(ADDON_APP_PREFIX))
        && cr
            .metadata
            .labels
            .as_ref()
            .is_some_and(|l| l.contains_key(CR_LABEL_ADDON_NAME))
}

/// Provenance declared by the object itself: the explicit marker label, then
/// the same key as an annotation, then the platform app-name annotation.
pub fn declared_source_of_truth(cr: &resources::Application) -> SourceOfTruth {
    let label = cr
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(CR_LABEL_SOURCE_OF_TRUTH));
    let annotations = cr.metadata.annotations.as_ref();
    let annotation = annotations.and_then(|a| a.get(CR_LABEL_SOURCE_OF_TRUTH));
    if let Some(sot) = label
        .or(annotation)
        .and_then(|v| v.parse::<SourceOfTruth>().ok())
    {
        return sot;
    }
    if annotations.is_some_and(|a| a.contains_key(CR_ANNOTATION_APP_NAME)) {
        return SourceOfTruth::FromUx;
    }
    SourceOfTruth::FromCr
}

/// Revision status for a workflow phase.
pub fn revision_status(phase: &str) -> &'static str {
    match phase {
        "failed" => REVISION_STATUS_FAIL,
        "succeeded" => REVISION_STATUS_COMPLETE,
        "terminated" => REVISION_STATUS_TERMINATED,
        _ => REVISION_STATUS_RUNNING,
    }
}

/// Converts cluster step statuses, taking aliases from the workflow steps.
pub fn step_statuses(
    steps: &[resources::WorkflowStepStatus],
    aliases: &BTreeMap<String, String>,
) -> Vec<WorkflowStepStatus> {
    steps
        .iter()
        .map(|s| WorkflowStepStatus {
            id: s.id.clone(),
            name: s.name.clone(),
            alias: aliases.get(&s.name).cloned().unwrap_or_default(),
            step_type: s.step_type.clone(),
            phase: s.phase.clone(),
            message: s.message.clone(),
            reason: s.reason.clone(),
            first_execute_time: s.first_execute_time,
            last_execute_time: s.last_execute_time,
            sub_steps_status: step_statuses(&s.sub_steps_status, aliases),
        })
        .collect()
}

/// Step name to alias over a workflow, sub-steps included.
pub fn step_aliases(workflow: &Workflow) -> BTreeMap<String, String> {
    fn walk(steps: &[WorkflowStep], out: &mut BTreeMap<String, String>) {
        for step in steps {
            if !step.alias.is_empty() {
                out.insert(step.name.clone(), step.alias.clone());
            }
            walk(&step.sub_steps, out);
        }
    }
    let mut out = BTreeMap::new();
    walk(&workflow.steps, &mut out);
    out
}

fn convert_step(step: &WorkflowStepSpec) -> WorkflowStep {
    WorkflowStep {
        name: step.name.clone(),
        step_type: step.step_type.clone(),
        depends_on: step.depends_on.clone(),
        inputs: step.inputs.clone(),
        outputs: step.outputs.clone(),
        properties: step.properties.clone(),
        meta: step.meta.clone(),
        if_condition: step.if_condition.clone(),
        timeout: step.timeout.clone(),
        sub_steps: step.sub_steps.iter().map(convert_step).collect(),
        ..Default::default()
    }
}

/// Components in spec order; the first one is the main component.
pub fn convert_components(
    app_primary_key: &str,
    spec: &resources::ApplicationSpec,
) -> Vec<ApplicationComponent> {
    spec.components
        .iter()
        .enumerate()
        .map(|(i, c)| ApplicationComponent {
            app_primary_key: app_primary_key.to_string(),
            name: c.name.clone(),
            component_type: c.component_type.clone(),
            main: i == 0,
            creator: AUTO_GEN_COMP.to_string(),
            properties: c.properties.clone(),
            depends_on: c.depends_on.clone(),
            inputs: c.inputs.clone(),
            outputs: c.outputs.clone(),
            external_revision: c.external_revision.clone(),
            traits: c
                .traits
                .iter()
                .map(|t| ApplicationTrait {
                    trait_type: t.trait_type.clone(),
                    alias: t.trait_type.clone(),
                    description: "auto gen".to_string(),
                    creator: AUTO_GEN_COMP.to_string(),
                    properties: t.properties.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })
        .collect()
}

fn convert_policy(app_primary_key: &str, policy: &AppPolicy, creator: &str) -> ApplicationPolicy {
    ApplicationPolicy {
        app_primary_key: app_primary_key.to_string(),
        name: policy.name.clone(),
        policy_type: policy.policy_type.clone(),
        properties: policy.properties.clone(),
        creator: creator.to_string(),
        ..Default::default()
    }
}

/// Policy names referenced by deploy steps, sub-steps included.
fn referenced_policies(steps: &[WorkflowStepSpec], out: &mut Vec<String>) {
    for step in steps {
        if step.step_type == STEP_TYPE_DEPLOY {
            for name in step.property_strings("policies") {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        referenced_policies(&step.sub_steps, out);
    }
}

/// Cluster placements of the application, deduplicated, in discovery order:
/// topology policies, env-binding placements, applied resources. An
/// application placing nothing lands on the local cluster in its own namespace.
pub fn placements(cr: &resources::Application, policies: &[AppPolicy]) -> Vec<ClusterTarget> {
    let app_ns = cr.metadata.namespace.clone().unwrap_or_default();
    let mut found: Vec<(String, String)> = Vec::new();

    for policy in policies.iter().filter(|p| p.policy_type == POLICY_TYPE_TOPOLOGY) {
        let props = policy.properties.as_ref().unwrap_or(&Value::Null);
        let namespace = props
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let clusters: Vec<&str> = props
            .get("clusters")
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if clusters.is_empty() {
            found.push((LOCAL_CLUSTER.to_string(), namespace.to_string()));
        }
        for cluster in clusters {
            found.push((cluster.to_string(), namespace.to_string()));
        }
    }
    for policy in policies.iter().filter(|p| p.policy_type == POLICY_TYPE_ENV_BINDING) {
        let props = policy.properties.as_ref().unwrap_or(&Value::Null);
        for (_, cluster, namespace) in env_binding_envs(props) {
            found.push((cluster, namespace));
        }
    }
    if let Some(status) = cr.status.as_ref() {
        for resource in &status.applied_resources {
            found.push((resource.cluster.clone(), resource.namespace.clone()));
        }
    }
    if found.is_empty() {
        found.push((LOCAL_CLUSTER.to_string(), String::new()));
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(cluster, namespace)| ClusterTarget {
            cluster_name: if cluster.is_empty() {
                LOCAL_CLUSTER.to_string()
            } else {
                cluster
            },
            namespace: if namespace.is_empty() {
                app_ns.clone()
            } else {
                namespace
            },
        })
        .filter(|target| seen.insert(target.identity()))
        .collect()
}

/// `(env name, cluster, namespace)` of every env of an env-binding policy.
pub fn env_binding_envs(props: &Value) -> Vec<(String, String, String)> {
    props
        .get("envs")
        .and_then(Value::as_array)
        .map(|envs| {
            envs.iter()
                .map(|env| {
                    let str_at = |pointer: &str| {
                        env.pointer(pointer)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    (
                        str_at("/name"),
                        str_at("/placement/clusterSelector/name"),
                        str_at("/placement/namespaceSelector/name"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Decomposes `cr` into the records persisted under `app_primary_key`.
///
/// `source_of_truth` is recorded on the Application label; addon
/// applications land in the addon project.
pub async fn convert_app(
    ds: &dyn DataStore,
    cluster: &dyn ClusterReader,
    cr: &resources::Application,
    app_primary_key: &str,
    source_of_truth: SourceOfTruth,
) -> Result<ConvertedApp, ConvertError> {
    let cr_name = cr
        .metadata
        .name
        .clone()
        .ok_or(ConvertError::MissingMetadata("name"))?;
    let namespace = cr
        .metadata
        .namespace
        .clone()
        .ok_or(ConvertError::MissingMetadata("namespace"))?;
    let generation = cr.metadata.generation.unwrap_or_default();

    // Steps first: the policies they reference join the policy set.
    let steps = match cr.spec.workflow.as_ref() {
        Some(wf) if !wf.workflow_ref.is_empty() => cluster
            .get_workflow_steps(&namespace, &wf.workflow_ref)
            .await?
            .ok_or_else(|| ConvertError::MissingWorkflow {
                namespace: namespace.clone(),
                name: wf.workflow_ref.clone(),
            })?,
        Some(wf) => wf.steps.clone(),
        None => Vec::new(),
    };

    let mut all_policies: Vec<(AppPolicy, &str)> = cr
        .spec
        .policies
        .iter()
        .map(|p| (p.clone(), AUTO_GEN_POLICY))
        .collect();
    let mut referenced = Vec::new();
    referenced_policies(&steps, &mut referenced);
    for name in referenced {
        if all_policies.iter().any(|(p, _)| p.name == name) {
            continue;
        }
        let policy = cluster
            .get_policy(&namespace, &name)
            .await?
            .ok_or_else(|| ConvertError::MissingPolicy {
                namespace: namespace.clone(),
                name: name.clone(),
            })?;
        all_policies.push((policy, AUTO_GEN_REF_POLICY));
    }

    // Environment and targets.
    let cluster_targets = placements(
        cr,
        &all_policies
            .iter()
            .map(|(p, _)| p.clone())
            .collect::<Vec<_>>(),
    );
    let existing_targets = ds.list_as(Target::default(), None).await?;
    let bound_env = ds
        .list_as(
            Env {
                namespace: namespace.clone(),
                ..Default::default()
            },
            None,
        )
        .await?
        .into_iter()
        .next();

    let project = if is_addon(cr) {
        DEFAULT_ADDON_PROJECT.to_string()
    } else if let Some(env) = bound_env.as_ref() {
        env.project.clone()
    } else {
        cluster_targets
            .iter()
            .find_map(|ct| {
                existing_targets
                    .iter()
                    .find(|t| t.cluster.as_ref() == Some(ct))
                    .map(|t| t.project.clone())
            })
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string())
    };

    let targets: Vec<Target> = cluster_targets
        .into_iter()
        .map(|ct| {
            existing_targets
                .iter()
                .find(|t| t.cluster.as_ref() == Some(&ct))
                .cloned()
                .unwrap_or_else(|| Target {
                    name: format!(
                        "{}{}-{}",
                        AUTO_GEN_TARGET_NAME_PREFIX, ct.cluster_name, ct.namespace
                    ),
                    alias: format!("{}/{}", ct.cluster_name, ct.namespace),
                    description: AUTO_GEN_DESC.to_string(),
                    project: project.clone(),
                    cluster: Some(ct),
                    ..Default::default()
                })
        })
        .collect();
    let target_names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();

    let (env, env_reused) = match bound_env {
        Some(mut env) => {
            for name in &target_names {
                if !env.targets.contains(name) {
                    env.targets.push(name.clone());
                }
            }
            (env, true)
        }
        None => {
            let mut name = format!("{}{}", AUTO_GEN_ENV_NAME_PREFIX, namespace);
            if ds
                .exists(Env {
                    name: name.clone(),
                    ..Default::default()
                })
                .await?
            {
                name = format!("{}-{}", name, random_suffix());
            }
            let env = Env {
                name,
                alias: format!("Synced-{}", namespace),
                description: AUTO_GEN_DESC.to_string(),
                project: project.clone(),
                namespace: namespace.clone(),
                targets: target_names,
                ..Default::default()
            };
            (env, false)
        }
    };

    let env_binding = EnvBinding {
        app_primary_key: app_primary_key.to_string(),
        name: env.name.clone(),
        app_deploy_name: cr_name.clone(),
        ..Default::default()
    };

    let components = convert_components(app_primary_key, &cr.spec);
    let policies = all_policies
        .iter()
        .map(|(p, creator)| convert_policy(app_primary_key, p, creator))
        .collect();

    let workflow = Workflow {
        app_primary_key: app_primary_key.to_string(),
        name: format!("{}{}", AUTO_GEN_WORKFLOW_NAME_PREFIX, cr_name),
        alias: "Workflow".to_string(),
        description: AUTO_GEN_DESC.to_string(),
        env_name: env.name.clone(),
        default: true,
        steps: steps.iter().map(convert_step).collect(),
        ..Default::default()
    };

    let (revision, record) = match cr.status.as_ref().and_then(|s| s.workflow.as_ref()) {
        Some(status) if !status.app_revision.is_empty() => {
            let (revision, record) = convert_execution(status, app_primary_key, &namespace, &workflow);
            (Some(revision), Some(record))
        }
        _ => (None, None),
    };

    let mut labels = BTreeMap::new();
    labels.insert(
        LABEL_SOURCE_OF_TRUTH.to_string(),
        source_of_truth.as_str().to_string(),
    );
    labels.insert(LABEL_SYNC_NAMESPACE.to_string(), namespace.clone());
    labels.insert(LABEL_SYNC_GENERATION.to_string(), generation.to_string());
    let app = Application {
        name: app_primary_key.to_string(),
        alias: cr_name,
        project,
        description: AUTO_GEN_DESC.to_string(),
        labels,
        ..Default::default()
    };

    Ok(ConvertedApp {
        app,
        env,
        env_reused,
        env_binding,
        targets,
        components,
        policies,
        workflow,
        revision,
        record,
    })
}

/// Revision and workflow record of the execution `status` describes.
fn convert_execution(
    status: &WorkflowStatus,
    app_primary_key: &str,
    namespace: &str,
    workflow: &Workflow,
) -> (ApplicationRevision, WorkflowRecord) {
    let name = status.record_name();
    let revision = ApplicationRevision {
        app_primary_key: app_primary_key.to_string(),
        version: name.clone(),
        revision_cr_name: name.clone(),
        status: if status.finished {
            revision_status(&status.status).to_string()
        } else {
            REVISION_STATUS_RUNNING.to_string()
        },
        deploy_user: AUTO_GEN_DEPLOY_USER.to_string(),
        note: AUTO_GEN_DESC.to_string(),
        env_name: workflow.env_name.clone(),
        workflow_name: workflow.name.clone(),
        ..Default::default()
    };
    let mut record = WorkflowRecord {
        workflow_name: workflow.name.clone(),
        workflow_alias: workflow.alias.clone(),
        app_primary_key: app_primary_key.to_string(),
        revision_primary_key: name.clone(),
        name,
        namespace: namespace.to_string(),
        start_time: status.start_time,
        end_time: status.end_time,
        status: status.status.clone(),
        message: status.message.clone(),
        mode: status.mode_string(),
        steps: step_statuses(&status.steps, &step_aliases(workflow)),
        ..Default::default()
    };
    record.set_finished(status.finished);
    (revision, record)
}

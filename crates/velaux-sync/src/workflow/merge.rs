/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Environment workflow merge
//!
//! When the targets of an environment change, the deploy steps of every
//! workflow bound to it follow while user-authored steps stay where they are.
//!
//! ## Algorithm
//!
//! 1. Both the stored workflow and the desired one (one `deploy` step and one
//!    `topology` policy per env target) are turned into a [`Plan`]: every step
//!    with the policies it references, every policy resolved to the target
//!    identities (`cluster/namespace`) it places on.
//! 2. [`compare`] diffs the two target sets. Stored steps keep their position;
//!    a step whose policies all lost their targets is deleted, one that lost
//!    some is modified. Desired steps bringing new targets are appended
//!    (cloud resource steps go first).
//! 3. [`Plan::merged_steps`] and [`Plan::policy_changes`] turn the states into
//!    the new step list and the policy rows to create, put and delete.
//!
//! Policies live in an arena owned by the plan and steps refer to them by
//! index, so a policy referenced by several steps carries a single state.

use crate::datastore::{DataStore, DataStoreExt, ListOptions};
use crate::sync::convert::env_binding_envs;
use crate::sync::SyncError;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use velaux_models::constants::{
    AUTO_GEN_WORKFLOW_NAME_PREFIX, POLICY_TYPE_ENV_BINDING, POLICY_TYPE_TOPOLOGY,
    STEP_TYPE_DEPLOY, STEP_TYPE_DEPLOY_TO_ENV,
};
use velaux_models::models::{
    Application, ApplicationPolicy, Env, EnvBinding, Target, Workflow, WorkflowStep,
};
use velaux_utils::telemetry::prelude::*;

/// Deploys cloud resources locally and copies their secrets to the target.
pub const STEP_TYPE_DEPLOY_CLOUD_RESOURCE: &str = "deploy-cloud-resource";

/// What the merge does with a step or a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeState {
    #[default]
    Keep,
    New,
    Update,
    Delete,
    /// The step stays with part of its policy references removed.
    Modify,
}

#[derive(Debug, Clone)]
struct PlanPolicy {
    name: String,
    policy_type: String,
    targets: Vec<String>,
    state: MergeState,
}

#[derive(Debug, Clone)]
struct PlanStep {
    name: String,
    step_type: String,
    policies: Vec<usize>,
    state: MergeState,
}

/// Steps of a workflow with their resolved policy references.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    policies: Vec<PlanPolicy>,
    steps: Vec<PlanStep>,
}

/// Policy rows to write after a merge.
#[derive(Debug, Clone, Default)]
pub struct PolicyChanges {
    pub created: Vec<ApplicationPolicy>,
    pub updated: Vec<ApplicationPolicy>,
    pub deleted: Vec<ApplicationPolicy>,
}

fn str_prop<'a>(props: &'a Value, key: &str) -> &'a str {
    props.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl Plan {
    /// Resolves `steps` against `policies`.
    ///
    /// `topology` policies are keyed by name. `env-binding` policies produce
    /// one entry per env, keyed `policy-env`, which `deploy2env` steps address
    /// through their `policy` and `env` properties. Steps of other types are
    /// kept without policies, as are legacy steps whose policy is unknown.
    pub fn from_workflow(steps: &[WorkflowStep], policies: &[ApplicationPolicy]) -> Self {
        let mut plan = Plan::default();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for policy in policies {
            let props = policy.properties.as_ref().unwrap_or(&Value::Null);
            match policy.policy_type.as_str() {
                POLICY_TYPE_TOPOLOGY => {
                    let namespace = str_prop(props, "namespace");
                    let targets = props
                        .get("clusters")
                        .and_then(Value::as_array)
                        .map(|clusters| {
                            clusters
                                .iter()
                                .filter_map(Value::as_str)
                                .map(|c| format!("{}/{}", c, namespace))
                                .collect()
                        })
                        .unwrap_or_default();
                    by_key.insert(policy.name.clone(), plan.policies.len());
                    plan.policies.push(PlanPolicy {
                        name: policy.name.clone(),
                        policy_type: policy.policy_type.clone(),
                        targets,
                        state: MergeState::Keep,
                    });
                }
                POLICY_TYPE_ENV_BINDING => {
                    for (env, cluster, namespace) in env_binding_envs(props) {
                        by_key.insert(format!("{}-{}", policy.name, env), plan.policies.len());
                        plan.policies.push(PlanPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            targets: vec![format!("{}/{}", cluster, namespace)],
                            state: MergeState::Keep,
                        });
                    }
                }
                _ => {}
            }
        }

        for step in steps {
            let policies = match step.step_type.as_str() {
                STEP_TYPE_DEPLOY => step
                    .property_strings("policies")
                    .iter()
                    .filter_map(|name| by_key.get(name).copied())
                    .collect(),
                STEP_TYPE_DEPLOY_TO_ENV | STEP_TYPE_DEPLOY_CLOUD_RESOURCE => {
                    let policy = step.property_str("policy").unwrap_or_default();
                    let env = step.property_str("env").unwrap_or_default();
                    by_key
                        .get(&format!("{}-{}", policy, env))
                        .filter(|_| !policy.is_empty())
                        .map(|idx| vec![*idx])
                        .unwrap_or_default()
                }
                _ => Vec::new(),
            };
            plan.steps.push(PlanStep {
                name: step.name.clone(),
                step_type: step.step_type.clone(),
                policies,
                state: MergeState::Keep,
            });
        }
        plan
    }

    /// `(name, type, state)` of every step, in order.
    pub fn step_states(&self) -> Vec<(&str, &str, MergeState)> {
        self.steps
            .iter()
            .map(|s| (s.name.as_str(), s.step_type.as_str(), s.state))
            .collect()
    }

    /// Number of policy references a step keeps after the merge.
    pub fn live_policy_count(&self, step: &str) -> usize {
        self.steps
            .iter()
            .find(|s| s.name == step)
            .map(|s| {
                s.policies
                    .iter()
                    .filter(|p| self.policies[**p].state != MergeState::Delete)
                    .count()
            })
            .unwrap_or_default()
    }

    fn target_keys(&self, step_type: &str, policy: usize) -> Vec<String> {
        let targets = &self.policies[policy].targets;
        if step_type == STEP_TYPE_DEPLOY_CLOUD_RESOURCE {
            targets.iter().map(|t| format!("c-{}", t)).collect()
        } else {
            targets.clone()
        }
    }

    fn all_target_keys(&self) -> HashSet<String> {
        self.steps
            .iter()
            .flat_map(|s| s.policies.iter().map(|p| self.target_keys(&s.step_type, *p)))
            .flatten()
            .collect()
    }

    /// The step list after the merge.
    ///
    /// Kept steps come from `existing`, new ones from `desired`; a modified
    /// `deploy` step is the existing one with its `policies` property narrowed
    /// to the references that survive.
    pub fn merged_steps(
        &self,
        desired: &[WorkflowStep],
        existing: &[WorkflowStep],
    ) -> Vec<WorkflowStep> {
        let existing: HashMap<&str, &WorkflowStep> =
            existing.iter().map(|s| (s.name.as_str(), s)).collect();
        let desired: HashMap<&str, &WorkflowStep> =
            desired.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut result = Vec::new();
        for step in &self.steps {
            match step.state {
                MergeState::Keep => {
                    if let Some(s) = existing.get(step.name.as_str()) {
                        result.push((*s).clone());
                    }
                }
                MergeState::New | MergeState::Update => {
                    if let Some(s) = desired.get(step.name.as_str()) {
                        result.push((*s).clone());
                    }
                }
                MergeState::Modify if step.step_type == STEP_TYPE_DEPLOY => {
                    let Some(s) = existing.get(step.name.as_str()) else {
                        continue;
                    };
                    let mut names: Vec<String> = Vec::new();
                    for p in &step.policies {
                        let policy = &self.policies[*p];
                        if policy.state != MergeState::Delete && !names.contains(&policy.name) {
                            names.push(policy.name.clone());
                        }
                    }
                    let mut modified = (*s).clone();
                    let props = modified.properties.get_or_insert_with(|| json!({}));
                    if let Some(obj) = props.as_object_mut() {
                        obj.insert("policies".to_string(), json!(names));
                    }
                    result.push(modified);
                }
                _ => {}
            }
        }
        result
    }

    /// Policy rows created, updated and deleted by the merge.
    ///
    /// An env-binding policy is shared by all its envs, so it survives as long
    /// as any step still uses one of them.
    pub fn policy_changes(
        &self,
        existing: &[ApplicationPolicy],
        desired: &[ApplicationPolicy],
    ) -> PolicyChanges {
        let mut deleted: HashSet<&str> = HashSet::new();
        let mut created: HashSet<&str> = HashSet::new();
        let mut updated: HashSet<&str> = HashSet::new();
        let mut kept: HashSet<&str> = HashSet::new();

        for step in &self.steps {
            for p in &step.policies {
                let policy = &self.policies[*p];
                let shared = policy.policy_type == POLICY_TYPE_ENV_BINDING;
                match policy.state {
                    MergeState::Delete => {
                        if shared && kept.contains(policy.name.as_str()) {
                            continue;
                        }
                        deleted.insert(&policy.name);
                    }
                    MergeState::New => {
                        created.insert(&policy.name);
                    }
                    MergeState::Update => {
                        updated.insert(&policy.name);
                    }
                    MergeState::Keep | MergeState::Modify => {
                        kept.insert(&policy.name);
                        if shared {
                            deleted.remove(policy.name.as_str());
                        }
                    }
                }
            }
        }

        let mut changes = PolicyChanges::default();
        for policy in existing {
            if deleted.remove(policy.name.as_str()) {
                changes.deleted.push(policy.clone());
            }
        }
        for policy in desired {
            if updated.remove(policy.name.as_str()) {
                created.remove(policy.name.as_str());
                changes.updated.push(policy.clone());
            } else if created.remove(policy.name.as_str()) {
                changes.created.push(policy.clone());
            }
        }
        changes
    }
}

fn includes_all(set: &HashSet<String>, keys: &[String]) -> bool {
    !keys.is_empty() && keys.iter().all(|k| set.contains(k))
}

/// Merges the stored plan `old` with the desired plan `new`.
pub fn compare(old: Plan, new: Plan) -> Plan {
    let old_targets = old.all_target_keys();
    let new_targets = new.all_target_keys();
    let need_deleted: HashSet<String> = old_targets.difference(&new_targets).cloned().collect();
    let need_added: HashSet<String> = new_targets.difference(&old_targets).cloned().collect();

    let offset = old.policies.len();
    let mut merged = Plan {
        policies: old.policies,
        steps: Vec::new(),
    };
    merged.policies.extend(new.policies);

    let mut cloud_step_exists = false;
    for mut step in old.steps {
        let mut deleted = 0;
        for p in &step.policies {
            if includes_all(&need_deleted, &merged.target_keys(&step.step_type, *p)) {
                merged.policies[*p].state = MergeState::Delete;
                deleted += 1;
            }
        }
        if deleted > 0 && deleted == step.policies.len() {
            step.state = MergeState::Delete;
        } else if deleted > 0 {
            step.state = MergeState::Modify;
        }
        if step.step_type == STEP_TYPE_DEPLOY_CLOUD_RESOURCE {
            cloud_step_exists = true;
        }
        merged.steps.push(step);
    }

    for mut step in new.steps {
        for p in step.policies.iter_mut() {
            *p += offset;
        }
        let mut added = false;
        for p in &step.policies {
            if includes_all(&need_added, &merged.target_keys(&step.step_type, *p)) {
                let policy = &mut merged.policies[*p];
                policy.state = if policy.policy_type == POLICY_TYPE_ENV_BINDING && cloud_step_exists
                {
                    MergeState::Update
                } else {
                    MergeState::New
                };
                added = true;
            }
        }
        if added {
            step.state = MergeState::New;
            if step.step_type == STEP_TYPE_DEPLOY_CLOUD_RESOURCE {
                merged.steps.insert(0, step);
            } else {
                merged.steps.push(step);
            }
        }
    }
    merged
}

/// Targets of `env` with a cluster placement, in env order.
async fn env_targets(ds: &dyn DataStore, env: &Env) -> Result<Vec<Target>, SyncError> {
    if env.targets.is_empty() {
        return Ok(Vec::new());
    }
    let mut targets = ds
        .list_as(
            Target {
                project: env.project.clone(),
                ..Default::default()
            },
            Some(&ListOptions::with_in("name", env.targets.clone())),
        )
        .await?;
    targets.retain(|t| t.cluster.is_some());
    targets.sort_by_key(|t| env.targets.iter().position(|n| *n == t.name));
    Ok(targets)
}

/// The desired steps and policies of `app` in `env`: one `deploy` step and
/// one `topology` policy per target.
pub async fn gen_env_workflow(
    ds: &dyn DataStore,
    app: &Application,
    env: &Env,
) -> Result<(Vec<WorkflowStep>, Vec<ApplicationPolicy>), SyncError> {
    let mut steps = Vec::new();
    let mut policies = Vec::new();
    for target in env_targets(ds, env).await? {
        let Some(cluster) = target.cluster.as_ref() else {
            continue;
        };
        steps.push(WorkflowStep {
            name: target.name.clone(),
            alias: format!("Deploy To {}", target.name),
            description: format!("deploy app to delivery target {}", target.name),
            step_type: STEP_TYPE_DEPLOY.to_string(),
            properties: Some(json!({ "policies": [target.name] })),
            ..Default::default()
        });
        policies.push(ApplicationPolicy {
            app_primary_key: app.name.clone(),
            name: target.name.clone(),
            description: format!("auto generated by the target {}", target.name),
            policy_type: POLICY_TYPE_TOPOLOGY.to_string(),
            env_name: env.name.clone(),
            properties: Some(json!({
                "clusters": [cluster.cluster_name],
                "namespace": cluster.namespace,
            })),
            ..Default::default()
        });
    }
    Ok((steps, policies))
}

/// The workflow of `app` bound to `env`: the default one among those naming
/// the env, else the one named after the env.
async fn env_workflow(
    ds: &dyn DataStore,
    app: &Application,
    env: &Env,
) -> Result<Option<Workflow>, SyncError> {
    let mut workflows = ds
        .list_as(
            Workflow {
                app_primary_key: app.name.clone(),
                env_name: env.name.clone(),
                ..Default::default()
            },
            None,
        )
        .await?;
    if let Some(pos) = workflows.iter().position(|w| w.default) {
        return Ok(Some(workflows.swap_remove(pos)));
    }
    if !workflows.is_empty() {
        return Ok(Some(workflows.swap_remove(0)));
    }
    Ok(ds
        .find(Workflow {
            app_primary_key: app.name.clone(),
            name: format!("{}{}", AUTO_GEN_WORKFLOW_NAME_PREFIX, env.name),
            ..Default::default()
        })
        .await?)
}

/// Brings the workflow of `app` in `env` in line with the env targets.
///
/// An app without a workflow for the env is left alone. Policy writes are
/// logged and skipped on failure; the workflow write is not.
pub async fn update_env_workflow(
    ds: &dyn DataStore,
    app: &Application,
    env: &Env,
) -> Result<(), SyncError> {
    let Some(mut workflow) = env_workflow(ds, app, env).await? else {
        debug!("app {} has no workflow for env {}", app.name, env.name);
        return Ok(());
    };

    let existing_policies = ds
        .list_as(
            ApplicationPolicy {
                app_primary_key: app.name.clone(),
                ..Default::default()
            },
            Some(&ListOptions::with_in(
                "type",
                vec![
                    POLICY_TYPE_TOPOLOGY.to_string(),
                    POLICY_TYPE_ENV_BINDING.to_string(),
                ],
            )),
        )
        .await?;
    let (desired_steps, desired_policies) = gen_env_workflow(ds, app, env).await?;

    let plan = compare(
        Plan::from_workflow(&workflow.steps, &existing_policies),
        Plan::from_workflow(&desired_steps, &desired_policies),
    );
    debug!("merge plan for {}/{}: {:?}", app.name, workflow.name, plan.step_states());

    workflow.steps = plan.merged_steps(&desired_steps, &workflow.steps);
    let workflow_name = workflow.name.clone();
    ds.update(workflow).await?;

    let changes = plan.policy_changes(&existing_policies, &desired_policies);
    for policy in changes.deleted {
        let key = format!("{}-{}", policy.app_primary_key, policy.name);
        match ds.remove(policy).await {
            Ok(()) => info!("deleted policy {} while updating workflow {}", key, workflow_name),
            Err(e) => error!("failed to delete policy {}: {}", key, e),
        }
    }
    let mut created: Vec<_> = changes.created.into_iter().map(Into::into).collect();
    if let Err(e) = ds.batch_add(&mut created).await {
        error!("failed to create policies of workflow {}: {}", workflow_name, e);
    }
    for policy in changes.updated {
        let key = format!("{}-{}", policy.app_primary_key, policy.name);
        match ds.update(policy).await {
            Ok(_) => info!("updated policy {} while updating workflow {}", key, workflow_name),
            Err(e) => error!("failed to update policy {}: {}", key, e),
        }
    }
    Ok(())
}

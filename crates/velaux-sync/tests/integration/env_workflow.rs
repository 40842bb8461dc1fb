/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use serde_json::json;
use velaux_models::models::{
    Application, ApplicationPolicy, ClusterTarget, Env, EnvBinding, Target, Workflow, WorkflowStep,
};
use velaux_sync::datastore::DataStoreExt;

const APP: &str = "app-env-test";

fn deploy_step(name: &str, policies: &[&str]) -> WorkflowStep {
    WorkflowStep {
        name: name.to_string(),
        step_type: "deploy".to_string(),
        properties: Some(json!({ "policies": policies })),
        ..Default::default()
    }
}

fn custom_step(name: &str, step_type: &str) -> WorkflowStep {
    WorkflowStep {
        name: name.to_string(),
        step_type: step_type.to_string(),
        ..Default::default()
    }
}

/// App bound to env `dev`, with targets t1..t4 in project `proj` and
/// topology policies for `policies`.
async fn setup(fixture: &TestFixture, steps: Vec<WorkflowStep>, policies: &[&str]) {
    let ds = &fixture.ds;
    ds.insert(Application {
        name: APP.to_string(),
        project: "proj".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    for i in 1..=4 {
        ds.insert(Target {
            name: format!("t{}", i),
            project: "proj".to_string(),
            cluster: Some(ClusterTarget {
                cluster_name: "local".to_string(),
                namespace: format!("t{}", i),
            }),
            ..Default::default()
        })
        .await
        .unwrap();
    }
    ds.insert(Env {
        name: "dev".to_string(),
        project: "proj".to_string(),
        namespace: "dev".to_string(),
        targets: policies.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    })
    .await
    .unwrap();
    ds.insert(EnvBinding {
        app_primary_key: APP.to_string(),
        name: "dev".to_string(),
        app_deploy_name: APP.to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    ds.insert(Workflow {
        app_primary_key: APP.to_string(),
        name: "workflow-dev".to_string(),
        env_name: "dev".to_string(),
        default: true,
        steps,
        ..Default::default()
    })
    .await
    .unwrap();
    for policy in policies {
        ds.insert(ApplicationPolicy {
            app_primary_key: APP.to_string(),
            name: policy.to_string(),
            policy_type: "topology".to_string(),
            env_name: "dev".to_string(),
            properties: Some(json!({"clusters": ["local"], "namespace": policy})),
            ..Default::default()
        })
        .await
        .unwrap();
    }
}

async fn workflow_steps(fixture: &TestFixture) -> Vec<WorkflowStep> {
    fixture
        .ds
        .fetch(Workflow {
            app_primary_key: APP.to_string(),
            name: "workflow-dev".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .steps
}

async fn policy_names(fixture: &TestFixture) -> Vec<String> {
    let mut names: Vec<String> = fixture
        .ds
        .list_as(
            ApplicationPolicy {
                app_primary_key: APP.to_string(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    names
}

fn step_names(steps: &[WorkflowStep]) -> Vec<&str> {
    steps.iter().map(|s| s.name.as_str()).collect()
}

#[tokio::test]
async fn test_custom_steps_keep_their_positions() {
    let fixture = TestFixture::new();
    setup(
        &fixture,
        vec![
            deploy_step("t1", &["t1"]),
            custom_step("suspend", "suspend"),
            deploy_step("t2", &["t2"]),
            custom_step("notify", "notification"),
        ],
        &["t1", "t2"],
    )
    .await;
    let envs = &fixture.ctx.envs;

    let env = envs
        .update_env_targets("dev", vec!["t1".into(), "t2".into(), "t3".into()])
        .await
        .unwrap();
    assert_eq!(env.targets.len(), 3);
    let steps = workflow_steps(&fixture).await;
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[1].step_type, "suspend");
    assert_eq!(steps[3].step_type, "notification");
    assert_eq!(steps[4].name, "t3");
    assert_eq!(steps[4].property_strings("policies"), vec!["t3"]);
    assert_eq!(policy_names(&fixture).await, vec!["t1", "t2", "t3"]);

    envs.update_env_targets("dev", vec!["t2".into(), "t3".into()])
        .await
        .unwrap();
    let steps = workflow_steps(&fixture).await;
    assert_eq!(step_names(&steps), vec!["suspend", "t2", "notify", "t3"]);
    assert_eq!(policy_names(&fixture).await, vec!["t2", "t3"]);

    // Same targets again: nothing moves.
    envs.update_env_targets("dev", vec!["t2".into(), "t3".into()])
        .await
        .unwrap();
    assert_eq!(workflow_steps(&fixture).await, steps);
}

#[tokio::test]
async fn test_concurrent_step_gains_and_loses_targets() {
    let fixture = TestFixture::new();
    setup(
        &fixture,
        vec![deploy_step("deploy", &["t1", "t2"])],
        &["t1", "t2"],
    )
    .await;
    let envs = &fixture.ctx.envs;

    envs.update_env_targets("dev", vec!["t1".into(), "t2".into(), "t3".into()])
        .await
        .unwrap();
    let steps = workflow_steps(&fixture).await;
    assert_eq!(step_names(&steps), vec!["deploy", "t3"]);

    envs.update_env_targets("dev", vec!["t2".into(), "t3".into()])
        .await
        .unwrap();
    let steps = workflow_steps(&fixture).await;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].property_strings("policies"), vec!["t2"]);
    assert_eq!(policy_names(&fixture).await, vec!["t2", "t3"]);
}

#[tokio::test]
async fn test_unbound_apps_and_missing_envs() {
    let fixture = TestFixture::new();
    let envs = &fixture.ctx.envs;
    assert!(envs
        .update_env_targets("missing", vec![])
        .await
        .unwrap_err()
        .is_not_found());

    envs.create(Env {
        name: "qa".to_string(),
        project: "proj".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    let env = envs
        .update_env_targets("qa", vec!["t1".into()])
        .await
        .unwrap();
    assert_eq!(env.targets, vec!["t1"]);
    assert!(fixture
        .ds
        .list_as(Workflow::default(), None)
        .await
        .unwrap()
        .is_empty());
}

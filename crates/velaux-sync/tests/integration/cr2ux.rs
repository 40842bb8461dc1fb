/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{app_from_yaml, app_named, TestFixture, BLOG_APP, EXAMPLE_APP, RUNNING_APP};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use velaux_models::constants::{
    SourceOfTruth, AUTO_GEN_POLICY, AUTO_GEN_REF_POLICY, LABEL_SOURCE_OF_TRUTH, LABEL_SYNC_NAMESPACE,
};
use velaux_models::models::{
    Application, ApplicationComponent, ApplicationPolicy, ApplicationRevision, ClusterTarget, Env,
    EnvBinding, Target, Workflow, WorkflowRecord,
};
use velaux_sync::datastore::DataStoreExt;
use velaux_sync::k8s::resources::{AppPolicy, WorkflowStepSpec};
use velaux_sync::sync::cr2ux::Cr2Ux;
use velaux_sync::sync::SyncOutcome;

async fn components(fixture: &TestFixture, app: &str) -> Vec<ApplicationComponent> {
    fixture
        .ds
        .list_as(
            ApplicationComponent {
                app_primary_key: app.to_string(),
                ..Default::default()
            },
            None,
        )
        .await
        .expect("list components")
}

async fn policies(fixture: &TestFixture, app: &str) -> Vec<ApplicationPolicy> {
    fixture
        .ds
        .list_as(
            ApplicationPolicy {
                app_primary_key: app.to_string(),
                ..Default::default()
            },
            None,
        )
        .await
        .expect("list policies")
}

#[tokio::test]
async fn test_sync_and_delete_example_app() {
    let fixture = TestFixture::new();
    let engine = &fixture.ctx.engine;
    let cr = app_from_yaml(EXAMPLE_APP);

    assert_eq!(engine.add_or_update(&cr).await.unwrap(), SyncOutcome::Synced);

    let app = fixture
        .ds
        .fetch(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .expect("application row");
    assert_eq!(app.project, "default");
    assert_eq!(app.source_of_truth(), Some(SourceOfTruth::FromCr));
    assert_eq!(app.synced_namespace(), Some("ns1"));
    assert_eq!(app.synced_generation(), Some(1));

    let comps = components(&fixture, "example").await;
    assert_eq!(comps.len(), 2);
    let nginx = comps.iter().find(|c| c.name == "nginx").expect("nginx");
    assert!(nginx.main);
    assert_eq!(nginx.properties, Some(json!({"image": "nginx"})));
    let nginx2 = comps.iter().find(|c| c.name == "nginx2").expect("nginx2");
    assert_eq!(nginx2.properties, Some(json!({"image": "nginx2"})));
    assert_eq!(nginx2.traits.len(), 1);

    let pols = policies(&fixture, "example").await;
    let mut names: Vec<&str> = pols.iter().map(|p| p.name.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["env-bindings", "topology-beijing-demo", "topology-local"]
    );
    assert!(pols.iter().all(|p| p.creator == AUTO_GEN_POLICY));

    let workflow = fixture
        .ds
        .fetch(Workflow {
            app_primary_key: "example".to_string(),
            name: "workflow-example".to_string(),
            ..Default::default()
        })
        .await
        .expect("workflow");
    assert!(workflow.default);
    assert_eq!(workflow.steps.len(), 1);
    assert_eq!(workflow.env_name, "syncd-ns1");

    let env = fixture
        .ds
        .fetch(Env {
            name: "syncd-ns1".to_string(),
            ..Default::default()
        })
        .await
        .expect("env");
    assert_eq!(env.namespace, "ns1");
    assert_eq!(
        env.targets,
        vec![
            "syncd-beijing-demo",
            "syncd-local-demo",
            "syncd-local-staging"
        ]
    );
    let binding = fixture
        .ds
        .fetch(EnvBinding {
            app_primary_key: "example".to_string(),
            name: "syncd-ns1".to_string(),
            ..Default::default()
        })
        .await
        .expect("env binding");
    assert_eq!(binding.app_deploy_name, "example");
    assert_eq!(
        engine.cache().get("example-ns1").map(|c| c.target_count),
        Some(3)
    );

    assert_eq!(engine.delete_app(&cr).await.unwrap(), SyncOutcome::Deleted);
    let gone = fixture
        .ds
        .find(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(gone.is_none());
    assert!(components(&fixture, "example").await.is_empty());
    assert!(policies(&fixture, "example").await.is_empty());
    assert!(engine.cache().get("example-ns1").is_none());
}

#[tokio::test]
async fn test_same_name_in_two_namespaces() {
    let fixture = TestFixture::new();
    let engine = &fixture.ctx.engine;

    let first = app_named(EXAMPLE_APP, "example", "ns1", 1);
    engine.add_or_update(&first).await.unwrap();

    let (found, candidate) = engine.get_app("example", "ns2").await.unwrap();
    assert!(found.is_none());
    assert_eq!(candidate, "example-ns2");

    let second = app_named(EXAMPLE_APP, "example", "ns2", 1);
    assert_eq!(engine.add_or_update(&second).await.unwrap(), SyncOutcome::Synced);

    let bare = fixture
        .ds
        .fetch(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bare.source_of_truth(), Some(SourceOfTruth::FromCr));
    assert_eq!(bare.synced_namespace(), Some("ns1"));

    let (found, key) = engine.get_app("example", "ns2").await.unwrap();
    assert_eq!(key, "example-ns2");
    assert_eq!(found.and_then(|a| a.synced_namespace().map(str::to_string)), Some("ns2".to_string()));
    assert_eq!(components(&fixture, "example-ns2").await.len(), 2);

    // Deleting the second object leaves the first alone.
    engine.delete_app(&second).await.unwrap();
    assert!(engine.get_app("example", "ns1").await.unwrap().0.is_some());
    assert!(engine.get_app("example", "ns2").await.unwrap().0.is_none());
}

#[tokio::test]
async fn test_update_replaces_synced_children_and_keeps_user_policies() {
    let fixture = TestFixture::new();
    let engine = &fixture.ctx.engine;
    let mut cr = app_from_yaml(EXAMPLE_APP);
    engine.add_or_update(&cr).await.unwrap();

    fixture
        .ds
        .insert(ApplicationPolicy {
            app_primary_key: "example".to_string(),
            name: "health".to_string(),
            policy_type: "health".to_string(),
            creator: "admin".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let created = fixture
        .ds
        .fetch(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .create_time;

    cr.metadata.generation = Some(2);
    cr.spec.components.truncate(1);
    cr.spec.components[0].name = "nginx3".to_string();
    cr.spec.policies.clear();
    cr.spec.workflow = None;
    assert_eq!(engine.add_or_update(&cr).await.unwrap(), SyncOutcome::Synced);

    let comps = components(&fixture, "example").await;
    assert_eq!(comps.len(), 1);
    assert_eq!(comps[0].name, "nginx3");

    let pols = policies(&fixture, "example").await;
    assert_eq!(pols.len(), 1);
    assert_eq!(pols[0].name, "health");

    let workflow = fixture
        .ds
        .fetch(Workflow {
            app_primary_key: "example".to_string(),
            name: "workflow-example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(workflow.steps.is_empty());

    let app = fixture
        .ds
        .fetch(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(app.create_time, created);
    assert_eq!(app.synced_generation(), Some(2));
}

#[tokio::test]
async fn test_existing_target_and_env_are_reused() {
    let fixture = TestFixture::new();
    let engine = &fixture.ctx.engine;

    fixture
        .ds
        .insert(Target {
            name: "target-e".to_string(),
            project: "project-e".to_string(),
            cluster: Some(ClusterTarget {
                cluster_name: "local".to_string(),
                namespace: "project-e".to_string(),
            }),
            ..Default::default()
        })
        .await
        .unwrap();
    fixture
        .ds
        .insert(Env {
            name: "env-dev".to_string(),
            project: "project-dev".to_string(),
            namespace: "dev-ns".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    engine.add_or_update(&app_from_yaml(BLOG_APP)).await.unwrap();
    let blog = fixture
        .ds
        .fetch(Application {
            name: "blog".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(blog.project, "project-e");
    let env = fixture
        .ds
        .fetch(Env {
            name: "syncd-project-e".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(env.targets, vec!["target-e"]);
    assert_eq!(env.project, "project-e");

    let in_dev = app_named(BLOG_APP, "blog-dev", "dev-ns", 1);
    engine.add_or_update(&in_dev).await.unwrap();
    let dev_app = fixture
        .ds
        .fetch(Application {
            name: "blog-dev".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(dev_app.project, "project-dev");
    let dev = fixture
        .ds
        .fetch(Env {
            name: "env-dev".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(dev.targets, vec!["syncd-local-dev-ns"]);

    let envs = fixture.ds.list_as(Env::default(), None).await.unwrap();
    assert_eq!(envs.len(), 2);
    let targets = fixture.ds.list_as(Target::default(), None).await.unwrap();
    assert_eq!(targets.len(), 2);
}

#[tokio::test]
async fn test_referenced_workflow_policy_and_execution_records() {
    let fixture = TestFixture::new();
    let engine = &fixture.ctx.engine;
    let cr = app_from_yaml(RUNNING_APP);

    // The referenced Workflow is missing: the sync fails and caches nothing.
    assert!(engine.add_or_update(&cr).await.is_err());
    assert!(engine.cache().get("podinfo-default").is_none());

    fixture.cluster.put_workflow(
        "default",
        "podinfo-release",
        vec![WorkflowStepSpec {
            name: "deploy-prod".to_string(),
            step_type: "deploy".to_string(),
            properties: Some(json!({"policies": ["podinfo-topology"]})),
            ..Default::default()
        }],
    );
    fixture.cluster.put_policy(
        "default",
        AppPolicy {
            name: "podinfo-topology".to_string(),
            policy_type: "topology".to_string(),
            properties: Some(json!({"clusters": ["local"], "namespace": "prod"})),
        },
    );
    assert_eq!(engine.add_or_update(&cr).await.unwrap(), SyncOutcome::Synced);

    let pols = policies(&fixture, "podinfo").await;
    assert_eq!(pols.len(), 1);
    assert_eq!(pols[0].creator, AUTO_GEN_REF_POLICY);

    let workflow = fixture
        .ds
        .fetch(Workflow {
            app_primary_key: "podinfo".to_string(),
            name: "workflow-podinfo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(workflow.steps[0].name, "deploy-prod");

    let revision = fixture
        .ds
        .fetch(ApplicationRevision {
            app_primary_key: "podinfo".to_string(),
            version: "podinfo-v1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(revision.status, "running");
    let record = fixture
        .ds
        .fetch(WorkflowRecord {
            name: "podinfo-v1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!record.is_finished());
    assert_eq!(record.namespace, "default");
}

#[tokio::test]
async fn test_restart_seeds_cache_and_skips_unchanged_objects() {
    let fixture = TestFixture::new();
    let cr = app_from_yaml(EXAMPLE_APP);
    fixture.ctx.engine.add_or_update(&cr).await.unwrap();

    let restarted = Cr2Ux::new(fixture.ds.clone(), fixture.cluster.clone());
    assert_eq!(restarted.init_cache().await.unwrap(), 1);
    assert_eq!(restarted.add_or_update(&cr).await.unwrap(), SyncOutcome::Skipped);

    // Repeated syncs of a new generation leave no residue.
    let before = components(&fixture, "example").await;
    let mut bumped = cr.clone();
    bumped.metadata.generation = Some(2);
    restarted.add_or_update(&bumped).await.unwrap();
    restarted.add_or_update(&bumped).await.unwrap();
    assert_eq!(components(&fixture, "example").await.len(), before.len());
    assert_eq!(policies(&fixture, "example").await.len(), 3);
}

#[tokio::test]
async fn test_objects_created_through_the_platform_are_ignored() {
    let fixture = TestFixture::new();
    let mut cr = app_from_yaml(BLOG_APP);
    cr.metadata.annotations = Some(
        [("app.oam.dev/appName".to_string(), "blog".to_string())]
            .into_iter()
            .collect(),
    );
    assert_eq!(
        fixture.ctx.engine.add_or_update(&cr).await.unwrap(),
        SyncOutcome::Skipped
    );
    assert_eq!(
        fixture.ctx.engine.delete_app(&cr).await.unwrap(),
        SyncOutcome::Skipped
    );
    assert!(fixture
        .ds
        .list_as(Application::default(), None)
        .await
        .unwrap()
        .is_empty());
}

/// Update times of every row derived from the `example` app.
async fn example_update_times(fixture: &TestFixture) -> Vec<(String, DateTime<Utc>)> {
    let app = fixture
        .ds
        .fetch(Application {
            name: "example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let workflow = fixture
        .ds
        .fetch(Workflow {
            app_primary_key: "example".to_string(),
            name: "workflow-example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut times = vec![
        ("app".to_string(), app.update_time),
        ("workflow".to_string(), workflow.update_time),
    ];
    for c in components(fixture, "example").await {
        times.push((format!("component/{}", c.name), c.update_time));
    }
    for p in policies(fixture, "example").await {
        times.push((format!("policy/{}", p.name), p.update_time));
    }
    times.sort();
    times
}

#[tokio::test]
async fn test_resync_at_same_generation_leaves_rows_untouched() {
    let fixture = TestFixture::new();
    let cr = app_from_yaml(EXAMPLE_APP);
    fixture.ctx.engine.add_or_update(&cr).await.unwrap();
    let before = example_update_times(&fixture).await;
    assert_eq!(before.len(), 7);

    assert_eq!(
        fixture.ctx.engine.add_or_update(&cr).await.unwrap(),
        SyncOutcome::Skipped
    );
    assert_eq!(example_update_times(&fixture).await, before);

    let restarted = Cr2Ux::new(fixture.ds.clone(), fixture.cluster.clone());
    restarted.init_cache().await.unwrap();
    assert_eq!(restarted.add_or_update(&cr).await.unwrap(), SyncOutcome::Skipped);
    assert_eq!(example_update_times(&fixture).await, before);
}

#[tokio::test]
async fn test_rows_owned_by_the_platform_are_never_overwritten() {
    let fixture = TestFixture::new();
    let owned = fixture
        .ds
        .insert(Application {
            name: "blog".to_string(),
            project: "team-blog".to_string(),
            labels: BTreeMap::from([
                (
                    LABEL_SOURCE_OF_TRUTH.to_string(),
                    SourceOfTruth::FromUx.to_string(),
                ),
                (LABEL_SYNC_NAMESPACE.to_string(), "project-e".to_string()),
            ]),
            ..Default::default()
        })
        .await
        .unwrap();

    // The cluster object carries no platform annotation.
    let cr = app_from_yaml(BLOG_APP);
    let engine = &fixture.ctx.engine;
    assert_eq!(engine.add_or_update(&cr).await.unwrap(), SyncOutcome::Skipped);
    assert_eq!(engine.delete_app(&cr).await.unwrap(), SyncOutcome::Skipped);

    let stored = fixture
        .ds
        .fetch(Application {
            name: "blog".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stored, owned);
    assert!(components(&fixture, "blog").await.is_empty());
    assert_eq!(
        fixture
            .ds
            .list_as(Application::default(), None)
            .await
            .unwrap()
            .len(),
        1
    );
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{app_from_yaml, TestFixture, RUNNING_APP};
use serde_json::json;
use velaux_models::models::{ApplicationRevision, WorkflowRecord};
use velaux_sync::datastore::DataStoreExt;
use velaux_sync::k8s::resources::{AppPolicy, Application, WorkflowStepSpec, WorkflowStatus};
use velaux_sync::workflow::record_sync::RecordOutcome;

/// Fixture with `podinfo` synced: a running record `podinfo-v1` and its
/// revision row.
async fn synced() -> TestFixture {
    let fixture = TestFixture::new();
    fixture.cluster.put_workflow(
        "default",
        "podinfo-release",
        vec![WorkflowStepSpec {
            name: "deploy".to_string(),
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
    fixture
        .ctx
        .engine
        .add_or_update(&app_from_yaml(RUNNING_APP))
        .await
        .expect("sync podinfo");
    fixture
}

fn with_workflow(mut app: Application, status: WorkflowStatus) -> Application {
    app.status.get_or_insert_with(Default::default).workflow = Some(status);
    app
}

async fn record(fixture: &TestFixture) -> WorkflowRecord {
    fixture
        .ds
        .fetch(WorkflowRecord {
            name: "podinfo-v1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

async fn revision(fixture: &TestFixture) -> Option<ApplicationRevision> {
    fixture
        .ds
        .find(ApplicationRevision {
            app_primary_key: "podinfo".to_string(),
            version: "podinfo-v1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

fn succeeded(app_revision: &str, finished: bool) -> WorkflowStatus {
    let mut status: WorkflowStatus = serde_json::from_value(json!({
        "appRevision": app_revision,
        "status": "succeeded",
        "message": "",
        "finished": finished,
        "endTime": "2025-06-01T10:00:00Z",
        "steps": [{"name": "deploy", "type": "deploy", "phase": "succeeded"}]
    }))
    .unwrap();
    status.mode = Some(json!({"steps": "StepByStep", "subSteps": "DAG"}));
    status
}

#[tokio::test]
async fn test_status_is_copied_from_the_running_application() {
    let fixture = synced().await;
    let live = with_workflow(app_from_yaml(RUNNING_APP), succeeded("podinfo-v1", true));
    fixture.cluster.put_application(live);

    assert_eq!(fixture.ctx.records.sync_once().await.unwrap(), 1);

    let record = record(&fixture).await;
    assert!(record.is_finished());
    assert_eq!(record.status, "succeeded");
    assert_eq!(record.mode, "StepByStep-DAG");
    assert_eq!(record.steps.len(), 1);
    assert_eq!(record.steps[0].phase, "succeeded");
    assert!(record.end_time.is_some());
    assert_eq!(revision(&fixture).await.unwrap().status, "complete");

    // Finished records are no longer polled.
    assert_eq!(fixture.ctx.records.sync_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_application_terminates_the_record() {
    let fixture = synced().await;
    let pending = record(&fixture).await;

    let outcome = fixture.ctx.records.sync_record(pending).await.unwrap();
    assert_eq!(outcome, RecordOutcome::Terminated);
    let record = record(&fixture).await;
    assert!(record.is_finished());
    assert_eq!(record.status, "terminated");
    assert_eq!(revision(&fixture).await.unwrap().status, "terminated");
}

#[tokio::test]
async fn test_missing_revision_fails_the_record() {
    let fixture = synced().await;
    let moved_on = with_workflow(app_from_yaml(RUNNING_APP), succeeded("podinfo-v2", false));
    fixture.cluster.put_application(moved_on);
    fixture
        .ds
        .remove(ApplicationRevision {
            app_primary_key: "podinfo".to_string(),
            version: "podinfo-v1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let outcome = fixture
        .ctx
        .records
        .sync_record(record(&fixture).await)
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Failed);
    let record = record(&fixture).await;
    assert!(record.is_finished());
    assert_eq!(record.status, "fail");
}

#[tokio::test]
async fn test_revision_snapshot_closes_a_superseded_record() {
    let fixture = synced().await;
    let moved_on = with_workflow(app_from_yaml(RUNNING_APP), succeeded("podinfo-v2", false));
    fixture.cluster.put_application(moved_on);

    // Without the ApplicationRevision object the record is terminated.
    let outcome = fixture
        .ctx
        .records
        .sync_record(record(&fixture).await)
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Terminated);

    let fixture = synced().await;
    let moved_on = with_workflow(app_from_yaml(RUNNING_APP), succeeded("podinfo-v2", false));
    fixture.cluster.put_application(moved_on);
    let snapshot = with_workflow(app_from_yaml(RUNNING_APP), succeeded("podinfo-v1", false));
    fixture.cluster.put_revision("default", "podinfo-v1", snapshot);

    let outcome = fixture
        .ctx
        .records
        .sync_record(record(&fixture).await)
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Updated);
    let record = record(&fixture).await;
    assert!(record.is_finished());
    assert_eq!(record.status, "succeeded");
    assert_eq!(revision(&fixture).await.unwrap().status, "complete");
}

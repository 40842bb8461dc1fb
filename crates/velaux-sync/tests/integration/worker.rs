/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{app_from_yaml, app_named, TestFixture, BLOG_APP, EXAMPLE_APP};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::watcher::Event;
use std::time::Duration;
use tokio::sync::broadcast;
use velaux_models::models::Application as StoredApplication;
use velaux_sync::datastore::DataStoreExt;
use velaux_sync::k8s::resources::Application;
use velaux_sync::sync::worker::{drain_queue, sync_queue};

async fn stored(fixture: &TestFixture, name: &str) -> Option<StoredApplication> {
    fixture
        .ds
        .find(StoredApplication {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

fn with_uid(mut app: Application, uid: &str) -> Application {
    app.metadata.uid = Some(uid.to_string());
    app
}

#[tokio::test]
async fn test_deleted_application_is_not_recreated_by_queued_applies() {
    let fixture = TestFixture::new();
    let example = with_uid(app_from_yaml(EXAMPLE_APP), "uid-1");
    fixture.ctx.engine.add_or_update(&example).await.unwrap();
    assert!(stored(&fixture, "example").await.is_some());

    let (shutdown_tx, _) = broadcast::channel(1);
    let (queue, receivers) = sync_queue(8);

    let mut updated = example.clone();
    updated.metadata.generation = Some(2);
    let mut terminating = example.clone();
    terminating.metadata.generation = Some(3);
    terminating.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

    queue.route(Event::Apply(updated)).await.unwrap();
    queue.route(Event::Apply(terminating)).await.unwrap();
    queue.route(Event::Delete(example)).await.unwrap();
    queue.route(Event::Init).await.unwrap();
    queue
        .route(Event::InitApply(with_uid(app_from_yaml(BLOG_APP), "uid-2")))
        .await
        .unwrap();
    queue.route(Event::InitDone).await.unwrap();
    drop(queue);

    drain_queue(fixture.ctx.engine.clone(), receivers, shutdown_tx.subscribe()).await;

    assert!(stored(&fixture, "example").await.is_none());
    assert!(stored(&fixture, "blog").await.is_some());
}

#[tokio::test]
async fn test_recreated_application_is_synced_after_delete() {
    let fixture = TestFixture::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let (queue, receivers) = sync_queue(8);

    let first = with_uid(app_from_yaml(EXAMPLE_APP), "uid-1");
    let second = with_uid(app_from_yaml(EXAMPLE_APP), "uid-3");
    queue.route(Event::Apply(first.clone())).await.unwrap();
    queue.route(Event::Delete(first)).await.unwrap();
    queue.route(Event::Apply(second)).await.unwrap();
    drop(queue);

    drain_queue(fixture.ctx.engine.clone(), receivers, shutdown_tx.subscribe()).await;
    assert!(stored(&fixture, "example").await.is_some());
}

#[tokio::test]
async fn test_failed_events_do_not_stop_the_consumer() {
    let fixture = TestFixture::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let (queue, receivers) = sync_queue(4);

    // No namespace: conversion fails and the event is dropped.
    let mut broken = app_from_yaml(BLOG_APP);
    broken.metadata.namespace = None;
    queue.route(Event::Apply(broken)).await.unwrap();
    queue
        .route(Event::Apply(app_named(BLOG_APP, "blog-2", "project-e", 1)))
        .await
        .unwrap();
    drop(queue);

    drain_queue(fixture.ctx.engine.clone(), receivers, shutdown_tx.subscribe()).await;
    assert!(stored(&fixture, "blog-2").await.is_some());
}

#[tokio::test]
async fn test_shutdown_stops_an_idle_consumer() {
    let fixture = TestFixture::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let (queue, receivers) = sync_queue(4);

    let consumer = tokio::spawn(drain_queue(
        fixture.ctx.engine.clone(),
        receivers,
        shutdown_tx.subscribe(),
    ));
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer stops on shutdown")
        .unwrap();
    assert!(queue.route(Event::Apply(app_from_yaml(BLOG_APP))).await.is_err());
}

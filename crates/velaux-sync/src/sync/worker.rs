/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Sync workers
//!
//! A watch producer feeds Application events to a single consumer that runs
//! them through [`Cr2Ux`] one at a time.
//!
//! Apply events go through a bounded FIFO queue. Delete events travel on
//! their own channel which the consumer polls first, so a delete never waits
//! behind queued updates. The consumer remembers deleted objects for a while
//! and drops applies of the same object instance still queued behind them.

use crate::k8s::resources::Application;
use crate::metrics;
use crate::sync::cr2ux::Cr2Ux;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use moka::sync::Cache;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use velaux_utils::telemetry::prelude::*;

/// Producer side of the sync queue.
#[derive(Clone)]
pub struct SyncQueue {
    applies: mpsc::Sender<Application>,
    deletes: mpsc::UnboundedSender<Application>,
}

/// Consumer side of the sync queue.
pub struct SyncReceivers {
    applies: mpsc::Receiver<Application>,
    deletes: mpsc::UnboundedReceiver<Application>,
}

/// The consumer is gone.
#[derive(Debug, thiserror::Error)]
#[error("sync queue closed")]
pub struct QueueClosed;

/// Creates a queue holding at most `capacity` pending apply events.
pub fn sync_queue(capacity: usize) -> (SyncQueue, SyncReceivers) {
    let (apply_tx, apply_rx) = mpsc::channel(capacity.max(1));
    let (delete_tx, delete_rx) = mpsc::unbounded_channel();
    (
        SyncQueue {
            applies: apply_tx,
            deletes: delete_tx,
        },
        SyncReceivers {
            applies: apply_rx,
            deletes: delete_rx,
        },
    )
}

impl SyncQueue {
    /// Routes one watch event. Applies wait for queue space; deletes never do.
    pub async fn route(&self, event: watcher::Event<Application>) -> Result<(), QueueClosed> {
        match event {
            watcher::Event::Apply(app) | watcher::Event::InitApply(app) => {
                // Terminating objects are handled by their delete event.
                if app.metadata.deletion_timestamp.is_some() {
                    return Ok(());
                }
                self.applies.send(app).await.map_err(|_| QueueClosed)?;
                metrics::sync_queue_depth()
                    .set((self.applies.max_capacity() - self.applies.capacity()) as f64);
            }
            watcher::Event::Delete(app) => {
                self.deletes.send(app).map_err(|_| QueueClosed)?;
            }
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
        Ok(())
    }
}

/// Runs one apply event through the engine. Failures are logged and dropped;
/// the next resync of the object retries.
pub async fn handle_apply(engine: &Cr2Ux, app: &Application) {
    let result = match engine.add_or_update(app).await {
        Ok(outcome) => outcome.as_str(),
        Err(e) => {
            error!(
                "failed to sync application {:?}/{:?}: {}",
                app.metadata.namespace, app.metadata.name, e
            );
            "error"
        }
    };
    metrics::events_total()
        .with_label_values(&["apply", result])
        .inc();
}

pub async fn handle_delete(engine: &Cr2Ux, app: &Application) {
    let result = match engine.delete_app(app).await {
        Ok(outcome) => outcome.as_str(),
        Err(e) => {
            error!(
                "failed to delete application {:?}/{:?}: {}",
                app.metadata.namespace, app.metadata.name, e
            );
            "error"
        }
    };
    metrics::events_total()
        .with_label_values(&["delete", result])
        .inc();
}

/// How long a deleted object instance is remembered.
const DELETED_TTL: Duration = Duration::from_secs(3600);

/// Object instances the consumer already deleted, keyed by `namespace/name`
/// with the instance uid as value.
///
/// A recreated object gets a new uid, so only applies of the deleted
/// instance are dropped.
pub struct DeletedObjects {
    inner: Cache<String, Option<String>>,
}

impl Default for DeletedObjects {
    fn default() -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(DELETED_TTL)
                .build(),
        }
    }
}

impl DeletedObjects {
    pub fn record(&self, app: &Application) {
        self.inner.insert(object_key(app), app.metadata.uid.clone());
    }

    /// Whether `app` is an apply of an instance that was already deleted.
    pub fn is_stale(&self, app: &Application) -> bool {
        let key = object_key(app);
        match self.inner.get(&key) {
            Some(uid) if uid == app.metadata.uid => true,
            Some(_) => {
                self.inner.invalidate(&key);
                false
            }
            None => false,
        }
    }
}

fn object_key(app: &Application) -> String {
    format!(
        "{}/{}",
        app.metadata.namespace.as_deref().unwrap_or_default(),
        app.metadata.name.as_deref().unwrap_or_default()
    )
}

/// The single consumer. Returns on shutdown or once both channels close.
pub async fn drain_queue(
    engine: Cr2Ux,
    mut receivers: SyncReceivers,
    mut shutdown: broadcast::Receiver<()>,
) {
    let deleted = DeletedObjects::default();
    let mut deletes_open = true;
    let mut applies_open = true;

    while deletes_open || applies_open {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("sync consumer shutting down");
                return;
            }
            next = receivers.deletes.recv(), if deletes_open => match next {
                Some(app) => {
                    deleted.record(&app);
                    handle_delete(&engine, &app).await;
                }
                None => deletes_open = false,
            },
            next = receivers.applies.recv(), if applies_open => match next {
                Some(app) => {
                    metrics::sync_queue_depth().set(receivers.applies.len() as f64);
                    if deleted.is_stale(&app) {
                        debug!(
                            "dropping queued apply of deleted application {}",
                            object_key(&app)
                        );
                        metrics::events_total()
                            .with_label_values(&["apply", "stale"])
                            .inc();
                        continue;
                    }
                    handle_apply(&engine, &app).await;
                }
                None => applies_open = false,
            },
        }
    }
    info!("sync queue closed, consumer stopping");
}

/// Watches Applications and routes their events into `queue`.
///
/// Watches every namespace unless `namespace` is set. Watch errors are
/// retried with the watcher's default backoff.
pub async fn watch_applications(
    client: Client,
    namespace: Option<String>,
    queue: SyncQueue,
    mut shutdown: broadcast::Receiver<()>,
) {
    let api: Api<Application> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);

    info!("watching applications in {}", namespace.as_deref().unwrap_or("all namespaces"));
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("application watch shutting down");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    if queue.route(event).await.is_err() {
                        warn!("sync queue closed, stopping the application watch");
                        break;
                    }
                }
                Some(Err(e)) => warn!("application watch error: {}", e),
                None => break,
            }
        }
    }
}

/// Spawns the watch producer and the queue consumer.
///
/// # Arguments
///
/// * `engine` - The sync engine, with its cache already seeded
/// * `client` - Client used for the watch
/// * `namespace` - Namespace to watch, or every namespace
/// * `capacity` - Bound of the apply queue
/// * `shutdown` - Broadcast sender stopping both tasks
pub fn start_sync_workers(
    engine: Cr2Ux,
    client: Client,
    namespace: Option<String>,
    capacity: usize,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let (queue, receivers) = sync_queue(capacity);
    let consumer = tokio::spawn(drain_queue(engine, receivers, shutdown.subscribe()));
    let producer = tokio::spawn(watch_applications(
        client,
        namespace,
        queue,
        shutdown.subscribe(),
    ));
    info!("started application sync workers with queue capacity {}", capacity);
    vec![producer, consumer]
}

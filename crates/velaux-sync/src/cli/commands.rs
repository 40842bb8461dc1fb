/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # CLI Commands Module
//!
//! ## Startup Sequence
//!
//! ```mermaid
//! flowchart TD
//!     A[Load Config] --> B[Init Telemetry]
//!     B --> C[Kubernetes Client]
//!     C --> D[Open Datastore]
//!     D --> E[Seed Sync Cache]
//!     E --> F[Start Workers]
//!     F --> G[Mark Ready]
//!     G --> H[Wait for Signal]
//! ```
//!
//! ## Signal Handling
//!
//! Ctrl-C broadcasts shutdown to the watch producer, the queue consumer and
//! the record ticker. Queued events are abandoned; the next start resyncs.

use crate::datastore::kubeapi::KubeApiStore;
use crate::datastore::memory::MemoryStore;
use crate::datastore::postgres::PostgresStore;
use crate::datastore::DataStore;
use crate::k8s::cluster::KubeClusterReader;
use crate::utils::background_tasks::{start_workflow_record_sync_task, WorkflowRecordSyncConfig};
use crate::utils::AppContext;
use crate::{db, health, k8s, sync};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::ctrl_c;
use velaux_utils::config::Settings;
use velaux_utils::telemetry::prelude::*;
use velaux_utils::DatastoreKind;

/// Opens the configured datastore driver.
pub async fn open_datastore(
    config: &Settings,
    client: &Client,
) -> Result<Arc<dyn DataStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn DataStore> = match config.datastore.kind {
        DatastoreKind::Memory => {
            warn!("Using the in-memory datastore; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
        DatastoreKind::KubeApi => {
            info!(
                "Using the kubeapi datastore in namespace {}",
                config.datastore.namespace
            );
            Arc::new(KubeApiStore::new(client.clone(), &config.datastore.namespace).await?)
        }
        DatastoreKind::Postgres => {
            info!("Using the postgres datastore");
            let pool = db::create_shared_connection_pool(
                &config.datastore.url,
                config.datastore.max_connections,
                config.datastore.schema.as_deref(),
            )?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            Arc::new(store)
        }
    };
    Ok(store)
}

pub async fn start(config_file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Settings::new(config_file)?;
    velaux_utils::telemetry::init(
        &config.telemetry.resolve(),
        &config.log.level,
        &config.log.format,
    )?;
    info!("Starting VelaUX sync");

    info!("Initializing Kubernetes client");
    let k8s_client =
        k8s::api::create_k8s_client(config.kubernetes.kubeconfig_path.as_deref()).await?;

    let datastore = open_datastore(&config, &k8s_client).await?;
    let cluster = Arc::new(KubeClusterReader::new(
        k8s_client.clone(),
        Duration::from_secs(config.sync.cluster_timeout_seconds),
    ));
    let ctx = AppContext::new(datastore, cluster);

    // Start health check HTTP server
    let health_state = health::HealthState::default();
    info!("Starting health check server on port {}", config.health.port);
    let health_router = health::configure_health_routes(health_state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.health.port)).await?;
    let health_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router).await {
            error!("Health check server failed: {}", e);
        }
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut workers = Vec::new();

    if config.sync.enabled {
        ctx.engine.init_cache().await?;
        workers.extend(sync::worker::start_sync_workers(
            ctx.engine.clone(),
            k8s_client.clone(),
            config.sync.watch_namespace.clone(),
            config.sync.queue_capacity,
            &shutdown_tx,
        ));
    } else {
        info!("Application sync is disabled");
    }

    if config.workflow_record_sync.enabled {
        workers.push(start_workflow_record_sync_task(
            ctx.records.clone(),
            WorkflowRecordSyncConfig {
                interval_seconds: config.workflow_record_sync.interval_seconds,
            },
            shutdown_tx.subscribe(),
        ));
    }

    health_state.set_ready(true);
    info!("VelaUX sync is ready");

    ctrl_c().await?;
    info!("Received shutdown signal");
    health_state.set_ready(false);
    let _ = shutdown_tx.send(());
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Worker task ended abnormally: {}", e);
        }
    }
    health_server.abort();
    velaux_utils::telemetry::shutdown();
    info!("VelaUX sync stopped");
    Ok(())
}

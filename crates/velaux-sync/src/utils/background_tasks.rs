/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Periodic tasks.

use crate::workflow::record_sync::WorkflowRecordSync;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use velaux_utils::telemetry::prelude::*;

/// Configuration for the workflow record sync task.
pub struct WorkflowRecordSyncConfig {
    /// How often to poll unfinished records (in seconds).
    pub interval_seconds: u64,
}

impl Default for WorkflowRecordSyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
        }
    }
}

/// Starts the workflow record sync task.
///
/// Every tick polls the unfinished workflow records once. The task stops when
/// `shutdown` fires.
///
/// # Arguments
/// * `records` - The record poller
/// * `config` - Configuration for the task
/// * `shutdown` - Receiver of the process shutdown broadcast
pub fn start_workflow_record_sync_task(
    records: WorkflowRecordSync,
    config: WorkflowRecordSyncConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    info!(
        "Starting workflow record sync task (interval: {}s)",
        config.interval_seconds
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Workflow record sync task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match records.sync_once().await {
                        Ok(0) => {}
                        Ok(visited) => debug!("Polled {} unfinished workflow records", visited),
                        Err(e) => error!("Failed to list unfinished workflow records: {}", e),
                    }
                }
            }
        }
    })
}

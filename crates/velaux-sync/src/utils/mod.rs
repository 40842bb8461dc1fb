/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Process wiring shared by the workers.

pub mod background_tasks;

use crate::datastore::DataStore;
use crate::k8s::cluster::ClusterReader;
use crate::services::EnvService;
use crate::sync::cr2ux::Cr2Ux;
use crate::workflow::record_sync::WorkflowRecordSync;
use std::sync::Arc;

/// Everything the workers share, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub datastore: Arc<dyn DataStore>,
    pub cluster: Arc<dyn ClusterReader>,
    pub engine: Cr2Ux,
    pub records: WorkflowRecordSync,
    pub envs: EnvService,
}

impl AppContext {
    pub fn new(datastore: Arc<dyn DataStore>, cluster: Arc<dyn ClusterReader>) -> Self {
        Self {
            engine: Cr2Ux::new(datastore.clone(), cluster.clone()),
            records: WorkflowRecordSync::new(datastore.clone(), cluster.clone()),
            envs: EnvService::new(datastore.clone()),
            datastore,
            cluster,
        }
    }
}

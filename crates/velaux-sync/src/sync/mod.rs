/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Application Sync
//!
//! Projects cluster Applications into the datastore.
//!
//! - [`convert`]: decomposes one Application into records
//! - [`cache`]: generation cache suppressing repeated work
//! - [`cr2ux`]: provenance checks, identity resolution and the persist pipeline
//! - [`worker`]: the watch producer and the single queue consumer

pub mod cache;
pub mod convert;
pub mod cr2ux;
pub mod worker;

use crate::datastore::DataStoreError;
use crate::k8s::cluster::ClusterError;
use convert::ConvertError;

/// Errors raised by the sync engine and the services it drives.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    DataStore(#[from] DataStoreError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
            || matches!(self, SyncError::DataStore(e) if e.is_not_exist())
    }
}

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Records were written.
    Synced,
    /// Records were deleted.
    Deleted,
    /// Provenance, cache or identity checks ruled the event out.
    Skipped,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::Deleted => "deleted",
            SyncOutcome::Skipped => "skipped",
        }
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # VelaUX Sync
//!
//! Keeps the VelaUX metadata store in step with the KubeVela Applications
//! living in a cluster.
//!
//! ## Architecture
//!
//! ### Datastore Module
//! ```rust,ignore
//! pub mod datastore;
//! ```
//! The record store contract and its memory, ConfigMap and PostgreSQL drivers.
//!
//! ### Sync Module
//! ```rust,ignore
//! pub mod sync;
//! ```
//! Converts cluster Applications into records and persists them:
//! - Provenance and generation checks
//! - Identity resolution under name collisions
//! - The watch producer and the single queue consumer
//!
//! ### Workflow Module
//! ```rust,ignore
//! pub mod workflow;
//! ```
//! Merges env target changes into workflows and polls workflow records.
//!
//! ## Operation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant K8s
//!     participant Watcher
//!     participant Consumer
//!     participant Store
//!
//!     K8s->>Watcher: Application event
//!     alt delete
//!         Watcher->>Consumer: priority channel
//!     else apply
//!         Watcher->>Consumer: bounded queue
//!     end
//!     Consumer->>Store: children, then the Application row
//!
//!     loop Every record sync interval
//!         Consumer->>K8s: Read workflow status
//!         Consumer->>Store: Update unfinished records
//!     end
//! ```

pub mod cli;
pub mod datastore;
pub mod db;
pub mod health;
pub mod k8s;
pub mod metrics;
pub mod services;
pub mod sync;
pub mod utils;
pub mod workflow;

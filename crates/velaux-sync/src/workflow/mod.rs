/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Workflow upkeep: merging env target changes into workflows and tracking
//! the execution records of synced applications.

pub mod merge;
pub mod record_sync;

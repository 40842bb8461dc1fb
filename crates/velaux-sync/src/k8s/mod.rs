/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Kubernetes client construction, the `core.oam.dev` resource types and the
//! read-only cluster access used by the sync.

pub mod api;
pub mod cluster;
pub mod resources;

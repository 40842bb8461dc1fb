/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

mod fixtures;

mod cr2ux;
mod datastore;
mod env_workflow;
mod health;
mod record_sync;
mod worker;

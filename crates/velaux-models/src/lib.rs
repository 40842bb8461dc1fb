/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Datastore records of the VelaUX metadata store.
//!
//! Every record implements [`Entity`]; the closed [`Record`] enum is what the
//! datastore drivers move around.

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod constants;
pub mod entity;
pub mod models;
pub mod schema;

pub use entity::{Entity, Kind, Record};

/// Migrations for the postgres document table.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

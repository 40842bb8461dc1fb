/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Domain services over the datastore.
//!
//! Each service is a thin, cloneable handle holding the shared datastore.
//! The sync engine drives projects, targets and application deletion; the
//! platform API drives environment changes through [`env::EnvService`].

pub mod application;
pub mod env;
pub mod project;
pub mod target;

pub use application::ApplicationService;
pub use env::EnvService;
pub use project::ProjectService;
pub use target::TargetService;

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

pub mod application;
pub mod env;
pub mod project;
pub mod records;
pub mod workflow;

pub use application::{
    Application, ApplicationComponent, ApplicationPolicy, ApplicationRevision, ApplicationTrait,
};
pub use env::{ClusterTarget, Env, EnvBinding, Target};
pub use project::Project;
pub use records::DatastoreRow;
pub use workflow::{Workflow, WorkflowRecord, WorkflowStep, WorkflowStepStatus};

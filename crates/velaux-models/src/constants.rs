/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Label keys, provenance values and naming prefixes shared by the sync engine
//! and the services.

use std::fmt;
use std::str::FromStr;

/// Label on a datastore Application recording where its desired state lives.
pub const LABEL_SOURCE_OF_TRUTH: &str = "ux.oam.dev/source-of-truth";
/// Label on a datastore Application recording the namespace it was synced from.
pub const LABEL_SYNC_NAMESPACE: &str = "ux.oam.dev/synced-namespace";
/// Label on a datastore Application recording the last synced generation.
pub const LABEL_SYNC_GENERATION: &str = "ux.oam.dev/synced-generation";

/// Explicit provenance marker carried by a cluster Application.
pub const CR_LABEL_SOURCE_OF_TRUTH: &str = "app.oam.dev/source-of-truth";
/// Annotation set by the platform API on the Applications it renders.
pub const CR_ANNOTATION_APP_NAME: &str = "app.oam.dev/appName";
/// Label carried by Applications installed by the addon manager.
pub const CR_LABEL_ADDON_NAME: &str = "addons.oam.dev/name";
/// Name prefix of addon Applications.
pub const ADDON_APP_PREFIX: &str = "addon-";

pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_ADDON_PROJECT: &str = "addons";
pub const DEFAULT_PROJECT_OWNER: &str = "admin";

pub const AUTO_GEN_ENV_NAME_PREFIX: &str = "syncd-";
pub const AUTO_GEN_TARGET_NAME_PREFIX: &str = "syncd-";
pub const AUTO_GEN_WORKFLOW_NAME_PREFIX: &str = "workflow-";
pub const AUTO_GEN_DESC: &str = "Automatically converted from KubeVela Application in Kubernetes.";
pub const AUTO_GEN_PROJECT_DESC: &str = "Automatically generated by sync mechanism.";

/// Creator of components produced by the sync.
pub const AUTO_GEN_COMP: &str = "Synced";
/// Creator of policies copied from the Application spec.
pub const AUTO_GEN_POLICY: &str = "Synced";
/// Creator of policies pulled in because a workflow step references them.
pub const AUTO_GEN_REF_POLICY: &str = "SyncedRef";
/// Deploy user recorded on revisions produced by the sync.
pub const AUTO_GEN_DEPLOY_USER: &str = "Synced";

/// Cluster name of the hub cluster.
pub const LOCAL_CLUSTER: &str = "local";

pub const STEP_TYPE_DEPLOY: &str = "deploy";
pub const STEP_TYPE_DEPLOY_TO_ENV: &str = "deploy2env";
pub const POLICY_TYPE_TOPOLOGY: &str = "topology";
pub const POLICY_TYPE_ENV_BINDING: &str = "env-binding";

pub const REVISION_STATUS_INIT: &str = "init";
pub const REVISION_STATUS_RUNNING: &str = "running";
pub const REVISION_STATUS_COMPLETE: &str = "complete";
pub const REVISION_STATUS_FAIL: &str = "failure";
pub const REVISION_STATUS_TERMINATED: &str = "terminated";

pub const WORKFLOW_RECORD_STATUS_TERMINATED: &str = "terminated";
pub const WORKFLOW_RECORD_STATUS_FAIL: &str = "fail";

/// Which system is authoritative for an Application's desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOfTruth {
    /// Created directly against the cluster API.
    FromCr,
    /// Created through the platform API.
    FromUx,
    /// Created by the platform for internal purposes.
    FromInner,
}

impl SourceOfTruth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceOfTruth::FromCr => "from-CR",
            SourceOfTruth::FromUx => "from-UX",
            SourceOfTruth::FromInner => "from-inner",
        }
    }
}

impl fmt::Display for SourceOfTruth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceOfTruth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from-CR" => Ok(SourceOfTruth::FromCr),
            "from-UX" => Ok(SourceOfTruth::FromUx),
            "from-inner" => Ok(SourceOfTruth::FromInner),
            other => Err(format!("unknown source of truth: {}", other)),
        }
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::constants::{
    SourceOfTruth, LABEL_SOURCE_OF_TRUTH, LABEL_SYNC_GENERATION, LABEL_SYNC_NAMESPACE,
};
use crate::entity::{index_of, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A deployable unit as seen by the UX.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    pub name: String,
    pub alias: String,
    pub project: String,
    pub description: String,
    pub icon: String,
    pub labels: BTreeMap<String, String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Application {
    /// Provenance recorded by the last sync, if any.
    pub fn source_of_truth(&self) -> Option<SourceOfTruth> {
        self.labels
            .get(LABEL_SOURCE_OF_TRUTH)
            .and_then(|v| v.parse().ok())
    }

    /// Cluster namespace this record was synced from.
    pub fn synced_namespace(&self) -> Option<&str> {
        self.labels.get(LABEL_SYNC_NAMESPACE).map(String::as_str)
    }

    /// Generation of the cluster object at the last sync.
    pub fn synced_generation(&self) -> Option<i64> {
        self.labels
            .get(LABEL_SYNC_GENERATION)
            .and_then(|v| v.parse().ok())
    }
}

impl Entity for Application {
    fn primary_key(&self) -> String {
        self.name.clone()
    }
    fn table_name(&self) -> &'static str {
        "vela_application"
    }
    fn short_table_name(&self) -> &'static str {
        "app"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([("name", self.name.as_str()), ("project", self.project.as_str())])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/// A trait attached to a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationTrait {
    #[serde(rename = "type")]
    pub trait_type: String,
    pub alias: String,
    pub description: String,
    pub creator: String,
    pub properties: Option<Value>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// One component of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationComponent {
    pub app_primary_key: String,
    pub name: String,
    pub alias: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub creator: String,
    #[serde(rename = "type")]
    pub component_type: String,
    /// Set on the first component of the application.
    pub main: bool,
    pub depends_on: Vec<String>,
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    pub properties: Option<Value>,
    pub traits: Vec<ApplicationTrait>,
    pub external_revision: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for ApplicationComponent {
    fn primary_key(&self) -> String {
        format!("{}-{}", self.app_primary_key, self.name)
    }
    fn table_name(&self) -> &'static str {
        "vela_application_component"
    }
    fn short_table_name(&self) -> &'static str {
        "app_cmp"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("name", self.name.as_str()),
            ("type", self.component_type.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/// One policy of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationPolicy {
    pub app_primary_key: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub creator: String,
    pub properties: Option<Value>,
    /// Env this policy was generated for, empty for app-wide policies.
    pub env_name: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for ApplicationPolicy {
    fn primary_key(&self) -> String {
        format!("{}-{}", self.app_primary_key, self.name)
    }
    fn table_name(&self) -> &'static str {
        "vela_application_policy"
    }
    fn short_table_name(&self) -> &'static str {
        "app_plc"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("name", self.name.as_str()),
            ("type", self.policy_type.as_str()),
            ("envName", self.env_name.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/// A deployed revision of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationRevision {
    pub app_primary_key: String,
    pub version: String,
    /// Name of the ApplicationRevision resource in the cluster.
    #[serde(rename = "revisionCRName")]
    pub revision_cr_name: String,
    pub status: String,
    pub reason: String,
    pub deploy_user: String,
    pub note: String,
    pub trigger_type: String,
    pub env_name: String,
    pub workflow_name: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for ApplicationRevision {
    fn primary_key(&self) -> String {
        format!("{}-{}", self.app_primary_key, self.version)
    }
    fn table_name(&self) -> &'static str {
        "vela_application_revision"
    }
    fn short_table_name(&self) -> &'static str {
        "app_rev"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("version", self.version.as_str()),
            ("status", self.status.as_str()),
            ("envName", self.env_name.as_str()),
            ("workflowName", self.workflow_name.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

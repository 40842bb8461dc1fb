/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::entity::{index_of, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A named group of targets within a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Env {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub project: String,
    /// Namespace the env's applications are rendered into.
    pub namespace: String,
    /// Names of the targets in this env.
    pub targets: Vec<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for Env {
    fn primary_key(&self) -> String {
        self.name.clone()
    }
    fn table_name(&self) -> &'static str {
        "vela_env"
    }
    fn short_table_name(&self) -> &'static str {
        "env"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("name", self.name.as_str()),
            ("project", self.project.as_str()),
            ("namespace", self.namespace.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/// Binds an application to an env.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvBinding {
    pub app_primary_key: String,
    /// Env name.
    pub name: String,
    /// Name of the Application resource deployed for this binding.
    pub app_deploy_name: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for EnvBinding {
    fn primary_key(&self) -> String {
        format!("{}-{}", self.app_primary_key, self.name)
    }
    fn table_name(&self) -> &'static str {
        "vela_env_binding"
    }
    fn short_table_name(&self) -> &'static str {
        "envb"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("name", self.name.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/// The cluster and namespace a target deploys to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterTarget {
    pub cluster_name: String,
    pub namespace: String,
}

impl ClusterTarget {
    /// `cluster/namespace`, the identity targets are deduplicated by.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.cluster_name, self.namespace)
    }
}

/// A concrete placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub project: String,
    pub cluster: Option<ClusterTarget>,
    pub variable: BTreeMap<String, Value>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for Target {
    fn primary_key(&self) -> String {
        self.name.clone()
    }
    fn table_name(&self) -> &'static str {
        "vela_target"
    }
    fn short_table_name(&self) -> &'static str {
        "tg"
    }
    fn index(&self) -> BTreeMap<String, String> {
        let (cluster, namespace) = self
            .cluster
            .as_ref()
            .map(|c| (c.cluster_name.as_str(), c.namespace.as_str()))
            .unwrap_or_default();
        index_of([
            ("name", self.name.as_str()),
            ("project", self.project.as_str()),
            ("clusterName", cluster),
            ("namespace", namespace),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

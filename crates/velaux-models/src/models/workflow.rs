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

/// One stage of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStep {
    pub name: String,
    pub alias: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    pub properties: Option<Value>,
    pub meta: Option<Value>,
    #[serde(rename = "if")]
    pub if_condition: Option<String>,
    pub timeout: Option<String>,
    pub sub_steps: Vec<WorkflowStep>,
}

impl WorkflowStep {
    /// String property of the step, if present.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.as_ref()?.get(key)?.as_str()
    }

    /// String array property of the step, empty when absent.
    pub fn property_strings(&self, key: &str) -> Vec<String> {
        self.properties
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An ordered execution plan of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Workflow {
    pub app_primary_key: String,
    pub name: String,
    pub alias: String,
    pub description: String,
    pub env_name: String,
    pub default: bool,
    pub steps: Vec<WorkflowStep>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for Workflow {
    fn primary_key(&self) -> String {
        format!("{}-{}", self.app_primary_key, self.name)
    }
    fn table_name(&self) -> &'static str {
        "vela_workflow"
    }
    fn short_table_name(&self) -> &'static str {
        "wf"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("name", self.name.as_str()),
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

/// Execution status of one workflow step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStepStatus {
    pub id: String,
    pub name: String,
    pub alias: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub phase: String,
    pub message: String,
    pub reason: String,
    pub first_execute_time: Option<DateTime<Utc>>,
    pub last_execute_time: Option<DateTime<Utc>>,
    pub sub_steps_status: Vec<WorkflowStepStatus>,
}

/// One execution of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowRecord {
    pub workflow_name: String,
    pub workflow_alias: String,
    pub app_primary_key: String,
    pub revision_primary_key: String,
    pub name: String,
    pub namespace: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub message: String,
    pub mode: String,
    /// "true" or "false"; stored as a string so it can be indexed.
    pub finished: String,
    pub steps: Vec<WorkflowStepStatus>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn is_finished(&self) -> bool {
        self.finished == "true"
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished.to_string();
    }
}

impl Entity for WorkflowRecord {
    fn primary_key(&self) -> String {
        self.name.clone()
    }
    fn table_name(&self) -> &'static str {
        "vela_workflow_record"
    }
    fn short_table_name(&self) -> &'static str {
        "wfr"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([
            ("appPrimaryKey", self.app_primary_key.as_str()),
            ("workflowName", self.workflow_name.as_str()),
            ("revisionPrimaryKey", self.revision_primary_key.as_str()),
            ("name", self.name.as_str()),
            ("finished", self.finished.as_str()),
        ])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

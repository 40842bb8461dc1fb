/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::entity::{index_of, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub owner: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Entity for Project {
    fn primary_key(&self) -> String {
        self.name.clone()
    }
    fn table_name(&self) -> &'static str {
        "vela_project"
    }
    fn short_table_name(&self) -> &'static str {
        "pj"
    }
    fn index(&self) -> BTreeMap<String, String> {
        index_of([("name", self.name.as_str())])
    }
    fn set_create_time(&mut self, time: DateTime<Utc>) {
        self.create_time = time;
    }
    fn set_update_time(&mut self, time: DateTime<Utc>) {
        self.update_time = time;
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! The `Entity` contract and the closed set of records the datastore knows.

use crate::models::{
    Application, ApplicationComponent, ApplicationPolicy, ApplicationRevision, Env, EnvBinding,
    Project, Target, Workflow, WorkflowRecord,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// A record that can be persisted by a datastore driver.
pub trait Entity {
    /// Unique key of the record within its table.
    fn primary_key(&self) -> String;
    /// Name of the table holding the record.
    fn table_name(&self) -> &'static str;
    /// Compact table name used where storage keys are length constrained.
    fn short_table_name(&self) -> &'static str;
    /// Secondary index projection. Only non-empty values are present.
    fn index(&self) -> BTreeMap<String, String>;
    fn set_create_time(&mut self, time: DateTime<Utc>);
    fn set_update_time(&mut self, time: DateTime<Utc>);
}

/// A concrete record type that converts to and from [`Record`].
pub trait Kind: Entity + Into<Record> + TryFrom<Record, Error = Record> + Send + 'static {}

impl<T> Kind for T where T: Entity + Into<Record> + TryFrom<Record, Error = Record> + Send + 'static {}

macro_rules! records {
    ($($variant:ident),* $(,)?) => {
        /// Every record type the datastore persists.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            $($variant($variant),)*
        }

        impl Entity for Record {
            fn primary_key(&self) -> String {
                match self { $(Record::$variant(r) => r.primary_key(),)* }
            }
            fn table_name(&self) -> &'static str {
                match self { $(Record::$variant(r) => r.table_name(),)* }
            }
            fn short_table_name(&self) -> &'static str {
                match self { $(Record::$variant(r) => r.short_table_name(),)* }
            }
            fn index(&self) -> BTreeMap<String, String> {
                match self { $(Record::$variant(r) => r.index(),)* }
            }
            fn set_create_time(&mut self, time: DateTime<Utc>) {
                match self { $(Record::$variant(r) => r.set_create_time(time),)* }
            }
            fn set_update_time(&mut self, time: DateTime<Utc>) {
                match self { $(Record::$variant(r) => r.set_update_time(time),)* }
            }
        }

        impl Record {
            /// Serializes the wrapped record into its JSON document.
            pub fn to_document(&self) -> serde_json::Result<Value> {
                match self { $(Record::$variant(r) => serde_json::to_value(r),)* }
            }

            /// Decodes `document` into a record of the same kind as `self`.
            pub fn with_document(&self, document: Value) -> serde_json::Result<Record> {
                match self {
                    $(Record::$variant(_) => serde_json::from_value::<$variant>(document).map(Record::$variant),)*
                }
            }
        }

        $(
            impl From<$variant> for Record {
                fn from(record: $variant) -> Self {
                    Record::$variant(record)
                }
            }

            impl TryFrom<Record> for $variant {
                type Error = Record;

                fn try_from(record: Record) -> Result<Self, Self::Error> {
                    match record {
                        Record::$variant(r) => Ok(r),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

records!(
    Application,
    ApplicationComponent,
    ApplicationPolicy,
    ApplicationRevision,
    Workflow,
    WorkflowRecord,
    Env,
    EnvBinding,
    Target,
    Project,
);

/// Builds an index map from `(key, value)` pairs, dropping empty values.
pub(crate) fn index_of<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

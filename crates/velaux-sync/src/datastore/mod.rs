/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Datastore Module
//!
//! The CRUD + query contract the sync engine and the services persist through,
//! and the drivers implementing it.
//!
//! ## Drivers
//!
//! - [`memory::MemoryStore`]: process-local maps
//! - [`kubeapi::KubeApiStore`]: one ConfigMap per record
//! - [`postgres::PostgresStore`]: one JSONB row per record
//!
//! Every driver stores a record as its JSON document plus its index projection
//! and shares [`select`] for filtering, sorting and paging.
//!
//! ## Typed access
//!
//! [`DataStore`] moves the closed [`Record`] enum around. [`DataStoreExt`] wraps
//! it with typed helpers, so callers write
//! `ds.find(Application { name, ..Default::default() })` and get an
//! `Option<Application>` back.

pub mod kubeapi;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use velaux_models::{Entity, Kind, Record};
use velaux_utils::telemetry::prelude::*;

/// Errors raised by the datastore drivers.
#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    #[error("entity primary key is empty")]
    PrimaryEmpty,
    #[error("entity table name is empty")]
    TableNameEmpty,
    #[error("data record already exists")]
    RecordExist,
    #[error("data record does not exist")]
    RecordNotExist,
    #[error("entity index is invalid: {0}")]
    IndexInvalid(String),
    #[error("datastore error: {0}")]
    Database(String),
    #[error("failed to encode or decode a record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("batch add failed at {table} {key}: {source}")]
    Batch {
        table: &'static str,
        key: String,
        #[source]
        source: Box<DataStoreError>,
    },
}

impl DataStoreError {
    /// The driver error underneath any batch wrapping.
    pub fn cause(&self) -> &DataStoreError {
        match self {
            DataStoreError::Batch { source, .. } => source.cause(),
            other => other,
        }
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self.cause(), DataStoreError::RecordNotExist)
    }

    pub fn is_exist(&self) -> bool {
        matches!(self.cause(), DataStoreError::RecordExist)
    }
}

/// Ordering direction of a [`SortOption`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Sort by a top level document field.
#[derive(Debug, Clone)]
pub struct SortOption {
    pub key: String,
    pub order: SortOrder,
}

/// Substring match on a document field.
#[derive(Debug, Clone)]
pub struct FuzzyQueryOption {
    pub key: String,
    pub query: String,
}

/// Index value must be one of `values`.
#[derive(Debug, Clone)]
pub struct InQueryOption {
    pub key: String,
    pub values: Vec<String>,
}

/// Index key must be absent.
#[derive(Debug, Clone)]
pub struct IsNotExistQueryOption {
    pub key: String,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub queries: Vec<FuzzyQueryOption>,
    pub in_queries: Vec<InQueryOption>,
    pub is_not_exist: Vec<IsNotExistQueryOption>,
}

/// Options of [`DataStore::list`]. Pages start at 1; a zero page or page size
/// disables paging.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filter: FilterOptions,
    pub page: usize,
    pub page_size: usize,
    pub sort_by: Vec<SortOption>,
}

impl ListOptions {
    /// Options restricting an index key to a set of values.
    pub fn with_in(key: &str, values: Vec<String>) -> Self {
        ListOptions {
            filter: FilterOptions {
                in_queries: vec![InQueryOption {
                    key: key.to_string(),
                    values,
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A stored record as the drivers see it.
#[derive(Debug, Clone)]
pub struct Document {
    pub index: BTreeMap<String, String>,
    pub data: Value,
}

/// The generic persistence contract.
///
/// Records are atomic individually; nothing spans records.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts a new record, setting its create and update time.
    async fn add(&self, record: &mut Record) -> Result<(), DataStoreError>;

    /// Inserts several records.
    ///
    /// This is best-effort compensation, not a transaction: when an insert
    /// fails, the records this batch added before it are deleted again, except
    /// any whose key equals the key of a failing record-exists insert.
    async fn batch_add(&self, records: &mut [Record]) -> Result<(), DataStoreError> {
        let mut not_rollback: HashSet<(&'static str, String)> = HashSet::new();
        for i in 0..records.len() {
            let result = self.add(&mut records[i]).await;
            let Err(err) = result else { continue };

            if err.is_exist() {
                not_rollback.insert((records[i].table_name(), records[i].primary_key()));
            }
            for added in &records[..i] {
                if not_rollback.contains(&(added.table_name(), added.primary_key())) {
                    continue;
                }
                if let Err(e) = self.delete(added).await {
                    if !e.is_not_exist() {
                        error!(
                            "rollback of {} {} failed: {}",
                            added.table_name(),
                            added.primary_key(),
                            e
                        );
                    }
                }
            }
            return Err(DataStoreError::Batch {
                table: records[i].table_name(),
                key: records[i].primary_key(),
                source: Box::new(err),
            });
        }
        Ok(())
    }

    /// Replaces an existing record, setting its update time.
    async fn put(&self, record: &mut Record) -> Result<(), DataStoreError>;

    /// Loads the record with the primary key of `record` into it.
    async fn get(&self, record: &mut Record) -> Result<(), DataStoreError>;

    async fn delete(&self, record: &Record) -> Result<(), DataStoreError>;

    async fn is_exist(&self, record: &Record) -> Result<bool, DataStoreError>;

    /// Records of the table of `query` whose index contains every pair of the
    /// query's index.
    async fn list(
        &self,
        query: &Record,
        options: Option<&ListOptions>,
    ) -> Result<Vec<Record>, DataStoreError>;

    async fn count(
        &self,
        query: &Record,
        filter: Option<&FilterOptions>,
    ) -> Result<usize, DataStoreError>;
}

/// Typed helpers over [`DataStore`].
#[async_trait]
pub trait DataStoreExt: DataStore {
    /// Loads an entity by primary key.
    async fn fetch<E: Kind>(&self, entity: E) -> Result<E, DataStoreError> {
        let mut record = entity.into();
        self.get(&mut record).await?;
        narrow(record)
    }

    /// Like [`DataStoreExt::fetch`] with a missing record as `None`.
    async fn find<E: Kind>(&self, entity: E) -> Result<Option<E>, DataStoreError> {
        match self.fetch(entity).await {
            Ok(found) => Ok(Some(found)),
            Err(DataStoreError::RecordNotExist) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert<E: Kind>(&self, entity: E) -> Result<E, DataStoreError> {
        let mut record = entity.into();
        self.add(&mut record).await?;
        narrow(record)
    }

    async fn update<E: Kind>(&self, entity: E) -> Result<E, DataStoreError> {
        let mut record = entity.into();
        self.put(&mut record).await?;
        narrow(record)
    }

    /// Adds the entity, replacing it when it already exists.
    async fn upsert<E: Kind>(&self, entity: E) -> Result<E, DataStoreError> {
        let mut record = entity.into();
        let added = self.add(&mut record).await;
        match added {
            Err(DataStoreError::RecordExist) => self.put(&mut record).await?,
            other => other?,
        }
        narrow(record)
    }

    async fn remove<E: Kind>(&self, entity: E) -> Result<(), DataStoreError> {
        self.delete(&entity.into()).await
    }

    async fn exists<E: Kind>(&self, entity: E) -> Result<bool, DataStoreError> {
        self.is_exist(&entity.into()).await
    }

    async fn list_as<E: Kind>(
        &self,
        query: E,
        options: Option<&ListOptions>,
    ) -> Result<Vec<E>, DataStoreError> {
        self.list(&query.into(), options)
            .await?
            .into_iter()
            .map(narrow)
            .collect()
    }
}

impl<T: DataStore + ?Sized> DataStoreExt for T {}

fn narrow<E: Kind>(record: Record) -> Result<E, DataStoreError> {
    E::try_from(record).map_err(|other| {
        DataStoreError::Database(format!(
            "driver returned a record of table {}",
            other.table_name()
        ))
    })
}

/// Validates the key fields every driver relies on.
pub(crate) fn check_entity(record: &Record) -> Result<(), DataStoreError> {
    if record.table_name().is_empty() {
        return Err(DataStoreError::TableNameEmpty);
    }
    if record.primary_key().is_empty() {
        return Err(DataStoreError::PrimaryEmpty);
    }
    check_index(record)
}

pub(crate) fn check_index(record: &Record) -> Result<(), DataStoreError> {
    if record.table_name().is_empty() {
        return Err(DataStoreError::TableNameEmpty);
    }
    if let Some(key) = record.index().keys().find(|k| k.is_empty()) {
        return Err(DataStoreError::IndexInvalid(format!(
            "empty index key in {}",
            key
        )));
    }
    Ok(())
}

/// Serializes a record into the stored shape.
pub(crate) fn to_document(record: &Record) -> Result<Document, DataStoreError> {
    Ok(Document {
        index: record.index(),
        data: record.to_document()?,
    })
}

/// Whether a document satisfies the query index and the filter options.
pub(crate) fn matches(
    doc: &Document,
    query_index: &BTreeMap<String, String>,
    filter: Option<&FilterOptions>,
) -> bool {
    if !query_index
        .iter()
        .all(|(k, v)| doc.index.get(k) == Some(v))
    {
        return false;
    }
    let Some(filter) = filter else {
        return true;
    };
    let in_ok = filter.in_queries.iter().all(|q| {
        doc.index
            .get(&q.key)
            .map(|v| q.values.contains(v))
            .unwrap_or(false)
    });
    let not_exist_ok = filter
        .is_not_exist
        .iter()
        .all(|q| !doc.index.contains_key(&q.key));
    let fuzzy_ok = filter.queries.iter().all(|q| {
        let field = doc
            .data
            .get(&q.key)
            .and_then(Value::as_str)
            .or_else(|| doc.index.get(&q.key).map(String::as_str));
        field.map(|v| v.contains(&q.query)).unwrap_or(false)
    });
    in_ok && not_exist_ok && fuzzy_ok
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Filters, sorts and pages documents the way every driver exposes them.
pub(crate) fn select(
    docs: impl IntoIterator<Item = Document>,
    query_index: &BTreeMap<String, String>,
    options: Option<&ListOptions>,
) -> Vec<Document> {
    let mut selected: Vec<Document> = docs
        .into_iter()
        .filter(|doc| matches(doc, query_index, options.map(|o| &o.filter)))
        .collect();

    let Some(options) = options else {
        return selected;
    };
    if !options.sort_by.is_empty() {
        selected.sort_by(|a, b| {
            options
                .sort_by
                .iter()
                .map(|sort| {
                    let ord = compare_field(a.data.get(&sort.key), b.data.get(&sort.key));
                    match sort.order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
    if options.page > 0 && options.page_size > 0 {
        return selected
            .into_iter()
            .skip((options.page - 1) * options.page_size)
            .take(options.page_size)
            .collect();
    }
    selected
}

/// Decodes selected documents into records of the query's kind.
pub(crate) fn decode_all(
    query: &Record,
    docs: Vec<Document>,
) -> Result<Vec<Record>, DataStoreError> {
    docs.into_iter()
        .map(|doc| query.with_document(doc.data).map_err(DataStoreError::from))
        .collect()
}

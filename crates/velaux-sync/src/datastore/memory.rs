/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Process-local datastore driver.

use super::{
    check_entity, check_index, decode_all, matches, select, to_document, DataStore,
    DataStoreError, Document, FilterOptions, ListOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use velaux_models::{Entity, Record};

type Tables = HashMap<&'static str, BTreeMap<String, Document>>;

/// Keeps every table in memory. Rows are ordered by primary key.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DataStoreError> {
        self.tables
            .read()
            .map_err(|e| DataStoreError::Database(format!("memory store poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DataStoreError> {
        self.tables
            .write()
            .map_err(|e| DataStoreError::Database(format!("memory store poisoned: {}", e)))
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn add(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let now = Utc::now();
        record.set_create_time(now);
        record.set_update_time(now);
        let doc = to_document(record)?;

        let mut tables = self.write()?;
        let table = tables.entry(record.table_name()).or_default();
        let key = record.primary_key();
        if table.contains_key(&key) {
            return Err(DataStoreError::RecordExist);
        }
        table.insert(key, doc);
        Ok(())
    }

    async fn put(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        record.set_update_time(Utc::now());
        let doc = to_document(record)?;

        let mut tables = self.write()?;
        let stored = tables
            .get_mut(record.table_name())
            .and_then(|table| table.get_mut(&record.primary_key()))
            .ok_or(DataStoreError::RecordNotExist)?;
        *stored = doc;
        Ok(())
    }

    async fn get(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let data = {
            let tables = self.read()?;
            tables
                .get(record.table_name())
                .and_then(|table| table.get(&record.primary_key()))
                .map(|doc| doc.data.clone())
                .ok_or(DataStoreError::RecordNotExist)?
        };
        *record = record.with_document(data)?;
        Ok(())
    }

    async fn delete(&self, record: &Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let mut tables = self.write()?;
        tables
            .get_mut(record.table_name())
            .and_then(|table| table.remove(&record.primary_key()))
            .map(|_| ())
            .ok_or(DataStoreError::RecordNotExist)
    }

    async fn is_exist(&self, record: &Record) -> Result<bool, DataStoreError> {
        check_entity(record)?;
        let tables = self.read()?;
        Ok(tables
            .get(record.table_name())
            .map(|table| table.contains_key(&record.primary_key()))
            .unwrap_or(false))
    }

    async fn list(
        &self,
        query: &Record,
        options: Option<&ListOptions>,
    ) -> Result<Vec<Record>, DataStoreError> {
        check_index(query)?;
        let docs: Vec<Document> = {
            let tables = self.read()?;
            tables
                .get(query.table_name())
                .map(|table| table.values().cloned().collect())
                .unwrap_or_default()
        };
        decode_all(query, select(docs, &query.index(), options))
    }

    async fn count(
        &self,
        query: &Record,
        filter: Option<&FilterOptions>,
    ) -> Result<usize, DataStoreError> {
        check_index(query)?;
        let index = query.index();
        let tables = self.read()?;
        Ok(tables
            .get(query.table_name())
            .map(|table| {
                table
                    .values()
                    .filter(|doc| matches(doc, &index, filter))
                    .count()
            })
            .unwrap_or(0))
    }
}

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! PostgreSQL datastore driver.
//!
//! Every record is one row of `datastore_records`, keyed by
//! `(table_name, primary_key)`, holding the JSON document and the index
//! projection as JSONB.

use super::{
    check_entity, check_index, decode_all, matches, select, to_document, DataStore,
    DataStoreError, Document, FilterOptions, ListOptions,
};
use crate::db::{ConnectionPool, DbError};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::MigrationHarness;
use serde_json::Value;
use std::collections::BTreeMap;
use velaux_models::models::DatastoreRow;
use velaux_models::schema::datastore_records;
use velaux_models::{Entity, Record, MIGRATIONS};
use velaux_utils::telemetry::prelude::*;

impl From<DbError> for DataStoreError {
    fn from(e: DbError) -> Self {
        DataStoreError::Database(e.to_string())
    }
}

impl From<DieselError> for DataStoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => DataStoreError::RecordNotExist,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                DataStoreError::RecordExist
            }
            other => DataStoreError::Database(other.to_string()),
        }
    }
}

/// Datastore over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: ConnectionPool,
}

impl PostgresStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Creates the schema if configured and applies pending migrations.
    pub async fn run_migrations(&self) -> Result<(), DataStoreError> {
        self.blocking(|pool| {
            pool.setup_schema()?;
            let mut conn = pool.get()?;
            let applied = conn
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| DataStoreError::Database(format!("migration failed: {}", e)))?;
            info!("applied {} datastore migrations", applied.len());
            Ok(())
        })
        .await
    }

    /// Runs a diesel closure on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DataStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ConnectionPool) -> Result<T, DataStoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || f(&pool))
            .await
            .map_err(|e| DataStoreError::Database(format!("blocking task failed: {}", e)))?
    }

    async fn load_table(&self, table: &'static str) -> Result<Vec<Document>, DataStoreError> {
        let rows = self
            .blocking(move |pool| {
                let mut conn = pool.get()?;
                datastore_records::table
                    .filter(datastore_records::table_name.eq(table))
                    .order(datastore_records::primary_key.asc())
                    .select(DatastoreRow::as_select())
                    .load(&mut conn)
                    .map_err(DataStoreError::from)
            })
            .await?;
        rows.into_iter().map(row_to_document).collect()
    }
}

fn row_to_document(row: DatastoreRow) -> Result<Document, DataStoreError> {
    let index: BTreeMap<String, String> = serde_json::from_value(row.index_labels)?;
    Ok(Document {
        index,
        data: row.data,
    })
}

fn index_json(index: &BTreeMap<String, String>) -> Result<Value, DataStoreError> {
    Ok(serde_json::to_value(index)?)
}

#[async_trait]
impl DataStore for PostgresStore {
    async fn add(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let now = Utc::now();
        record.set_create_time(now);
        record.set_update_time(now);
        let doc = to_document(record)?;
        let row = DatastoreRow {
            table_name: record.table_name().to_string(),
            primary_key: record.primary_key(),
            index_labels: index_json(&doc.index)?,
            data: doc.data,
            created_at: now,
            updated_at: now,
        };

        self.blocking(move |pool| {
            let mut conn = pool.get()?;
            diesel::insert_into(datastore_records::table)
                .values(&row)
                .execute(&mut conn)?;
            Ok(())
        })
        .await
    }

    async fn put(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let now = Utc::now();
        record.set_update_time(now);
        let doc = to_document(record)?;
        let table = record.table_name();
        let key = record.primary_key();
        let index = index_json(&doc.index)?;

        let updated = self
            .blocking(move |pool| {
                let mut conn = pool.get()?;
                diesel::update(datastore_records::table.find((table, key)))
                    .set((
                        datastore_records::index_labels.eq(index),
                        datastore_records::data.eq(doc.data),
                        datastore_records::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .map_err(DataStoreError::from)
            })
            .await?;
        if updated == 0 {
            return Err(DataStoreError::RecordNotExist);
        }
        Ok(())
    }

    async fn get(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let table = record.table_name();
        let key = record.primary_key();
        let row = self
            .blocking(move |pool| {
                let mut conn = pool.get()?;
                datastore_records::table
                    .find((table, key))
                    .select(DatastoreRow::as_select())
                    .first(&mut conn)
                    .map_err(DataStoreError::from)
            })
            .await?;
        *record = record.with_document(row.data)?;
        Ok(())
    }

    async fn delete(&self, record: &Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let table = record.table_name();
        let key = record.primary_key();
        let deleted = self
            .blocking(move |pool| {
                let mut conn = pool.get()?;
                diesel::delete(datastore_records::table.find((table, key)))
                    .execute(&mut conn)
                    .map_err(DataStoreError::from)
            })
            .await?;
        if deleted == 0 {
            return Err(DataStoreError::RecordNotExist);
        }
        Ok(())
    }

    async fn is_exist(&self, record: &Record) -> Result<bool, DataStoreError> {
        check_entity(record)?;
        let table = record.table_name();
        let key = record.primary_key();
        self.blocking(move |pool| {
            let mut conn = pool.get()?;
            diesel::select(diesel::dsl::exists(
                datastore_records::table.find((table, key)),
            ))
            .get_result(&mut conn)
            .map_err(DataStoreError::from)
        })
        .await
    }

    async fn list(
        &self,
        query: &Record,
        options: Option<&ListOptions>,
    ) -> Result<Vec<Record>, DataStoreError> {
        check_index(query)?;
        let docs = self.load_table(query.table_name()).await?;
        decode_all(query, select(docs, &query.index(), options))
    }

    async fn count(
        &self,
        query: &Record,
        filter: Option<&FilterOptions>,
    ) -> Result<usize, DataStoreError> {
        check_index(query)?;
        let index = query.index();
        let docs = self.load_table(query.table_name()).await?;
        Ok(docs
            .iter()
            .filter(|doc| matches(doc, &index, filter))
            .count())
    }
}

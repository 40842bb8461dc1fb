/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// One stored record in the postgres document table.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::datastore_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DatastoreRow {
    pub table_name: String,
    pub primary_key: String,
    pub index_labels: serde_json::Value,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

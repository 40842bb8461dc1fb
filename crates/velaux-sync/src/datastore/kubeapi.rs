/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Kubernetes API datastore driver.
//!
//! Every record is one ConfigMap in the store namespace, named
//! `<short table name>-<primary key>`. Keys that are not already valid
//! object names are lower-cased, sanitized and suffixed with a digest of the
//! original key, so distinct keys never share a ConfigMap. The JSON document lives under the
//! `data` key and the index projection under `index`; the table label
//! narrows list calls to one table.

use super::{
    check_entity, check_index, decode_all, matches, select, to_document, DataStore,
    DataStoreError, Document, FilterOptions, ListOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::{DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use velaux_models::{Entity, Record};
use velaux_utils::telemetry::prelude::*;

const TABLE_LABEL: &str = "velaux.oam.dev/table";
const DATA_KEY: &str = "data";
const INDEX_KEY: &str = "index";
const MAX_NAME_LEN: usize = 253;
const DIGEST_LEN: usize = 10;

impl From<kube::Error> for DataStoreError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code == 404 => DataStoreError::RecordNotExist,
            kube::Error::Api(resp) if resp.code == 409 => DataStoreError::RecordExist,
            _ => DataStoreError::Database(e.to_string()),
        }
    }
}

/// Datastore over ConfigMaps of one namespace.
#[derive(Clone)]
pub struct KubeApiStore {
    api: Api<ConfigMap>,
    namespace: String,
}

impl KubeApiStore {
    /// Creates the store, creating its namespace when missing.
    pub async fn new(client: Client, namespace: &str) -> Result<Self, DataStoreError> {
        let namespaces: Api<Namespace> = Api::all(client.clone());
        if namespaces.get_opt(namespace).await?.is_none() {
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    annotations: Some(BTreeMap::from([(
                        "description".to_string(),
                        "For VelaUX metadata storage.".to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            };
            match namespaces.create(&PostParams::default(), &ns).await {
                Ok(_) => info!("created datastore namespace {}", namespace),
                Err(kube::Error::Api(resp)) if resp.code == 409 => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        })
    }

    fn config_map(&self, record: &Record) -> Result<ConfigMap, DataStoreError> {
        let doc = to_document(record)?;
        let labels = BTreeMap::from([(TABLE_LABEL.to_string(), record.table_name().to_string())]);
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(object_name(record)),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (DATA_KEY.to_string(), serde_json::to_string(&doc.data)?),
                (INDEX_KEY.to_string(), serde_json::to_string(&doc.index)?),
            ])),
            ..Default::default()
        })
    }

    async fn load_table(&self, table: &str) -> Result<Vec<Document>, DataStoreError> {
        let params = ListParams::default().labels(&format!("{}={}", TABLE_LABEL, table));
        let list = self.api.list(&params).await?;
        list.items.iter().map(document_of).collect()
    }
}

/// ConfigMap name of a record.
pub(crate) fn object_name(record: &Record) -> String {
    let raw = format!("{}-{}", record.short_table_name(), record.primary_key());
    let sanitized: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '-',
        })
        .collect();
    if sanitized == raw && raw.len() <= MAX_NAME_LEN {
        return raw;
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let keep = MAX_NAME_LEN - DIGEST_LEN - 1;
    let prefix = sanitized[..sanitized.len().min(keep)].trim_end_matches(['-', '.']);
    format!("{}-{}", prefix, &digest[..DIGEST_LEN])
}

fn document_of(cm: &ConfigMap) -> Result<Document, DataStoreError> {
    let data = cm.data.as_ref();
    let field = |key: &str| {
        data.and_then(|d| d.get(key)).ok_or_else(|| {
            DataStoreError::Database(format!(
                "config map {} has no {} key",
                cm.metadata.name.as_deref().unwrap_or_default(),
                key
            ))
        })
    };
    Ok(Document {
        data: serde_json::from_str(field(DATA_KEY)?)?,
        index: serde_json::from_str(field(INDEX_KEY)?)?,
    })
}

#[async_trait]
impl DataStore for KubeApiStore {
    async fn add(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let now = Utc::now();
        record.set_create_time(now);
        record.set_update_time(now);
        let cm = self.config_map(record)?;
        self.api.create(&PostParams::default(), &cm).await?;
        Ok(())
    }

    async fn put(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        record.set_update_time(Utc::now());
        let name = object_name(record);
        let existing = self
            .api
            .get_opt(&name)
            .await?
            .ok_or(DataStoreError::RecordNotExist)?;

        let mut cm = self.config_map(record)?;
        cm.metadata.resource_version = existing.metadata.resource_version;
        self.api.replace(&name, &PostParams::default(), &cm).await?;
        Ok(())
    }

    async fn get(&self, record: &mut Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        let cm = self
            .api
            .get_opt(&object_name(record))
            .await?
            .ok_or(DataStoreError::RecordNotExist)?;
        let doc = document_of(&cm)?;
        *record = record.with_document(doc.data)?;
        Ok(())
    }

    async fn delete(&self, record: &Record) -> Result<(), DataStoreError> {
        check_entity(record)?;
        self.api
            .delete(&object_name(record), &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn is_exist(&self, record: &Record) -> Result<bool, DataStoreError> {
        check_entity(record)?;
        Ok(self.api.get_opt(&object_name(record)).await?.is_some())
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

/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use std::sync::Arc;
use velaux_models::models::{ApplicationComponent, ClusterTarget, Target};
use velaux_models::Record;
use velaux_sync::datastore::memory::MemoryStore;
use velaux_sync::datastore::{
    DataStore, DataStoreError, DataStoreExt, FilterOptions, FuzzyQueryOption, ListOptions,
    SortOption, SortOrder,
};

fn target(name: &str, project: &str, cluster: &str) -> Target {
    Target {
        name: name.to_string(),
        project: project.to_string(),
        cluster: Some(ClusterTarget {
            cluster_name: cluster.to_string(),
            namespace: "default".to_string(),
        }),
        ..Default::default()
    }
}

fn store() -> Arc<dyn DataStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn test_typed_helpers_through_a_shared_store() {
    let ds = store();

    let added = ds.insert(target("dev", "p1", "local")).await.unwrap();
    assert!(added.create_time.timestamp() > 0);
    assert!(matches!(
        ds.insert(target("dev", "p1", "local")).await,
        Err(DataStoreError::RecordExist)
    ));

    // upsert replaces without failing on the existing key
    let replaced = ds.upsert(target("dev", "p2", "local")).await.unwrap();
    assert_eq!(replaced.project, "p2");
    let fetched = ds.fetch(target("dev", "", "")).await.unwrap();
    assert_eq!(fetched.project, "p2");
    assert!(fetched.update_time >= added.update_time);

    assert!(ds.exists(target("dev", "", "")).await.unwrap());
    ds.remove(target("dev", "", "")).await.unwrap();
    assert!(ds.find(target("dev", "", "")).await.unwrap().is_none());
    assert!(ds
        .remove(target("dev", "", ""))
        .await
        .unwrap_err()
        .is_not_exist());
}

#[tokio::test]
async fn test_list_filters_sorts_and_pages() {
    let ds = store();
    for (name, project, cluster) in [
        ("prod-east", "shop", "east"),
        ("prod-west", "shop", "west"),
        ("staging", "shop", "local"),
        ("sandbox", "lab", "local"),
    ] {
        ds.insert(target(name, project, cluster)).await.unwrap();
    }

    let query = Target {
        project: "shop".to_string(),
        ..Default::default()
    };
    assert_eq!(ds.list_as(query.clone(), None).await.unwrap().len(), 3);

    let in_local = ListOptions::with_in("clusterName", vec!["local".to_string()]);
    let names: Vec<String> = ds
        .list_as(Target::default(), Some(&in_local))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"staging".to_string()));

    let fuzzy = FilterOptions {
        queries: vec![FuzzyQueryOption {
            key: "name".to_string(),
            query: "prod".to_string(),
        }],
        ..Default::default()
    };
    assert_eq!(ds.count(&query.clone().into(), Some(&fuzzy)).await.unwrap(), 2);

    let paged = ListOptions {
        sort_by: vec![SortOption {
            key: "name".to_string(),
            order: SortOrder::Descending,
        }],
        page: 1,
        page_size: 2,
        ..Default::default()
    };
    let first_page: Vec<String> = ds
        .list_as(query, Some(&paged))
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(first_page, vec!["staging", "prod-west"]);
}

#[tokio::test]
async fn test_batch_add_is_compensated_on_failure() {
    let ds = store();
    ds.insert(ApplicationComponent {
        app_primary_key: "shop".to_string(),
        name: "db".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut batch: Vec<Record> = ["web", "cache", "db"]
        .into_iter()
        .map(|name| {
            ApplicationComponent {
                app_primary_key: "shop".to_string(),
                name: name.to_string(),
                ..Default::default()
            }
            .into()
        })
        .collect();
    let err = ds.batch_add(&mut batch).await.unwrap_err();
    assert!(err.is_exist());
    assert!(matches!(
        std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<DataStoreError>()),
        Some(DataStoreError::RecordExist)
    ));

    let left = ds
        .list_as(
            ApplicationComponent {
                app_primary_key: "shop".to_string(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "db");
}

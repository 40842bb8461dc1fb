/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Change-suppression cache keyed by `name-namespace`.

use moka::sync::Cache;

/// What the last successful sync of an Application observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedApp {
    pub generation: i64,
    pub target_count: i64,
}

/// Entries never expire; they are replaced on every sync and dropped on delete.
#[derive(Clone)]
pub struct SyncCache {
    inner: Cache<String, CachedApp>,
}

impl Default for SyncCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedApp> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, entry: CachedApp) {
        self.inner.insert(key, entry);
        crate::metrics::sync_cache_entries().set(self.len() as f64);
    }

    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
        crate::metrics::sync_cache_entries().set(self.len() as f64);
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! File Cache Module
//!
//! Concurrent map from canonical path to fully buffered asset.

use std::collections::HashMap;
use std::fs::Metadata;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheStats, CachedAsset, StatsCounters};

// == File Cache ==
/// Process-lifetime asset cache. Entries are never evicted.
///
/// Assets are built completely before the write lock is taken, so readers
/// only ever see whole buffers. Concurrent stores of the same key are
/// last-write-wins.
#[derive(Debug, Default)]
pub struct FileCache {
    /// Canonical path to published asset
    entries: RwLock<HashMap<String, Arc<CachedAsset>>>,
    /// Performance statistics
    stats: StatsCounters,
}

impl FileCache {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup ==
    /// Returns the asset published under `name`, if any.
    pub async fn lookup(&self, name: &str) -> Option<Arc<CachedAsset>> {
        let found = self.entries.read().await.get(name).cloned();
        match found {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        found
    }

    // == Store ==
    /// Wraps `content` into an asset and publishes it under `name`.
    pub async fn store(&self, name: &str, content: Vec<u8>, meta: &Metadata) -> Arc<CachedAsset> {
        self.insert(CachedAsset::new(name, content, meta)).await
    }

    /// Publishes a complete asset under its canonical name.
    pub async fn insert(&self, asset: CachedAsset) -> Arc<CachedAsset> {
        let asset = Arc::new(asset);
        let total = {
            let mut entries = self.entries.write().await;
            entries.insert(asset.name().to_string(), Arc::clone(&asset));
            entries.len()
        };
        self.stats.record_store();
        debug!(
            "Caching file {} ({} bytes, {} entries cached)",
            asset.name(),
            asset.len(),
            total
        );
        asset
    }

    // == Length ==
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let bytes = entries.values().map(|a| a.len()).sum();
        self.stats.snapshot(entries.len(), bytes)
    }
}

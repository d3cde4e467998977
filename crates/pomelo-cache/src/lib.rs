//! # Pomelo Cache - Catalog Caching Layer
//!
//! Holds the memoized schema catalog snapshot the controller serves
//! reads from. A single slot with a TTL: invalidation replaces the
//! snapshot wholesale, so readers always observe a complete catalog.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use pomelo_schema::SchemaCatalog;

const MAIN_SCHEMA_SLOT: &str = "__MAIN_SCHEMA";

/// In-memory cache for the loaded schema catalog.
pub struct SchemaCache {
    slot: Cache<&'static str, Arc<SchemaCatalog>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        let slot = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self { slot }
    }

    /// The cached catalog, if the slot is warm.
    pub async fn get(&self) -> Option<Arc<SchemaCatalog>> {
        self.slot.get(MAIN_SCHEMA_SLOT).await
    }

    /// Replace the cached catalog.
    pub async fn put(&self, catalog: Arc<SchemaCatalog>) {
        self.slot.insert(MAIN_SCHEMA_SLOT, catalog).await;
    }

    /// Drop the cached catalog; the next load re-reads the store.
    pub async fn clear(&self) {
        self.slot.invalidate(MAIN_SCHEMA_SLOT).await;
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomelo_store::MemoryBackend;

    #[tokio::test]
    async fn test_cache_slot() {
        let cache = SchemaCache::default();
        assert!(cache.get().await.is_none());

        let adapter = Arc::new(MemoryBackend::new());
        let catalog = Arc::new(SchemaCatalog::load(adapter).await.unwrap());
        cache.put(catalog.clone()).await;
        assert!(cache.get().await.is_some());

        cache.clear().await;
        assert!(cache.get().await.is_none());
    }
}

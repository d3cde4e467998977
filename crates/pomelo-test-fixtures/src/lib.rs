//! Test fixtures for Pomelo integration tests.
//!
//! Provides a controller wired to a fresh in-memory backend plus
//! helpers for seeding classes and objects.

use std::sync::Arc;

use pomelo_db::{DbController, FindResult, QueryOptions, WriteOptions};
use pomelo_store::{MemoryBackend, StorageAdapter};
use serde_json::{json, Value};

/// A complete controller environment over an in-memory store.
pub struct TestFixture {
    pub adapter: Arc<MemoryBackend>,
    pub controller: DbController,
}

impl TestFixture {
    pub fn new() -> Self {
        let adapter = Arc::new(MemoryBackend::new());
        let controller = DbController::new(adapter.clone());
        Self { adapter, controller }
    }

    /// Seed a class schema directly in the store.
    pub async fn seed_class(&self, class: &str, fields: Value) -> anyhow::Result<()> {
        self.adapter
            .create_class(class, &json!({"className": class, "fields": fields}))
            .await?;
        self.controller.invalidate_schema().await;
        Ok(())
    }

    /// Create an object with the master key and return its id.
    pub async fn create(&self, class: &str, data: Value) -> anyhow::Result<String> {
        let created = self.controller.create(class, &data, &WriteOptions::master()).await?;
        Ok(created["objectId"].as_str().unwrap_or_default().to_string())
    }

    /// Find with the master key.
    pub async fn find(&self, class: &str, query: Value) -> anyhow::Result<Vec<Value>> {
        let result = self.controller.find(class, &query, &QueryOptions::master()).await?;
        Ok(result.into_objects())
    }

    /// Count with the master key.
    pub async fn count(&self, class: &str, query: Value) -> anyhow::Result<usize> {
        let result = self
            .controller
            .find(class, &query, &QueryOptions { count: true, ..QueryOptions::master() })
            .await?;
        match result {
            FindResult::Count(count) => Ok(count),
            FindResult::Objects(objects) => Ok(objects.len()),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_round_trip() {
        let fixture = TestFixture::new();
        fixture
            .seed_class("post", json!({"title": {"type": "String"}}))
            .await
            .unwrap();

        let id = fixture.create("post", json!({"title": "hello"})).await.unwrap();
        let rows = fixture.find("post", json!({"objectId": id})).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(fixture.count("post", json!({})).await.unwrap(), 1);
    }
}

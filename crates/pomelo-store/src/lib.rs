//! # Pomelo Store - Storage Abstraction Layer
//!
//! Provides the uniform contract physical stores implement and the
//! in-memory document backend used for development and testing.
//!
//! Documents cross this boundary in the *adapter-native* dialect
//! produced by `pomelo-transform`: the primary key is `_id`, timestamps
//! are RFC 3339 strings, per-row permissions are the `_rperm`/`_wperm`
//! arrays, pointers are bare object-id strings, and geopoints are
//! `[longitude, latitude]` pairs. Queries use the dollar-operator
//! dialect (`$in`, `$regex`, `$nearSphere`, ...); updates arrive as
//! operator groups (`$set`, `$unset`, `$inc`, `$push`, `$addToSet`,
//! `$pullAll`).

use async_trait::async_trait;
use serde_json::Value;

pub mod factory;
pub mod memory;

pub use factory::{BackendType, StorageConfig, StorageFactory};
pub use memory::MemoryBackend;
pub use pomelo_types::{Error, Result};

/// Query execution options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// Sort keys in native form; a leading `-` means descending.
    pub sort: Vec<String>,
}

/// The abstract storage contract.
///
/// Schemas cross this boundary in the adapter shape
/// `{"className": ..., "fields": {...}, "classLevelPermissions": {...}}`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Whether a class (table/collection) exists.
    async fn class_exists(&self, class: &str) -> Result<bool>;

    /// Create a class with the given adapter-shape schema and return the
    /// stored schema. Fails with `DuplicateValue` when the class exists.
    async fn create_class(&self, class: &str, schema: &Value) -> Result<Value>;

    /// Add a field if absent. A no-op when the field is already present;
    /// type agreement is the schema layer's concern.
    async fn add_field_if_not_exists(&self, class: &str, field: &str, field_type: &Value)
        -> Result<()>;

    /// Drop a class and its schema row. Dropping a missing class is a
    /// no-op so racing deletes stay idempotent.
    async fn delete_class(&self, class: &str) -> Result<()>;

    /// Drop every class. Test support.
    async fn delete_all_classes(&self) -> Result<()>;

    /// Remove fields from the schema row and from stored objects.
    /// Relation-typed fields have no storage; callers drop the join
    /// class instead.
    async fn delete_fields(&self, class: &str, schema: &Value, fields: &[String]) -> Result<()>;

    /// All schema rows.
    async fn get_all_classes(&self) -> Result<Vec<Value>>;

    /// One schema row, or `None` when the class is unknown.
    async fn get_class(&self, class: &str) -> Result<Option<Value>>;

    /// Insert a native document.
    async fn create_object(&self, class: &str, schema: &Value, object: &Value) -> Result<()>;

    /// Execute a native query.
    async fn find(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;

    /// Count matches of a native query.
    async fn count(&self, class: &str, schema: &Value, query: &Value) -> Result<usize>;

    /// Apply a native update to every match.
    async fn update_objects_by_query(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<()>;

    /// Apply a native update to the first match and return the
    /// post-image, or `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<Option<Value>>;

    /// Update the first match, inserting a fresh document when nothing
    /// matches.
    async fn upsert_one_object(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<()>;

    /// Delete every match; returns the number of rows removed.
    async fn delete_objects_by_query(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
    ) -> Result<usize>;

    /// Install a unique index over the given field tuple.
    async fn ensure_uniqueness(
        &self,
        class: &str,
        schema: &Value,
        fields: &[String],
    ) -> Result<()>;

    /// Persist class-level permissions on the schema row.
    async fn set_class_level_permissions(&self, class: &str, clp: &Value) -> Result<()>;

    /// Install the given schemas (the volatile system classes) when the
    /// store has none.
    async fn perform_initialization(&self, schemas: &[Value]) -> Result<()>;
}

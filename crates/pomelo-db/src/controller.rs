//! The database controller.
//!
//! Binds the schema catalog, the dialect transforms, and a storage
//! adapter into the top-level object operations: permission gates,
//! schema loading, relation reduction, execution, and result
//! sanitization. One controller serves many concurrent callers; the
//! only shared mutable state is the memoized catalog snapshot.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use pomelo_cache::SchemaCache;
use pomelo_schema::{class_name_is_valid, volatile_class_schemas, FieldType, SchemaCatalog};
use pomelo_store::{FindOptions, StorageAdapter};
use pomelo_transform::{
    add_read_acl, add_write_acl, transform_create, transform_key, transform_update,
    transform_where, untransform_object,
};
use pomelo_types::json::op_tag;
use pomelo_types::{Error, Result};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::object_id::new_object_id;
use crate::relations;

/// Options for read operations. A `None` acl means the caller holds
/// the master key and bypasses permission checks.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// Public sort keys; a leading `-` means descending.
    pub sort: Vec<String>,
    pub count: bool,
    pub acl: Option<Vec<String>>,
}

impl QueryOptions {
    /// Master-key options: no acl group, no paging.
    pub fn master() -> Self {
        Self::default()
    }

    /// Options scoped to an acl group.
    pub fn with_acl(acl: Vec<String>) -> Self {
        Self { acl: Some(acl), ..Self::default() }
    }
}

/// Options for write operations.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub acl: Option<Vec<String>>,
    pub many: bool,
    pub upsert: bool,
}

impl WriteOptions {
    pub fn master() -> Self {
        Self::default()
    }

    pub fn with_acl(acl: Vec<String>) -> Self {
        Self { acl: Some(acl), ..Self::default() }
    }
}

/// The result of a `find`: rows, or a count when requested.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    Objects(Vec<Value>),
    Count(usize),
}

impl FindResult {
    /// The rows of an object result; a count yields an empty list.
    pub fn into_objects(self) -> Vec<Value> {
        match self {
            FindResult::Objects(objects) => objects,
            FindResult::Count(_) => Vec::new(),
        }
    }
}

/// The object-database controller.
pub struct DbController {
    adapter: Arc<dyn StorageAdapter>,
    schema_cache: SchemaCache,
    reload_lock: Mutex<()>,
}

impl DbController {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            schema_cache: SchemaCache::default(),
            reload_lock: Mutex::new(()),
        }
    }

    /// The adapter this controller executes against.
    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    /// Install the volatile class schemas and the system unique
    /// indexes. Run once at startup.
    pub async fn perform_initialization(&self) -> Result<()> {
        self.adapter
            .perform_initialization(&volatile_class_schemas())
            .await?;
        for (class, fields) in [
            ("_User", &["username"][..]),
            ("_User", &["email"][..]),
            ("_Role", &["name"][..]),
        ] {
            let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
            self.adapter
                .ensure_uniqueness(class, &adapter_schema(class), &fields)
                .await?;
        }
        self.invalidate_schema().await;
        Ok(())
    }

    // ========================================================================
    // Schema Loading
    // ========================================================================

    /// The memoized catalog snapshot. When an acceptor rejects the
    /// cached snapshot (a newly referenced field is missing), the
    /// catalog is reloaded; concurrent rejections share one reload.
    pub async fn load_schema(
        &self,
        acceptor: Option<&(dyn Fn(&SchemaCatalog) -> bool + Sync)>,
    ) -> Result<Arc<SchemaCatalog>> {
        if let Some(catalog) = self.schema_cache.get().await {
            match acceptor {
                None => return Ok(catalog),
                Some(accept) if accept(&catalog) => return Ok(catalog),
                Some(_) => {},
            }
        }

        let _guard = self.reload_lock.lock().await;
        // Another caller may have refreshed the slot while we waited.
        if let Some(catalog) = self.schema_cache.get().await {
            if acceptor.map(|accept| accept(&catalog)).unwrap_or(true) {
                return Ok(catalog);
            }
        }
        let catalog = Arc::new(SchemaCatalog::load(self.adapter.clone()).await?);
        self.schema_cache.put(catalog.clone()).await;
        Ok(catalog)
    }

    /// Drop the memoized snapshot after a schema-changing operation.
    pub async fn invalidate_schema(&self) {
        self.schema_cache.clear().await;
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Query a class. Derives the permission operation (`get` for a
    /// bare object-id lookup, `count` when counting, `find` otherwise),
    /// reduces relation constraints, transforms, injects the read ACL,
    /// and untransforms every row.
    #[instrument(skip(self, query, options), fields(class = %class))]
    pub async fn find(&self, class: &str, query: &Value, options: &QueryOptions) -> Result<FindResult> {
        let is_master = options.acl.is_none();
        let acl_group = options.acl.clone().unwrap_or_default();

        let keys = keys_for_query(query);
        let catalog = self
            .load_schema(Some(&|catalog: &SchemaCatalog| catalog.has_keys(class, &keys)))
            .await?;

        if !is_master {
            let operation = if options.count {
                "count"
            } else if is_single_object_query(query) {
                "get"
            } else {
                "find"
            };
            catalog.validate_permission(class, &acl_group, operation)?;
        }

        let mut query = query.clone();
        relations::reduce_relation_keys(&*self.adapter, class, &mut query).await?;
        relations::reduce_in_relation(&*self.adapter, &catalog, class, &mut query).await?;

        let mut native = transform_where(&query, false)?;
        if !is_master {
            native = add_read_acl(&native, &acl_group);
        }
        let schema = adapter_schema(class);

        if options.count {
            let count = self.adapter.count(class, &schema, &native).await?;
            debug!(count, "count complete");
            return Ok(FindResult::Count(count));
        }

        let native_options = FindOptions {
            skip: options.skip,
            limit: options.limit,
            sort: options
                .sort
                .iter()
                .map(|key| match key.strip_prefix('-') {
                    Some(rest) => format!("-{}", transform_key(rest)),
                    None => transform_key(key),
                })
                .collect(),
        };
        let rows = self.adapter.find(class, &schema, &native, &native_options).await?;
        debug!(rows = rows.len(), "find complete");

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(self.untransform_for_output(&catalog, class, row)?);
        }
        Ok(FindResult::Objects(results))
    }

    /// Fetch a single object by id.
    pub async fn get(&self, class: &str, object_id: &str, options: &QueryOptions) -> Result<Option<Value>> {
        let result = self
            .find(class, &json!({"objectId": object_id}), options)
            .await?;
        Ok(result.into_objects().into_iter().next())
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Create an object. Stamps `objectId`/`createdAt`/`updatedAt`,
    /// applies relation operators to the join tables, and inserts the
    /// transformed document.
    #[instrument(skip(self, data, options), fields(class = %class))]
    pub async fn create(&self, class: &str, data: &Value, options: &WriteOptions) -> Result<Value> {
        let is_master = options.acl.is_none();
        let acl_group = options.acl.clone().unwrap_or_default();

        if !class_name_is_valid(class) {
            return Err(Error::InvalidClassName(format!("invalid className: {class}")));
        }
        let catalog = self.load_schema(None).await?;
        if !is_master {
            catalog.validate_permission(class, &acl_group, "create")?;
        }

        let mut data = data.clone();
        let object_id = data
            .get("objectId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| new_object_id(10));
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Some(map) = data.as_object_mut() {
            map.insert("objectId".to_string(), json!(object_id));
            map.insert("createdAt".to_string(), json!(now));
            map.insert("updatedAt".to_string(), json!(now));
        }

        relations::handle_relation_updates(&*self.adapter, class, &object_id, &mut data).await?;

        let native = transform_create(&data)?;
        self.adapter
            .create_object(class, &adapter_schema(class), &native)
            .await?;
        debug!(%object_id, "object created");

        Ok(json!({"objectId": object_id, "createdAt": now}))
    }

    /// Update objects matching `query`. Relation operators apply to the
    /// join tables before the primary write; the primary write is a
    /// find-one-and-update unless `many`/`upsert` is set. Returns the
    /// sanitized diff: only fields touched by atomic operators, with
    /// their post-image values.
    #[instrument(skip(self, query, data, options), fields(class = %class))]
    pub async fn update(
        &self,
        class: &str,
        query: &Value,
        data: &Value,
        options: &WriteOptions,
    ) -> Result<Value> {
        let is_master = options.acl.is_none();
        let acl_group = options.acl.clone().unwrap_or_default();
        let original = data.clone();
        // Callers must not observe mutation of their update map.
        let mut data = data.clone();

        let keys = keys_for_query(query);
        let catalog = self
            .load_schema(Some(&|catalog: &SchemaCatalog| catalog.has_keys(class, &keys)))
            .await?;
        if !is_master {
            catalog.validate_permission(class, &acl_group, "update")?;
        }

        let owning_id = query
            .get("objectId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        relations::handle_relation_updates(&*self.adapter, class, owning_id, &mut data).await?;

        if let Some(map) = data.as_object_mut() {
            map.insert(
                "updatedAt".to_string(),
                json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }

        let mut native_query = transform_where(query, true)?;
        if !is_master {
            native_query = add_write_acl(&native_query, &acl_group);
        }
        let native_update = transform_update(&data, true)?;
        let schema = adapter_schema(class);

        if options.many {
            self.adapter
                .update_objects_by_query(class, &schema, &native_query, &native_update)
                .await?;
            return Ok(json!({}));
        }
        if options.upsert {
            self.adapter
                .upsert_one_object(class, &schema, &native_query, &native_update)
                .await?;
            return Ok(json!({}));
        }

        let post_image = self
            .adapter
            .find_one_and_update(class, &schema, &native_query, &native_update)
            .await?
            .ok_or_else(|| Error::ObjectNotFound("Object not found.".to_string()))?;

        let public = untransform_object(&catalog, class, &post_image)?;
        Ok(sanitize_database_result(&original, &public))
    }

    /// Delete objects matching `query`. Zero rows deleted is fatal
    /// except for `_Session`, so a password change without a live
    /// session does not fail.
    #[instrument(skip(self, query, options), fields(class = %class))]
    pub async fn destroy(&self, class: &str, query: &Value, options: &WriteOptions) -> Result<()> {
        let is_master = options.acl.is_none();
        let acl_group = options.acl.clone().unwrap_or_default();

        let catalog = self.load_schema(None).await?;
        if !is_master {
            catalog.validate_permission(class, &acl_group, "delete")?;
        }

        let mut native = transform_where(query, true)?;
        if !is_master {
            native = add_write_acl(&native, &acl_group);
        }

        let deleted = self
            .adapter
            .delete_objects_by_query(class, &adapter_schema(class), &native)
            .await?;
        debug!(deleted, "destroy complete");
        if deleted == 0 && class != "_Session" {
            return Err(Error::ObjectNotFound("Object not found.".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Validation & Schema Operations
    // ========================================================================

    /// Validate an object against the class schema, growing the schema
    /// for new fields when the CLP's `addField` permits.
    pub async fn validate_object(
        &self,
        class: &str,
        object: &Value,
        query: &Value,
        options: &WriteOptions,
    ) -> Result<()> {
        if options.acl.is_none() {
            return Ok(());
        }
        let acl_group = options.acl.clone().unwrap_or_default();

        let catalog = self.load_schema(None).await?;
        can_add_field(&catalog, class, object, &acl_group)?;

        let mut working = (*catalog).clone();
        working.validate_object(class, object, query).await?;
        // Field enforcement may have grown the schema.
        self.schema_cache.put(Arc::new(working)).await;
        Ok(())
    }

    /// Drop a class's rows and schema. Fails `ClassNotEmpty` when rows
    /// remain.
    pub async fn delete_schema(&self, class: &str) -> Result<()> {
        if !self.adapter.class_exists(class).await? {
            return Ok(());
        }
        let schema = adapter_schema(class);
        let count = self.adapter.count(class, &schema, &json!({})).await?;
        if count > 0 {
            return Err(Error::ClassNotEmpty(format!(
                "Class {class} is not empty, contains {count} objects, cannot drop schema."
            )));
        }
        self.adapter.delete_class(class).await?;
        self.invalidate_schema().await;
        Ok(())
    }

    /// The class a key redirects to: the relation target for relation
    /// fields, the class itself otherwise.
    pub async fn redirect_class_name_for_key(&self, class: &str, key: &str) -> Result<String> {
        let catalog = self.load_schema(None).await?;
        match catalog.get_expected_type(class, key) {
            Some(FieldType::Relation { target_class }) => Ok(target_class.clone()),
            _ => Ok(class.to_string()),
        }
    }

    /// Drop every class. Test support.
    pub async fn delete_everything(&self) -> Result<()> {
        self.adapter.delete_all_classes().await?;
        self.invalidate_schema().await;
        Ok(())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn untransform_for_output(
        &self,
        catalog: &SchemaCatalog,
        class: &str,
        row: &Value,
    ) -> Result<Value> {
        let mut public = untransform_object(catalog, class, row)?;
        if class == "_User" {
            if let Some(map) = public.as_object_mut() {
                map.remove("authData");
                map.remove("sessionToken");
            }
        }
        Ok(public)
    }
}

/// Keep only the fields the caller touched with atomic operators,
/// carrying their post-image values.
fn sanitize_database_result(original: &Value, post_image: &Value) -> Value {
    let mut response = Map::new();
    let (Some(original), Some(post_image)) = (original.as_object(), post_image.as_object())
    else {
        return Value::Object(response);
    };

    for (key, value) in original {
        let touched = matches!(
            op_tag(value),
            Some("Add") | Some("AddUnique") | Some("Remove") | Some("Increment")
        );
        if touched {
            if let Some(new_value) = post_image.get(key) {
                response.insert(key.clone(), new_value.clone());
            }
        }
    }
    Value::Object(response)
}

/// Whether a caller may introduce the object's new fields, per the
/// CLP's `addField` operation.
fn can_add_field(
    catalog: &SchemaCatalog,
    class: &str,
    object: &Value,
    acl_group: &[String],
) -> Result<()> {
    let Some(fields) = catalog.fields(class) else {
        return Ok(());
    };
    let empty = Map::new();
    let object_map = object.as_object().unwrap_or(&empty);
    let adds_fields = object_map.keys().any(|key| !fields.contains_key(key));
    if adds_fields {
        catalog.validate_permission(class, acl_group, "addField")?;
    }
    Ok(())
}

/// The field names a query constrains, through the logical combinators.
fn keys_for_query(query: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    collect_query_keys(query, &mut keys);
    keys
}

fn collect_query_keys(query: &Value, keys: &mut Vec<String>) {
    let Some(map) = query.as_object() else {
        return;
    };
    for (key, value) in map {
        if key == "$and" || key == "$or" {
            for clause in value.as_array().map(|v| v.as_slice()).unwrap_or_default() {
                collect_query_keys(clause, keys);
            }
        } else {
            keys.push(key.clone());
        }
    }
}

fn is_single_object_query(query: &Value) -> bool {
    query
        .as_object()
        .map(|map| {
            map.len() == 1
                && map
                    .get("objectId")
                    .and_then(Value::as_str)
                    .map(|id| !id.is_empty())
                    .unwrap_or(false)
        })
        .unwrap_or(false)
}

fn adapter_schema(class: &str) -> Value {
    json!({"className": class})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_for_query() {
        let query = json!({"key1": 1, "key2": {"$lt": 3}});
        let mut keys = keys_for_query(&query);
        keys.sort();
        assert_eq!(keys, vec!["key1", "key2"]);

        let query = json!({"$or": [{"a": 1}, {"$and": [{"b": 2}, {"c": 3}]}]});
        let mut keys = keys_for_query(&query);
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_object_query_detection() {
        assert!(is_single_object_query(&json!({"objectId": "a"})));
        assert!(!is_single_object_query(&json!({"objectId": ""})));
        assert!(!is_single_object_query(&json!({"objectId": "a", "k": 1})));
        assert!(!is_single_object_query(&json!({"k": 1})));
    }

    #[test]
    fn test_sanitize_database_result() {
        let original = json!({
            "score": {"__op": "Increment", "amount": 1},
            "tags": {"__op": "AddUnique", "objects": ["x"]},
            "title": "plain set",
        });
        let post_image = json!({"score": 4, "tags": ["x"], "title": "plain set"});
        let sanitized = sanitize_database_result(&original, &post_image);
        assert_eq!(sanitized, json!({"score": 4, "tags": ["x"]}));
    }
}

//! In-memory storage backend for testing and development.
//!
//! Evaluates the adapter-native query and update dialects directly
//! against JSON documents held under a `tokio` read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::{Error, FindOptions, Result, StorageAdapter};

/// Storage for a single class: its schema row, its documents, and any
/// unique indexes installed over it.
#[derive(Debug, Clone, Default)]
struct ClassData {
    schema: Value,
    objects: Vec<Map<String, Value>>,
    unique_indexes: Vec<Vec<String>>,
}

/// In-memory store implementation with full dialect support.
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<String, ClassData>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { data: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryBackend {
    async fn class_exists(&self, class: &str) -> Result<bool> {
        let data = self.data.read().await;
        Ok(data.contains_key(class))
    }

    async fn create_class(&self, class: &str, schema: &Value) -> Result<Value> {
        let mut data = self.data.write().await;
        if data.contains_key(class) {
            return Err(Error::DuplicateValue(format!("class {class} already exists")));
        }

        let mut schema = schema.clone();
        if let Some(map) = schema.as_object_mut() {
            map.insert("className".to_string(), Value::String(class.to_string()));
        }
        data.insert(
            class.to_string(),
            ClassData { schema: schema.clone(), ..ClassData::default() },
        );
        Ok(schema)
    }

    async fn add_field_if_not_exists(
        &self,
        class: &str,
        field: &str,
        field_type: &Value,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        let class_data = data.entry(class.to_string()).or_insert_with(|| ClassData {
            schema: json!({"className": class, "fields": {}}),
            ..ClassData::default()
        });

        let fields = schema_fields_mut(&mut class_data.schema);
        // Concurrent adds race benignly: present means done.
        if !fields.contains_key(field) {
            fields.insert(field.to_string(), field_type.clone());
        }
        Ok(())
    }

    async fn delete_class(&self, class: &str) -> Result<()> {
        let mut data = self.data.write().await;
        data.remove(class);
        Ok(())
    }

    async fn delete_all_classes(&self) -> Result<()> {
        let mut data = self.data.write().await;
        data.clear();
        Ok(())
    }

    async fn delete_fields(&self, class: &str, _schema: &Value, fields: &[String]) -> Result<()> {
        let mut data = self.data.write().await;
        let class_data = match data.get_mut(class) {
            Some(class_data) => class_data,
            None => return Ok(()),
        };

        let schema_fields = schema_fields_mut(&mut class_data.schema);
        for field in fields {
            schema_fields.remove(field);
        }
        for object in &mut class_data.objects {
            for field in fields {
                object.remove(field);
            }
        }
        Ok(())
    }

    async fn get_all_classes(&self) -> Result<Vec<Value>> {
        let data = self.data.read().await;
        let mut schemas: Vec<Value> = data.values().map(|cd| cd.schema.clone()).collect();
        schemas.sort_by_key(|s| {
            s.get("className").and_then(Value::as_str).unwrap_or_default().to_string()
        });
        Ok(schemas)
    }

    async fn get_class(&self, class: &str) -> Result<Option<Value>> {
        let data = self.data.read().await;
        Ok(data.get(class).map(|cd| cd.schema.clone()))
    }

    async fn create_object(&self, class: &str, _schema: &Value, object: &Value) -> Result<()> {
        let object = object
            .as_object()
            .ok_or_else(|| Error::InvalidJson("object must be a map".to_string()))?;

        let mut data = self.data.write().await;
        let class_data = data.entry(class.to_string()).or_insert_with(|| ClassData {
            schema: json!({"className": class, "fields": {}}),
            ..ClassData::default()
        });

        if let Some(id) = object.get("_id") {
            if class_data.objects.iter().any(|o| o.get("_id") == Some(id)) {
                return Err(Error::DuplicateValue(
                    "A duplicate value for a field with unique values was provided".to_string(),
                ));
            }
        }
        for index in &class_data.unique_indexes {
            let collides = class_data.objects.iter().any(|existing| {
                index.iter().all(|field| {
                    existing.get(field).is_some() && existing.get(field) == object.get(field)
                })
            });
            if collides {
                return Err(Error::DuplicateValue(
                    "A duplicate value for a field with unique values was provided".to_string(),
                ));
            }
        }

        class_data.objects.push(object.clone());
        Ok(())
    }

    async fn find(
        &self,
        class: &str,
        _schema: &Value,
        query: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let data = self.data.read().await;
        let class_data = match data.get(class) {
            Some(class_data) => class_data,
            // Unknown classes read as empty, not as errors.
            None => return Ok(Vec::new()),
        };

        let mut matches: Vec<Map<String, Value>> = Vec::new();
        for object in &class_data.objects {
            if matches_query(object, query)? {
                matches.push(object.clone());
            }
        }

        for sort_key in options.sort.iter().rev() {
            let (key, descending) = match sort_key.strip_prefix('-') {
                Some(key) => (key, true),
                None => (sort_key.as_str(), false),
            };
            matches.sort_by(|a, b| {
                let ordering = compare_values(a.get(key), b.get(key));
                if descending { ordering.reverse() } else { ordering }
            });
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let mut results: Vec<Value> =
            matches.into_iter().skip(skip).map(Value::Object).collect();
        if let Some(limit) = options.limit {
            results.truncate(limit as usize);
        }
        Ok(results)
    }

    async fn count(&self, class: &str, schema: &Value, query: &Value) -> Result<usize> {
        let results = self.find(class, schema, query, &FindOptions::default()).await?;
        Ok(results.len())
    }

    async fn update_objects_by_query(
        &self,
        class: &str,
        _schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        let class_data = match data.get_mut(class) {
            Some(class_data) => class_data,
            None => return Ok(()),
        };
        for object in &mut class_data.objects {
            if matches_query(object, query)? {
                apply_update(object, update)?;
            }
        }
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        class: &str,
        _schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<Option<Value>> {
        let mut data = self.data.write().await;
        let class_data = match data.get_mut(class) {
            Some(class_data) => class_data,
            None => return Ok(None),
        };
        for object in &mut class_data.objects {
            if matches_query(object, query)? {
                apply_update(object, update)?;
                return Ok(Some(Value::Object(object.clone())));
            }
        }
        Ok(None)
    }

    async fn upsert_one_object(
        &self,
        class: &str,
        schema: &Value,
        query: &Value,
        update: &Value,
    ) -> Result<()> {
        {
            let mut data = self.data.write().await;
            if let Some(class_data) = data.get_mut(class) {
                for object in &mut class_data.objects {
                    if matches_query(object, query)? {
                        apply_update(object, update)?;
                        return Ok(());
                    }
                }
            }
        }

        // Nothing matched: seed a document from the query's literal
        // equality fields and apply the update to it.
        let mut seed = Map::new();
        if let Some(query_map) = query.as_object() {
            for (key, value) in query_map {
                if !key.starts_with('$') && !value.is_object() {
                    seed.insert(key.clone(), value.clone());
                }
            }
        }
        apply_update(&mut seed, update)?;
        self.create_object(class, schema, &Value::Object(seed)).await
    }

    async fn delete_objects_by_query(
        &self,
        class: &str,
        _schema: &Value,
        query: &Value,
    ) -> Result<usize> {
        let mut data = self.data.write().await;
        let class_data = match data.get_mut(class) {
            Some(class_data) => class_data,
            None => return Ok(0),
        };

        let mut removed = 0;
        let mut kept = Vec::with_capacity(class_data.objects.len());
        for object in class_data.objects.drain(..) {
            if matches_query(&object, query)? {
                removed += 1;
            } else {
                kept.push(object);
            }
        }
        class_data.objects = kept;
        Ok(removed)
    }

    async fn ensure_uniqueness(
        &self,
        class: &str,
        _schema: &Value,
        fields: &[String],
    ) -> Result<()> {
        let mut data = self.data.write().await;
        let class_data = data.entry(class.to_string()).or_insert_with(|| ClassData {
            schema: json!({"className": class, "fields": {}}),
            ..ClassData::default()
        });
        let index: Vec<String> = fields.to_vec();
        if !class_data.unique_indexes.contains(&index) {
            class_data.unique_indexes.push(index);
        }
        Ok(())
    }

    async fn set_class_level_permissions(&self, class: &str, clp: &Value) -> Result<()> {
        let mut data = self.data.write().await;
        let class_data = data
            .get_mut(class)
            .ok_or_else(|| Error::Store("not found".to_string()))?;
        if let Some(map) = class_data.schema.as_object_mut() {
            map.insert("classLevelPermissions".to_string(), clp.clone());
        }
        Ok(())
    }

    async fn perform_initialization(&self, schemas: &[Value]) -> Result<()> {
        let mut data = self.data.write().await;
        for schema in schemas {
            let class = match schema.get("className").and_then(Value::as_str) {
                Some(class) => class.to_string(),
                None => continue,
            };
            data.entry(class)
                .or_insert_with(|| ClassData { schema: schema.clone(), ..ClassData::default() });
        }
        Ok(())
    }
}

// ============================================================================
// Query Evaluation
// ============================================================================

fn schema_fields_mut(schema: &mut Value) -> &mut Map<String, Value> {
    let map = schema
        .as_object_mut()
        .expect("stored schemas are always objects");
    map.entry("fields")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("schema fields are always an object")
}

/// Whether `object` satisfies the native `query`.
fn matches_query(object: &Map<String, Value>, query: &Value) -> Result<bool> {
    let query = match query.as_object() {
        Some(query) => query,
        None => return Ok(true),
    };

    for (key, constraint) in query {
        match key.as_str() {
            "$or" => {
                let branches = constraint.as_array().cloned().unwrap_or_default();
                let mut any = false;
                for branch in &branches {
                    if matches_query(object, branch)? {
                        any = true;
                        break;
                    }
                }
                if !any {
                    return Ok(false);
                }
            },
            "$and" => {
                let branches = constraint.as_array().cloned().unwrap_or_default();
                for branch in &branches {
                    if !matches_query(object, branch)? {
                        return Ok(false);
                    }
                }
            },
            _ => {
                if !matches_constraint(lookup_path(object, key), constraint)? {
                    return Ok(false);
                }
            },
        }
    }
    Ok(true)
}

/// Resolve a possibly dotted field path against a document.
fn lookup_path<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = object.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn matches_constraint(field: Option<&Value>, constraint: &Value) -> Result<bool> {
    let operators = match constraint.as_object() {
        Some(map) if map.keys().any(|k| k.starts_with('$')) => map,
        // Literal equality.
        _ => return Ok(equals(field, constraint)),
    };

    for (op, operand) in operators {
        let hit = match op.as_str() {
            "$lt" => compare_to(field, operand, std::cmp::Ordering::Less),
            "$lte" => !compare_to(field, operand, std::cmp::Ordering::Greater),
            "$gt" => compare_to(field, operand, std::cmp::Ordering::Greater),
            "$gte" => !compare_to(field, operand, std::cmp::Ordering::Less),
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$in" => {
                let candidates = operand.as_array().cloned().unwrap_or_default();
                candidates.iter().any(|candidate| {
                    if candidate.is_null() {
                        field.is_none() || field == Some(&Value::Null)
                    } else {
                        equals(field, candidate)
                    }
                })
            },
            "$nin" => {
                let candidates = operand.as_array().cloned().unwrap_or_default();
                !candidates.iter().any(|candidate| {
                    if candidate.is_null() {
                        field.is_none() || field == Some(&Value::Null)
                    } else {
                        equals(field, candidate)
                    }
                })
            },
            "$all" => match (field.and_then(Value::as_array), operand.as_array()) {
                (Some(values), Some(wanted)) => wanted.iter().all(|w| values.contains(w)),
                _ => false,
            },
            "$exists" => {
                let present = field.is_some() && field != Some(&Value::Null);
                present == operand.as_bool().unwrap_or(false)
            },
            "$regex" => matches_regex(field, operand, operators.get("$options"))?,
            // Consumed together with its operator.
            "$options" | "$maxDistance" => true,
            "$nearSphere" => matches_near_sphere(field, operand, operators.get("$maxDistance")),
            "$within" => matches_within(field, operand),
            other => {
                return Err(Error::InvalidJson(format!("invalid query operator: {other}")));
            },
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Document-store equality: arrays also match by containment.
fn equals(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => items.contains(target),
        Some(value) => value == target,
    }
}

fn compare_to(field: Option<&Value>, operand: &Value, wanted: std::cmp::Ordering) -> bool {
    match field {
        None => false,
        Some(value) => compare_values(Some(value), Some(operand)) == wanted,
    }
}

/// Total order over the scalar subset of the dialect. RFC 3339 strings
/// order chronologically under plain string comparison.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

fn matches_regex(field: Option<&Value>, pattern: &Value, options: Option<&Value>) -> Result<bool> {
    let text = match field.and_then(Value::as_str) {
        Some(text) => text,
        None => return Ok(false),
    };
    let pattern = pattern
        .as_str()
        .ok_or_else(|| Error::InvalidJson("bad $regex: not a string".to_string()))?;
    let case_insensitive = options
        .and_then(Value::as_str)
        .map(|opts| opts.contains('i'))
        .unwrap_or(false);

    let compiled = regex::RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| Error::InvalidJson(format!("bad $regex: {e}")))?;
    Ok(compiled.is_match(text))
}

/// Geopoints are stored as `[longitude, latitude]`; distances arrive in
/// radians and are measured on a 6371 km sphere.
fn matches_near_sphere(field: Option<&Value>, center: &Value, max_distance: Option<&Value>) -> bool {
    let (lng, lat) = match geo_pair(field) {
        Some(pair) => pair,
        None => return false,
    };
    let center = match center.as_object() {
        Some(center) => center,
        None => return false,
    };
    let (center_lng, center_lat) = match (
        center.get("longitude").and_then(Value::as_f64),
        center.get("latitude").and_then(Value::as_f64),
    ) {
        (Some(lng), Some(lat)) => (lng, lat),
        _ => return false,
    };

    let max_km = match max_distance.and_then(Value::as_f64) {
        Some(radians) => radians * 6371.0,
        None => return true,
    };
    haversine_km(lat, lng, center_lat, center_lng) <= max_km
}

fn matches_within(field: Option<&Value>, within: &Value) -> bool {
    let (lng, lat) = match geo_pair(field) {
        Some(pair) => pair,
        None => return false,
    };
    let geo_box = match within.as_object().and_then(|w| w.get("$box")).and_then(Value::as_array) {
        Some(geo_box) if geo_box.len() == 2 => geo_box,
        _ => return false,
    };
    let corner = |value: &Value| -> Option<(f64, f64)> {
        let map = value.as_object()?;
        Some((
            map.get("longitude")?.as_f64()?,
            map.get("latitude")?.as_f64()?,
        ))
    };
    match (corner(&geo_box[0]), corner(&geo_box[1])) {
        (Some((left, bottom)), Some((right, top))) => {
            lng >= left && lng <= right && lat >= bottom && lat <= top
        },
        _ => false,
    }
}

fn geo_pair(field: Option<&Value>) -> Option<(f64, f64)> {
    let items = field?.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_f64()?, items[1].as_f64()?))
}

fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1, lat2, lng2) = (
        lat1.to_radians(),
        lng1.to_radians(),
        lat2.to_radians(),
        lng2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * 6371.0 * a.sqrt().asin()
}

// ============================================================================
// Update Application
// ============================================================================

/// Apply a native operator-group update to a document.
fn apply_update(object: &mut Map<String, Value>, update: &Value) -> Result<()> {
    let update = match update.as_object() {
        Some(update) => update,
        None => return Ok(()),
    };

    for (group, entries) in update {
        let entries = match entries.as_object() {
            Some(entries) => entries,
            None => continue,
        };
        for (field, operand) in entries {
            match group.as_str() {
                "$set" => {
                    object.insert(field.clone(), operand.clone());
                },
                "$unset" => {
                    object.remove(field);
                },
                "$inc" => {
                    let current = object
                        .get(field)
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let amount = operand.as_f64().unwrap_or(0.0);
                    object.insert(field.clone(), json!(current + amount));
                },
                "$push" | "$addToSet" => {
                    let additions = operand
                        .as_object()
                        .and_then(|o| o.get("$each"))
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_else(|| vec![operand.clone()]);
                    let array = object
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = array {
                        for addition in additions {
                            if group == "$addToSet" && items.contains(&addition) {
                                continue;
                            }
                            items.push(addition);
                        }
                    }
                },
                "$pullAll" => {
                    let removals = operand.as_array().cloned().unwrap_or_default();
                    if let Some(Value::Array(items)) = object.get_mut(field) {
                        items.retain(|item| !removals.contains(item));
                    }
                },
                other => {
                    return Err(Error::InvalidJson(format!("invalid update operator: {other}")));
                },
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend_with_objects(class: &str, objects: Vec<Value>) -> MemoryBackend {
        let backend = MemoryBackend::new();
        let schema = json!({"className": class, "fields": {}});
        backend.create_class(class, &schema).await.unwrap();
        for object in objects {
            backend.create_object(class, &schema, &object).await.unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_find_with_operators() {
        let backend = MemoryBackend::new();
        let schema = json!({"className": "post", "fields": {}});
        backend.create_class("post", &schema).await.unwrap();
        for (id, score) in [("a", 1), ("b", 5), ("c", 9)] {
            backend
                .create_object("post", &schema, &json!({"_id": id, "score": score}))
                .await
                .unwrap();
        }

        let results = backend
            .find("post", &schema, &json!({"score": {"$gt": 1, "$lt": 9}}), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["_id"], "b");

        let results = backend
            .find("post", &schema, &json!({"_id": {"$in": ["a", "c"]}}), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit() {
        let backend = backend_with_objects(
            "post",
            vec![
                json!({"_id": "a", "score": 3}),
                json!({"_id": "b", "score": 1}),
                json!({"_id": "c", "score": 2}),
            ],
        ).await;
        let schema = json!({});

        let options = FindOptions {
            sort: vec!["-score".to_string()],
            skip: Some(1),
            limit: Some(1),
            ..FindOptions::default()
        };
        let results = backend.find("post", &schema, &json!({}), &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["_id"], "c");
    }

    #[tokio::test]
    async fn test_array_containment_equality() {
        let backend = backend_with_objects(
            "post",
            vec![json!({"_id": "a", "tags": ["x", "y"]})],
        ).await;
        let schema = json!({});

        let results = backend
            .find("post", &schema, &json!({"tags": "x"}), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let results = backend
            .find("post", &schema, &json!({"tags": {"$all": ["x", "y"]}}), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let results = backend
            .find("post", &schema, &json!({"tags": {"$all": ["x", "z"]}}), &FindOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_regex_with_options() {
        let backend = backend_with_objects(
            "post",
            vec![json!({"_id": "a", "title": "Hello World"})],
        ).await;
        let schema = json!({});

        let query = json!({"title": {"$regex": "^hello", "$options": "i"}});
        let results = backend.find("post", &schema, &query, &FindOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);

        let query = json!({"title": {"$regex": "^hello"}});
        let results = backend.find("post", &schema, &query, &FindOptions::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_near_sphere() {
        // Greenwich observatory and a point roughly 1 km away.
        let backend = backend_with_objects(
            "place",
            vec![json!({"_id": "a", "loc": [-0.0005, 51.4769]})],
        ).await;
        let schema = json!({});

        let near = json!({
            "loc": {
                "$nearSphere": {"longitude": -0.0005, "latitude": 51.4859},
                "$maxDistance": 2.0 / 6371.0,
            }
        });
        let results = backend.find("place", &schema, &near, &FindOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);

        let far = json!({
            "loc": {
                "$nearSphere": {"longitude": 10.0, "latitude": 10.0},
                "$maxDistance": 2.0 / 6371.0,
            }
        });
        let results = backend.find("place", &schema, &far, &FindOptions::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_update_operator_groups() {
        let backend = backend_with_objects(
            "post",
            vec![json!({"_id": "a", "score": 1, "tags": ["x"]})],
        ).await;
        let schema = json!({});

        let update = json!({
            "$inc": {"score": 2},
            "$addToSet": {"tags": {"$each": ["x", "y"]}},
            "$set": {"title": "hi"},
        });
        let result = backend
            .find_one_and_update("post", &schema, &json!({"_id": "a"}), &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["score"], json!(3.0));
        assert_eq!(result["tags"], json!(["x", "y"]));
        assert_eq!(result["title"], "hi");

        let update = json!({"$pullAll": {"tags": ["x"]}, "$unset": {"title": ""}});
        let result = backend
            .find_one_and_update("post", &schema, &json!({"_id": "a"}), &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["tags"], json!(["y"]));
        assert!(result.get("title").is_none());
    }

    #[tokio::test]
    async fn test_upsert_creates_when_missing() {
        let backend = MemoryBackend::new();
        let schema = json!({"className": "counter", "fields": {}});
        backend.create_class("counter", &schema).await.unwrap();

        backend
            .upsert_one_object(
                "counter",
                &schema,
                &json!({"_id": "hits"}),
                &json!({"$inc": {"value": 1}}),
            )
            .await
            .unwrap();
        let results = backend
            .find("counter", &schema, &json!({"_id": "hits"}), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["value"], json!(1.0));
    }

    #[tokio::test]
    async fn test_unique_index() {
        let backend = MemoryBackend::new();
        let schema = json!({"className": "_User", "fields": {}});
        backend.create_class("_User", &schema).await.unwrap();
        backend
            .ensure_uniqueness("_User", &schema, &["username".to_string()])
            .await
            .unwrap();

        backend
            .create_object("_User", &schema, &json!({"_id": "a", "username": "joe"}))
            .await
            .unwrap();
        let err = backend
            .create_object("_User", &schema, &json!({"_id": "b", "username": "joe"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateValue(_)));
    }

    #[tokio::test]
    async fn test_duplicate_class() {
        let backend = MemoryBackend::new();
        let schema = json!({"fields": {}});
        backend.create_class("post", &schema).await.unwrap();
        let err = backend.create_class("post", &schema).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateValue(_)));
    }

    #[tokio::test]
    async fn test_delete_fields_touches_documents() {
        let backend = backend_with_objects(
            "post",
            vec![json!({"_id": "a", "key": "hello", "key1": "world"})],
        ).await;
        let schema = json!({});
        backend
            .delete_fields("post", &schema, &["key".to_string()])
            .await
            .unwrap();
        let results = backend.find("post", &schema, &json!({}), &FindOptions::default()).await.unwrap();
        assert_eq!(results[0], json!({"_id": "a", "key1": "world"}));
    }
}

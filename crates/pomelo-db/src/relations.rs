//! The relation engine.
//!
//! Many-to-many relation fields live in auxiliary join tables named
//! `_Join:<field>:<owningClass>`, one `{owningId, relatedId}` row per
//! edge. This module rewrites relation constraints into object-id set
//! lookups before query execution and applies relation operators to the
//! join tables during writes.

use std::collections::BTreeSet;

use futures::future::BoxFuture;
use futures::FutureExt;
use pomelo_schema::{join_table_name, FieldType, SchemaCatalog};
use pomelo_store::StorageAdapter;
use pomelo_types::json::{get_array, get_str, op_tag};
use pomelo_types::wire::Pointer;
use pomelo_types::{Error, Result};
use serde_json::{json, Map, Value};

/// Rewrite every `$relatedTo` clause into an object-id constraint by
/// reading the join table. Recurses over `$or` branches.
pub fn reduce_relation_keys<'a>(
    adapter: &'a dyn StorageAdapter,
    class: &'a str,
    query: &'a mut Value,
) -> BoxFuture<'a, Result<()>> {
    async move {
        if let Some(branches) = query.get_mut("$or").and_then(Value::as_array_mut) {
            for branch in branches {
                reduce_relation_keys(adapter, class, branch).await?;
            }
            return Ok(());
        }

        let related_to = match query.get("$relatedTo").cloned() {
            Some(related_to) => related_to,
            None => return Ok(()),
        };
        let clause = related_to
            .as_object()
            .ok_or_else(|| Error::InvalidJson("improper usage of $relatedTo".to_string()))?;
        let key = get_str(clause, "key")
            .ok_or_else(|| Error::InvalidJson("improper usage of $relatedTo".to_string()))?;
        let object = clause
            .get("object")
            .and_then(|object| Pointer::from_value(object))
            .ok_or_else(|| Error::InvalidJson("improper usage of $relatedTo".to_string()))?;

        let ids = related_ids(adapter, &object.class_name, key, &object.object_id).await?;
        if let Some(map) = query.as_object_mut() {
            map.remove("$relatedTo");
        }
        add_in_object_ids(Some(ids), query);
        // A rewritten clause may have exposed another one.
        reduce_relation_keys(adapter, class, query).await
    }
    .boxed()
}

/// Rewrite constraints on relation-typed keys (`$in`, `$nin`, `$ne`,
/// `$eq`, bare pointer equality) into object-id constraints on the
/// current class by reading the join table backwards.
pub fn reduce_in_relation<'a>(
    adapter: &'a dyn StorageAdapter,
    catalog: &'a SchemaCatalog,
    class: &'a str,
    query: &'a mut Value,
) -> BoxFuture<'a, Result<()>> {
    async move {
        if let Some(branches) = query.get_mut("$or").and_then(Value::as_array_mut) {
            for branch in branches {
                reduce_in_relation(adapter, catalog, class, branch).await?;
            }
            return Ok(());
        }

        let keys: Vec<String> = query
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            let constraint = match query.get(&key) {
                Some(constraint) => constraint.clone(),
                None => continue,
            };
            let Some(constraints) = relation_constraints(&constraint) else {
                continue;
            };
            if !matches!(
                catalog.get_expected_type(class, &key),
                Some(FieldType::Relation { .. })
            ) {
                continue;
            }

            if let Some(map) = query.as_object_mut() {
                map.remove(&key);
            }
            for (related, negated) in constraints {
                let ids = owning_ids(adapter, class, &key, &related).await?;
                if negated {
                    add_not_in_object_ids(Some(ids), query);
                } else {
                    add_in_object_ids(Some(ids), query);
                }
            }
        }
        Ok(())
    }
    .boxed()
}

/// Extract the relation id-sets from a constraint value, if it carries
/// any. Each entry is `(related ids, negated)`.
fn relation_constraints(constraint: &Value) -> Option<Vec<(Vec<String>, bool)>> {
    let map = constraint.as_object()?;

    if map.get("__type").and_then(Value::as_str) == Some("Pointer") {
        let pointer = Pointer::from_value(constraint)?;
        return Some(vec![(vec![pointer.object_id], false)]);
    }

    let mut out = Vec::new();
    for (op, operand) in map {
        let negated = match op.as_str() {
            "$in" | "$eq" => false,
            "$nin" | "$ne" => true,
            _ => continue,
        };
        let ids = match operand {
            Value::Array(items) => items.iter().filter_map(pointer_id).collect(),
            single => pointer_id(single).into_iter().collect(),
        };
        out.push((ids, negated));
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn pointer_id(value: &Value) -> Option<String> {
    value
        .as_object()
        .and_then(|map| get_str(map, "objectId"))
        .map(str::to_string)
}

/// The related ids of one owning object, from `_Join:<key>:<class>`.
pub async fn related_ids(
    adapter: &dyn StorageAdapter,
    class: &str,
    key: &str,
    owning_id: &str,
) -> Result<Vec<String>> {
    let join = join_table_name(class, key);
    let rows = adapter
        .find(
            &join,
            &json!({"className": join.as_str()}),
            &json!({"owningId": owning_id}),
            &Default::default(),
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("relatedId").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// The owning ids whose relation contains any of the related ids, from
/// `_Join:<key>:<class>`.
pub async fn owning_ids(
    adapter: &dyn StorageAdapter,
    class: &str,
    key: &str,
    related_ids: &[String],
) -> Result<Vec<String>> {
    let join = join_table_name(class, key);
    let rows = adapter
        .find(
            &join,
            &json!({"className": join.as_str()}),
            &json!({"relatedId": {"$in": related_ids}}),
            &Default::default(),
        )
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("owningId").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Intersect the new ids with every id source already constraining
/// `objectId` (bare equality, `$eq`, `$in`) and write the result back
/// as `{"$in": ...}`.
pub fn add_in_object_ids(ids: Option<Vec<String>>, query: &mut Value) {
    let mut sources: Vec<Vec<String>> = Vec::new();

    match query.get("objectId") {
        Some(Value::String(id)) => sources.push(vec![id.clone()]),
        Some(Value::Object(constraint)) => {
            if let Some(id) = constraint.get("$eq").and_then(Value::as_str) {
                sources.push(vec![id.to_string()]);
            }
            if let Some(listed) = constraint.get("$in").and_then(Value::as_array) {
                sources.push(
                    listed
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                );
            }
        },
        _ => {},
    }
    if let Some(ids) = ids {
        sources.push(ids);
    }

    // Keep only ids that appear in every non-empty source.
    let sources: Vec<BTreeSet<String>> = sources
        .into_iter()
        .filter(|source| !source.is_empty())
        .map(|source| source.into_iter().collect())
        .collect();
    let intersection: Vec<String> = match sources.split_first() {
        Some((first, rest)) => first
            .iter()
            .filter(|id| rest.iter().all(|source| source.contains(*id)))
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    write_object_id_constraint(query, "$in", intersection);
}

/// Union the new ids with any existing `$nin` set and write the result
/// back as `{"$nin": ...}`.
pub fn add_not_in_object_ids(ids: Option<Vec<String>>, query: &mut Value) {
    let mut union: BTreeSet<String> = BTreeSet::new();
    if let Some(Value::Object(constraint)) = query.get("objectId") {
        if let Some(listed) = constraint.get("$nin").and_then(Value::as_array) {
            union.extend(listed.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    union.extend(ids.unwrap_or_default());

    write_object_id_constraint(query, "$nin", union.into_iter().collect());
}

fn write_object_id_constraint(query: &mut Value, op: &str, ids: Vec<String>) {
    let map = match query.as_object_mut() {
        Some(map) => map,
        None => return,
    };
    // Bare equality is folded into the id set; other operators on the
    // field survive.
    let mut constraint = match map.get("objectId") {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };
    constraint.insert(op.to_string(), json!(ids));
    map.insert("objectId".to_string(), Value::Object(constraint));
}

// ============================================================================
// Relation Update Application
// ============================================================================

/// Extract every relation operator from an update map and apply it to
/// the join tables. Non-relation entries stay in place.
pub async fn handle_relation_updates(
    adapter: &dyn StorageAdapter,
    class: &str,
    object_id: &str,
    update: &mut Value,
) -> Result<()> {
    let owning_id = update
        .get("objectId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(object_id)
        .to_string();

    let keys: Vec<String> = update
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    for key in keys {
        let value = match update.get(&key) {
            Some(value) => value.clone(),
            None => continue,
        };
        if apply_relation_op(adapter, class, &owning_id, &key, &value).await? {
            if let Some(map) = update.as_object_mut() {
                map.remove(&key);
            }
        }
    }
    Ok(())
}

/// Apply one value if it is a relation operator; returns whether it
/// was one.
fn apply_relation_op<'a>(
    adapter: &'a dyn StorageAdapter,
    class: &'a str,
    owning_id: &'a str,
    key: &'a str,
    value: &'a Value,
) -> BoxFuture<'a, Result<bool>> {
    async move {
        let Some(op) = op_tag(value) else {
            return Ok(false);
        };
        let map = value.as_object().expect("op_tag implies an object");

        match op {
            "AddRelation" | "RemoveRelation" => {
                let objects = get_array(map, "objects").cloned().unwrap_or_default();
                for object in &objects {
                    let Some(related_id) = pointer_id(object) else {
                        continue;
                    };
                    if op == "AddRelation" {
                        add_relation(adapter, class, key, owning_id, &related_id).await?;
                    } else {
                        remove_relation(adapter, class, key, owning_id, &related_id).await?;
                    }
                }
                Ok(true)
            },
            "Batch" => {
                let ops = get_array(map, "ops").cloned().unwrap_or_default();
                let mut any = false;
                for inner in &ops {
                    if apply_relation_op(adapter, class, owning_id, key, inner).await? {
                        any = true;
                    }
                }
                Ok(any)
            },
            _ => Ok(false),
        }
    }
    .boxed()
}

/// Insert an edge into `_Join:<key>:<class>`, idempotently.
async fn add_relation(
    adapter: &dyn StorageAdapter,
    class: &str,
    key: &str,
    owning_id: &str,
    related_id: &str,
) -> Result<()> {
    let join = join_table_name(class, key);
    let edge = json!({"owningId": owning_id, "relatedId": related_id});
    adapter
        .upsert_one_object(&join, &json!({"className": join.as_str()}), &edge, &json!({"$set": edge.clone()}))
        .await
}

/// Remove an edge from `_Join:<key>:<class>`. A missing edge is not an
/// error.
async fn remove_relation(
    adapter: &dyn StorageAdapter,
    class: &str,
    key: &str,
    owning_id: &str,
    related_id: &str,
) -> Result<()> {
    let join = join_table_name(class, key);
    let edge = json!({"owningId": owning_id, "relatedId": related_id});
    adapter
        .delete_objects_by_query(&join, &json!({"className": join.as_str()}), &edge)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_with_bare_equality() {
        let mut query = json!({"objectId": "a"});
        add_in_object_ids(Some(vec!["a".to_string(), "b".to_string()]), &mut query);
        assert_eq!(query, json!({"objectId": {"$in": ["a"]}}));
    }

    #[test]
    fn test_intersection_skips_empty_sources() {
        let mut query = json!({"objectId": {"$in": ["x"]}});
        add_in_object_ids(None, &mut query);
        assert_eq!(query, json!({"objectId": {"$in": ["x"]}}));
    }

    #[test]
    fn test_intersection_of_eq_in_and_new_ids() {
        let mut query = json!({"objectId": {"$eq": "a", "$in": ["a", "b"]}});
        add_in_object_ids(Some(vec!["a".to_string(), "c".to_string()]), &mut query);
        assert_eq!(query["objectId"]["$in"], json!(["a"]));
        // The equality source is consumed by the fold, $eq stays as a
        // stricter residue.
        assert_eq!(query["objectId"]["$eq"], json!("a"));
    }

    #[test]
    fn test_disjoint_sources_yield_empty_set() {
        let mut query = json!({"objectId": "a"});
        add_in_object_ids(Some(vec!["b".to_string()]), &mut query);
        assert_eq!(query, json!({"objectId": {"$in": []}}));
    }

    #[test]
    fn test_not_in_union() {
        let mut query = json!({"objectId": {"$nin": ["a"]}});
        add_not_in_object_ids(Some(vec!["b".to_string(), "a".to_string()]), &mut query);
        assert_eq!(query, json!({"objectId": {"$nin": ["a", "b"]}}));
    }

    #[test]
    fn test_not_in_on_fresh_query() {
        let mut query = json!({});
        add_not_in_object_ids(Some(vec!["x".to_string()]), &mut query);
        assert_eq!(query, json!({"objectId": {"$nin": ["x"]}}));
    }

    #[test]
    fn test_relation_constraint_extraction() {
        let pointer = json!({"__type": "Pointer", "className": "user", "objectId": "u1"});
        let extracted = relation_constraints(&pointer).unwrap();
        assert_eq!(extracted, vec![(vec!["u1".to_string()], false)]);

        let constraint = json!({"$in": [{"objectId": "a"}, {"objectId": "b"}]});
        let extracted = relation_constraints(&constraint).unwrap();
        assert_eq!(extracted, vec![(vec!["a".to_string(), "b".to_string()], false)]);

        let constraint = json!({"$ne": {"objectId": "a"}});
        let extracted = relation_constraints(&constraint).unwrap();
        assert_eq!(extracted, vec![(vec!["a".to_string()], true)]);

        assert!(relation_constraints(&json!({"$gt": 3})).is_none());
        assert!(relation_constraints(&json!("plain")).is_none());
    }
}

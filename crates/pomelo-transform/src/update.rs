//! Public update → adapter-native update.
//!
//! Each public value is a literal replacement, a `Delete`, or an atomic
//! operator; the native form groups them into `$set`, `$unset`, `$inc`,
//! `$push`, `$addToSet`, and `$pullAll`. Relation operators never reach
//! this layer; the controller applies them against join tables first.

use pomelo_schema::naming::field_name_is_valid;
use pomelo_types::acl::acl_to_perms;
use pomelo_types::{Error, Result, UpdateOperator};
use serde_json::{json, Map, Value};

use crate::query::{transform_atom, transform_key};

/// Rewrite a public update map into native operator groups.
pub fn transform_update(update: &Value, validate: bool) -> Result<Value> {
    let update_map = match update.as_object() {
        Some(map) => map,
        None => return Ok(json!({})),
    };

    let mut set = Map::new();
    let mut unset = Map::new();
    let mut inc = Map::new();
    let mut push = Map::new();
    let mut add_to_set = Map::new();
    let mut pull_all = Map::new();

    for (key, value) in update_map {
        if key == "ACL" {
            let (rperm, wperm) = acl_to_perms(value)?;
            set.insert("_rperm".to_string(), json!(rperm));
            set.insert("_wperm".to_string(), json!(wperm));
            continue;
        }
        let root = key.split('.').next().unwrap_or(key);
        if validate && !field_name_is_valid(root) {
            return Err(Error::InvalidKeyName(format!("Invalid key name: {key}")));
        }
        let native_key = transform_key(key);

        match UpdateOperator::from_value(value) {
            None => {
                validate_nested_keys(value)?;
                set.insert(native_key, transform_atom(value)?);
            },
            Some(Err(e)) => return Err(e),
            Some(Ok(op)) => match op {
                UpdateOperator::Delete => {
                    unset.insert(native_key, json!(""));
                },
                UpdateOperator::Increment { amount } => {
                    inc.insert(native_key, json!(amount));
                },
                UpdateOperator::Add { objects } => {
                    push.insert(native_key, json!({"$each": transform_items(&objects)?}));
                },
                UpdateOperator::AddUnique { objects } => {
                    add_to_set.insert(native_key, json!({"$each": transform_items(&objects)?}));
                },
                UpdateOperator::Remove { objects } => {
                    pull_all.insert(native_key, Value::Array(transform_items(&objects)?));
                },
                UpdateOperator::AddRelation { .. }
                | UpdateOperator::RemoveRelation { .. }
                | UpdateOperator::Batch { .. } => {
                    return Err(Error::IncorrectType(format!(
                        "unexpected relation op on field {key}"
                    )));
                },
            },
        }
    }

    let mut out = Map::new();
    for (group, entries) in [
        ("$set", set),
        ("$unset", unset),
        ("$inc", inc),
        ("$push", push),
        ("$addToSet", add_to_set),
        ("$pullAll", pull_all),
    ] {
        if !entries.is_empty() {
            out.insert(group.to_string(), Value::Object(entries));
        }
    }
    Ok(Value::Object(out))
}

/// Rewrite a public object into the native document inserted at create
/// time.
pub fn transform_create(data: &Value) -> Result<Value> {
    let data_map = match data.as_object() {
        Some(map) => map,
        None => return Ok(json!({})),
    };

    let mut out = Map::new();
    for (key, value) in data_map {
        if key == "ACL" {
            let (rperm, wperm) = acl_to_perms(value)?;
            out.insert("_rperm".to_string(), json!(rperm));
            out.insert("_wperm".to_string(), json!(wperm));
            continue;
        }
        validate_nested_keys(value)?;
        out.insert(transform_key(key), transform_atom(value)?);
    }
    Ok(Value::Object(out))
}

fn transform_items(items: &[Value]) -> Result<Vec<Value>> {
    items.iter().map(transform_atom).collect()
}

/// Nested keys must not smuggle operators or path separators into the
/// store.
fn validate_nested_keys(value: &Value) -> Result<()> {
    if let Some(map) = value.as_object() {
        for (key, nested) in map {
            validate_nested_keys(nested)?;
            if key == "__type" || key == "__op" {
                continue;
            }
            if key.contains('$') || key.contains('.') {
                return Err(Error::InvalidNestedKey(
                    "Nested keys should not contain the '$' or '.' characters".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_become_set() {
        let update = json!({"title": "hello", "score": 3});
        let native = transform_update(&update, false).unwrap();
        assert_eq!(native, json!({"$set": {"title": "hello", "score": 3}}));
    }

    #[test]
    fn test_operator_grouping() {
        let update = json!({
            "title": {"__op": "Delete"},
            "score": {"__op": "Increment", "amount": 2},
            "tags": {"__op": "AddUnique", "objects": ["a"]},
            "log": {"__op": "Add", "objects": ["x"]},
            "flags": {"__op": "Remove", "objects": ["y"]},
        });
        let native = transform_update(&update, false).unwrap();
        assert_eq!(native["$unset"], json!({"title": ""}));
        assert_eq!(native["$inc"], json!({"score": 2.0}));
        assert_eq!(native["$addToSet"], json!({"tags": {"$each": ["a"]}}));
        assert_eq!(native["$push"], json!({"log": {"$each": ["x"]}}));
        assert_eq!(native["$pullAll"], json!({"flags": ["y"]}));
    }

    #[test]
    fn test_acl_splits_into_perm_arrays() {
        let update = json!({
            "ACL": {"u1": {"read": true, "write": true}, "*": {"read": true}},
        });
        let native = transform_update(&update, false).unwrap();
        let rperm = native["$set"]["_rperm"].as_array().unwrap();
        assert!(rperm.contains(&json!("u1")) && rperm.contains(&json!("*")));
        assert_eq!(native["$set"]["_wperm"], json!(["u1"]));
    }

    #[test]
    fn test_relation_ops_are_rejected_here() {
        let update = json!({
            "likers": {"__op": "AddRelation", "objects": []},
        });
        assert!(transform_update(&update, false).is_err());
    }

    #[test]
    fn test_create_renames_object_id() {
        let data = json!({
            "objectId": "1024",
            "owner": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
        });
        let native = transform_create(&data).unwrap();
        assert_eq!(native, json!({"_id": "1024", "owner": "u1"}));
    }

    #[test]
    fn test_nested_keys_are_validated() {
        let data = json!({"settings": {"a.b": 1}});
        let err = transform_create(&data).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidNestedKey(
                "Nested keys should not contain the '$' or '.' characters".into()
            )
        );

        let data = json!({"settings": {"$gt": 1}});
        assert!(transform_create(&data).is_err());
    }

    #[test]
    fn test_unknown_op_surfaces() {
        let update = json!({"key": {"__op": "Other"}});
        let err = transform_update(&update, false).unwrap_err();
        assert_eq!(err, Error::IncorrectType("unexpected op: Other".into()));
    }
}

//! Public query → adapter-native query.
//!
//! The transform is compositional: a top-level map rewrites key by key,
//! and the logical combinators recurse per clause. `$relatedTo` never
//! reaches this layer; the relation engine rewrites it into object-id
//! constraints first.

use pomelo_schema::naming::field_name_is_valid;
use pomelo_types::json::type_tag;
use pomelo_types::wire::{date_from_value, GeoPoint, Pointer};
use pomelo_types::{Error, Result};
use serde_json::{json, Map, Value};

use crate::regex_literal::{process_regex_pattern, remove_whitespace};

/// Rewrite a public key into its storage-internal name.
pub fn transform_key(key: &str) -> String {
    match key {
        "objectId" => "_id".to_string(),
        other => other.to_string(),
    }
}

/// Rewrite a public query into its adapter-native form.
///
/// With `validate` set, keys must be well-formed field names; without
/// it, unknown shapes pass through for internal callers.
pub fn transform_where(query: &Value, validate: bool) -> Result<Value> {
    let query_map = match query.as_object() {
        Some(map) => map,
        None => return Ok(json!({})),
    };

    let mut out = Map::new();
    for (key, value) in query_map {
        match key.as_str() {
            "$or" | "$and" => {
                let clauses = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidJson(format!("bad {key} format")))?;
                let mut transformed = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    transformed.push(transform_where(clause, validate)?);
                }
                out.insert(key.clone(), Value::Array(transformed));
            },
            "$relatedTo" => {
                return Err(Error::InvalidJson(
                    "improper usage of $relatedTo".to_string(),
                ));
            },
            "ACL" => {
                return Err(Error::InvalidKeyName("Cannot query on ACL.".to_string()));
            },
            _ => {
                let root = key.split('.').next().unwrap_or(key);
                if validate && !field_name_is_valid(root) {
                    return Err(Error::InvalidKeyName(format!("Invalid key name: {key}")));
                }
                out.insert(transform_key(key), transform_constraint(value)?);
            },
        }
    }
    Ok(Value::Object(out))
}

/// Rewrite one constraint value.
fn transform_constraint(value: &Value) -> Result<Value> {
    let operators = match value.as_object() {
        Some(map) if map.keys().any(|k| k.starts_with('$')) => map,
        _ => return transform_atom(value),
    };

    let mut out = Map::new();
    for (op, operand) in operators {
        match op.as_str() {
            "$lt" | "$lte" | "$gt" | "$gte" | "$ne" | "$eq" => {
                out.insert(op.clone(), transform_atom(operand)?);
            },
            "$in" | "$nin" | "$all" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| Error::InvalidJson(format!("bad {op} value")))?;
                let mut transformed = Vec::with_capacity(items.len());
                for item in items {
                    transformed.push(transform_atom(item)?);
                }
                out.insert(op.clone(), Value::Array(transformed));
            },
            "$exists" => {
                let flag = operand
                    .as_bool()
                    .ok_or_else(|| Error::InvalidJson("bad $exists value".to_string()))?;
                out.insert(op.clone(), Value::Bool(flag));
            },
            "$regex" => {
                // Handled below, together with its options.
            },
            "$options" => {
                let opts = operand.as_str().unwrap_or_default();
                if !operators.contains_key("$regex") || opts.chars().any(|c| !"imxs".contains(c)) {
                    return Err(Error::InvalidJson(format!(
                        "bad $options value for query: {opts}"
                    )));
                }
            },
            "$maxDistance" => {
                let distance = operand
                    .as_f64()
                    .ok_or_else(|| Error::InvalidJson("bad $maxDistance value".to_string()))?;
                out.insert(op.clone(), json!(distance));
            },
            "$nearSphere" => {
                let point = GeoPoint::from_value(operand).ok_or_else(|| {
                    Error::InvalidJson("bad $nearSphere value".to_string())
                })?;
                out.insert(
                    op.clone(),
                    json!({"longitude": point.longitude, "latitude": point.latitude}),
                );
            },
            "$within" => {
                let corners = operand
                    .as_object()
                    .and_then(|w| w.get("$box"))
                    .and_then(Value::as_array)
                    .filter(|b| b.len() == 2)
                    .ok_or_else(|| Error::InvalidJson("malformatted $within arg".to_string()))?;
                let corner = |value: &Value| -> Result<Value> {
                    let point = GeoPoint::from_value(value).ok_or_else(|| {
                        Error::InvalidJson("malformatted $within arg".to_string())
                    })?;
                    Ok(json!({"longitude": point.longitude, "latitude": point.latitude}))
                };
                out.insert(
                    op.clone(),
                    json!({"$box": [corner(&corners[0])?, corner(&corners[1])?]}),
                );
            },
            other => {
                return Err(Error::InvalidJson(format!("bad constraint: {other}")));
            },
        }
    }

    if let Some(pattern) = operators.get("$regex") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| Error::InvalidJson("bad $regex: not a string".to_string()))?;
        let opts = operators
            .get("$options")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut pattern = pattern.to_string();
        if opts.contains('x') {
            pattern = remove_whitespace(&pattern);
        }
        out.insert("$regex".to_string(), json!(process_regex_pattern(&pattern)));
        // Extended mode is consumed here; the store only sees `i`.
        let passthrough: String = opts.chars().filter(|c| "ims".contains(*c)).collect();
        if !passthrough.is_empty() {
            out.insert("$options".to_string(), json!(passthrough));
        }
    }

    Ok(Value::Object(out))
}

/// Rewrite a literal value: pointers and dates unwrap, geopoints become
/// coordinate pairs, bytes and files become their payloads.
pub fn transform_atom(value: &Value) -> Result<Value> {
    match type_tag(value) {
        Some("Pointer") => {
            let pointer = Pointer::from_value(value).ok_or_else(|| {
                Error::IncorrectType("This is not a valid Pointer".to_string())
            })?;
            Ok(Value::String(pointer.object_id))
        },
        Some("Date") => {
            let parsed = date_from_value(value).ok_or_else(|| {
                Error::InvalidJson("invalid date value".to_string())
            })?;
            Ok(json!(parsed.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)))
        },
        Some("GeoPoint") => {
            let point = GeoPoint::from_value(value).ok_or_else(|| {
                Error::IncorrectType("This is not a valid GeoPoint".to_string())
            })?;
            Ok(json!([point.longitude, point.latitude]))
        },
        Some("Bytes") => {
            let payload = value
                .as_object()
                .and_then(|m| m.get("base64"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::IncorrectType("This is not a valid Bytes".to_string()))?;
            Ok(json!(payload))
        },
        Some("File") => {
            let name = value
                .as_object()
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::IncorrectType("This is not a valid File".to_string()))?;
            Ok(json!(name))
        },
        _ => match value {
            Value::Array(items) => {
                let mut transformed = Vec::with_capacity(items.len());
                for item in items {
                    transformed.push(transform_atom(item)?);
                }
                Ok(Value::Array(transformed))
            },
            other => Ok(other.clone()),
        },
    }
}

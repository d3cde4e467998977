//! Schema type inference over public JSON values.
//!
//! Given any value of the public dialect, determine the field type it
//! implies, or report that it implies none (a `Delete` op) or that it
//! has no valid type at all.

use pomelo_types::json::{get_array, get_str};
use pomelo_types::{Error, FieldType, Result};
use serde_json::Value;

/// Infer the schema type a value implies.
///
/// `Ok(None)` means the value removes the field (`{"__op": "Delete"}`).
pub fn infer_type(value: &Value) -> Result<Option<FieldType>> {
    match value {
        Value::Bool(_) => Ok(Some(FieldType::Boolean)),
        Value::String(_) => Ok(Some(FieldType::String)),
        Value::Number(_) => Ok(Some(FieldType::Number)),
        Value::Array(_) => Ok(Some(FieldType::Array)),
        Value::Object(map) => infer_object_type(map),
        Value::Null => Err(Error::IncorrectType("bad obj. can not get type".to_string())),
    }
}

fn infer_object_type(map: &serde_json::Map<String, Value>) -> Result<Option<FieldType>> {
    if let Some(tag) = get_str(map, "__type") {
        let not_valid = || Error::IncorrectType(format!("This is not a valid {tag}"));
        return match tag {
            "Date" => Ok(Some(FieldType::Date)),
            "File" => Ok(Some(FieldType::File)),
            "GeoPoint" => Ok(Some(FieldType::GeoPoint)),
            "Bytes" => Ok(Some(FieldType::Bytes)),
            "Pointer" => match get_str(map, "className") {
                Some(class) => Ok(Some(FieldType::Pointer { target_class: class.to_string() })),
                None => Err(not_valid()),
            },
            "Relation" => match get_str(map, "className") {
                Some(class) => Ok(Some(FieldType::Relation { target_class: class.to_string() })),
                None => Err(not_valid()),
            },
            _ => Err(not_valid()),
        };
    }

    if let Some(op) = get_str(map, "__op") {
        return match op {
            "Increment" => Ok(Some(FieldType::Number)),
            "Delete" => Ok(None),
            "Add" | "AddUnique" | "Remove" => Ok(Some(FieldType::Array)),
            "AddRelation" | "RemoveRelation" => {
                let target = get_array(map, "objects")
                    .and_then(|objects| objects.first())
                    .and_then(|first| first.as_object())
                    .and_then(|first| get_str(first, "className"));
                match target {
                    Some(class) => {
                        Ok(Some(FieldType::Relation { target_class: class.to_string() }))
                    },
                    None => Err(Error::IncorrectType(format!("This is not a valid {op}"))),
                }
            },
            "Batch" => {
                let first = get_array(map, "ops").and_then(|ops| ops.first());
                match first {
                    Some(first) => infer_type(first),
                    None => Err(Error::IncorrectType(format!("unexpected op: {op}"))),
                }
            },
            other => Err(Error::IncorrectType(format!("unexpected op: {other}"))),
        };
    }

    // A query-operator wrapper infers from the wrapped value.
    for wrapper in ["$ne", "$eq"] {
        if let Some(inner) = map.get(wrapper) {
            return infer_type(inner);
        }
    }

    Ok(Some(FieldType::Object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(infer_type(&json!(true)).unwrap(), Some(FieldType::Boolean));
        assert_eq!(infer_type(&json!("hello")).unwrap(), Some(FieldType::String));
        assert_eq!(infer_type(&json!(1024)).unwrap(), Some(FieldType::Number));
        assert_eq!(infer_type(&json!(10.24)).unwrap(), Some(FieldType::Number));
        assert_eq!(infer_type(&json!([1, 2, 3])).unwrap(), Some(FieldType::Array));
    }

    #[test]
    fn test_null_has_no_type() {
        assert_eq!(
            infer_type(&Value::Null),
            Err(Error::IncorrectType("bad obj. can not get type".into()))
        );
    }

    #[test]
    fn test_tagged_values() {
        assert_eq!(
            infer_type(&json!({"__type": "Date", "iso": "abc"})).unwrap(),
            Some(FieldType::Date)
        );
        assert_eq!(
            infer_type(&json!({"__type": "File", "name": "abc"})).unwrap(),
            Some(FieldType::File)
        );
        assert_eq!(
            infer_type(&json!({"__type": "GeoPoint", "latitude": 10, "longitude": 10})).unwrap(),
            Some(FieldType::GeoPoint)
        );
        assert_eq!(
            infer_type(&json!({"__type": "Bytes", "base64": "abc"})).unwrap(),
            Some(FieldType::Bytes)
        );
        assert_eq!(
            infer_type(&json!({"__type": "Pointer", "className": "abc"})).unwrap(),
            Some(FieldType::Pointer { target_class: "abc".into() })
        );
        assert_eq!(
            infer_type(&json!({"__type": "Relation", "className": "abc"})).unwrap(),
            Some(FieldType::Relation { target_class: "abc".into() })
        );
    }

    #[test]
    fn test_invalid_tags() {
        assert_eq!(
            infer_type(&json!({"__type": "Other"})),
            Err(Error::IncorrectType("This is not a valid Other".into()))
        );
        assert_eq!(
            infer_type(&json!({"__type": "Pointer"})),
            Err(Error::IncorrectType("This is not a valid Pointer".into()))
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            infer_type(&json!({"__op": "Increment"})).unwrap(),
            Some(FieldType::Number)
        );
        assert_eq!(infer_type(&json!({"__op": "Delete"})).unwrap(), None);
        for op in ["Add", "AddUnique", "Remove"] {
            assert_eq!(
                infer_type(&json!({"__op": op})).unwrap(),
                Some(FieldType::Array),
                "{op}"
            );
        }
        assert_eq!(
            infer_type(&json!({
                "__op": "AddRelation",
                "objects": [{"className": "abc"}],
            }))
            .unwrap(),
            Some(FieldType::Relation { target_class: "abc".into() })
        );
        assert_eq!(
            infer_type(&json!({
                "__op": "Batch",
                "ops": [{"__type": "File", "name": "abc"}],
            }))
            .unwrap(),
            Some(FieldType::File)
        );
        assert_eq!(
            infer_type(&json!({"__op": "Other"})),
            Err(Error::IncorrectType("unexpected op: Other".into()))
        );
    }

    #[test]
    fn test_query_operator_wrapper() {
        assert_eq!(
            infer_type(&json!({"$ne": {"__type": "Pointer", "className": "abc"}})).unwrap(),
            Some(FieldType::Pointer { target_class: "abc".into() })
        );
    }

    #[test]
    fn test_plain_object() {
        assert_eq!(
            infer_type(&json!({"key": "value"})).unwrap(),
            Some(FieldType::Object)
        );
    }
}

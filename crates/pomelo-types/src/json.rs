//! Narrow accessors for untyped JSON trees.
//!
//! The public dialect and the adapter-native dialect both travel as
//! `serde_json::Value`; these helpers keep the call sites free of
//! repeated `as_object`/`as_str` chains.

use serde_json::{Map, Value};

/// The object behind `value`, if it is one.
pub fn as_object(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// `value[key]` as a string slice.
pub fn get_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// `value[key]` as an object.
pub fn get_object<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

/// `value[key]` as an array.
pub fn get_array<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    map.get(key).and_then(Value::as_array)
}

/// The `__type` tag of a value, if it is a tagged object.
pub fn type_tag(value: &Value) -> Option<&str> {
    value.as_object().and_then(|m| get_str(m, "__type"))
}

/// The `__op` tag of a value, if it is an operator object.
pub fn op_tag(value: &Value) -> Option<&str> {
    value.as_object().and_then(|m| get_str(m, "__op"))
}

/// Collect the string elements of an array value, skipping non-strings.
pub fn string_items(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

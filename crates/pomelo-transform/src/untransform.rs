//! Adapter-native result → public JSON.
//!
//! Every returned document is rewritten by schema type: the primary key
//! becomes `objectId`, stored scalars re-wrap into their tagged forms,
//! the permission arrays fold back into `ACL`, and relation fields
//! surface as relation stubs. Credential storage never surfaces.

use pomelo_schema::SchemaCatalog;
use pomelo_types::acl::perms_to_acl;
use pomelo_types::json::string_items;
use pomelo_types::wire::{bytes_value, date_value, file_value};
use pomelo_types::{FieldType, Result};
use serde_json::{json, Map, Value};

/// Rewrite one native document into its public shape.
pub fn untransform_object(catalog: &SchemaCatalog, class: &str, object: &Value) -> Result<Value> {
    let object_map = match object.as_object() {
        Some(map) => map,
        None => return Ok(json!({})),
    };

    let mut out = Map::new();
    let mut rperm: Option<Vec<String>> = None;
    let mut wperm: Option<Vec<String>> = None;

    for (key, value) in object_map {
        match key.as_str() {
            "_id" => {
                out.insert("objectId".to_string(), value.clone());
            },
            "_rperm" => rperm = Some(string_items(value)),
            "_wperm" => wperm = Some(string_items(value)),
            // Credential storage stays inside the store.
            "_hashed_password" => {},
            // The server timestamps stay bare ISO strings on the wire.
            "createdAt" | "updatedAt" => {
                out.insert(key.clone(), value.clone());
            },
            _ => {
                let rewrapped = match catalog.get_expected_type(class, key) {
                    Some(FieldType::Date) => value
                        .as_str()
                        .map(date_value)
                        .unwrap_or_else(|| value.clone()),
                    Some(FieldType::File) => value
                        .as_str()
                        .map(file_value)
                        .unwrap_or_else(|| value.clone()),
                    Some(FieldType::Bytes) => value
                        .as_str()
                        .map(bytes_value)
                        .unwrap_or_else(|| value.clone()),
                    Some(FieldType::Pointer { target_class }) => match value.as_str() {
                        Some(id) => json!({
                            "__type": "Pointer",
                            "className": target_class,
                            "objectId": id,
                        }),
                        None => value.clone(),
                    },
                    Some(FieldType::GeoPoint) => match geo_pair(value) {
                        Some((longitude, latitude)) => json!({
                            "__type": "GeoPoint",
                            "latitude": latitude,
                            "longitude": longitude,
                        }),
                        None => value.clone(),
                    },
                    // Relation stubs come from the schema below.
                    Some(FieldType::Relation { .. }) => continue,
                    _ => value.clone(),
                };
                out.insert(key.clone(), rewrapped);
            },
        }
    }

    if rperm.is_some() || wperm.is_some() {
        out.insert(
            "ACL".to_string(),
            perms_to_acl(&rperm.unwrap_or_default(), &wperm.unwrap_or_default()),
        );
    }

    if let Some(fields) = catalog.fields(class) {
        for (name, field_type) in fields {
            if let FieldType::Relation { target_class } = field_type {
                out.insert(
                    name.clone(),
                    json!({"__type": "Relation", "className": target_class}),
                );
            }
        }
    }

    Ok(Value::Object(out))
}

fn geo_pair(value: &Value) -> Option<(f64, f64)> {
    let items = value.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_f64()?, items[1].as_f64()?))
}

//! Class-level permissions.
//!
//! A CLP maps an operation to a set of principals granted it. The
//! auxiliary `readUserFields`/`writeUserFields` entries list
//! `Pointer<_User>` fields whose values act as per-row principals.

use std::sync::LazyLock;

use pomelo_types::{Error, FieldType, Result};
use regex::Regex;
use serde_json::{json, Value};

/// Operations a CLP may mention.
pub const CLP_OPERATIONS: &[&str] = &[
    "find",
    "get",
    "count",
    "create",
    "update",
    "delete",
    "addField",
    "readUserFields",
    "writeUserFields",
];

/// Operations granted to `*` on a freshly created class.
const DEFAULT_CLP_OPERATIONS: &[&str] = &["find", "get", "create", "update", "delete", "addField"];

static PERMISSION_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*|[a-zA-Z0-9]{10,}|role:.+|requiresAuthentication)$")
        .expect("static pattern compiles")
});

/// The CLP every new class starts with: everything public.
pub fn default_clp() -> Value {
    let mut clp = serde_json::Map::new();
    for op in DEFAULT_CLP_OPERATIONS {
        clp.insert(op.to_string(), json!({"*": true}));
    }
    Value::Object(clp)
}

/// Overlay submitted permissions onto the public defaults.
///
/// A submitted operation replaces the default wholesale; an omitted one
/// stays public. `count` and the pointer-permission lists only appear
/// when submitted.
pub fn merge_with_defaults(perms: &Value) -> Value {
    let submitted = perms.as_object().cloned().unwrap_or_default();
    let mut merged = serde_json::Map::new();
    for op in DEFAULT_CLP_OPERATIONS {
        let entry = submitted.get(*op).cloned().unwrap_or_else(|| json!({"*": true}));
        merged.insert(op.to_string(), entry);
    }
    for extra in ["count", "readUserFields", "writeUserFields"] {
        if let Some(entry) = submitted.get(extra) {
            merged.insert(extra.to_string(), entry.clone());
        }
    }
    Value::Object(merged)
}

/// Validate a submitted CLP against the class's fields.
pub fn validate_clp(perms: &Value, fields: &Value) -> Result<()> {
    let perms = match perms.as_object() {
        Some(perms) => perms,
        None => return Ok(()),
    };

    for (operation, entry) in perms {
        if !CLP_OPERATIONS.contains(&operation.as_str()) {
            return Err(Error::InvalidJson(format!(
                "{operation} is not a valid operation for class level permissions"
            )));
        }

        if operation == "readUserFields" || operation == "writeUserFields" {
            let listed = match entry.as_array() {
                Some(listed) => listed,
                None => {
                    return Err(Error::InvalidJson(format!(
                        "this perms[operation] is not a valid value for class level permissions {operation}"
                    )))
                },
            };
            for field in listed {
                let field = field.as_str().unwrap_or_default();
                if !points_at_user(fields, field) {
                    return Err(Error::InvalidJson(format!(
                        "{field} is not a valid column for class level pointer permissions {operation}"
                    )));
                }
            }
            continue;
        }

        let entry = match entry.as_object() {
            Some(entry) => entry,
            None => {
                return Err(Error::InvalidJson(format!(
                    "this perms[operation] is not a valid value for class level permissions {operation}"
                )))
            },
        };
        for (key, granted) in entry {
            verify_permission_key(key)?;
            match granted {
                Value::Bool(true) => {},
                Value::Bool(false) => {
                    return Err(Error::InvalidJson(format!(
                        "false is not a valid value for class level permissions {operation}:{key}:false"
                    )));
                },
                _ => {
                    return Err(Error::InvalidJson(format!(
                        "this perm is not a valid value for class level permissions {operation}:{key}:perm"
                    )));
                },
            }
        }
    }
    Ok(())
}

/// Validate a single CLP principal key.
pub fn verify_permission_key(key: &str) -> Result<()> {
    if PERMISSION_KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(Error::InvalidJson(format!(
            "{key} is not a valid key for class level permissions"
        )))
    }
}

fn points_at_user(fields: &Value, field: &str) -> bool {
    let Some(spec) = fields.as_object().and_then(|f| f.get(field)) else {
        return false;
    };
    matches!(
        FieldType::from_json(spec),
        Ok(FieldType::Pointer { target_class }) if target_class == "_User"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_clp_is_valid() {
        assert!(validate_clp(&Value::Null, &Value::Null).is_ok());
        assert!(validate_clp(&json!({}), &Value::Null).is_ok());
    }

    #[test]
    fn test_every_operation_accepts_a_user_id() {
        for op in ["get", "find", "count", "create", "update", "delete", "addField"] {
            let perms = json!({op: {"012345678901234567890123": true}});
            assert!(validate_clp(&perms, &Value::Null).is_ok(), "{op}");
        }
    }

    #[test]
    fn test_unknown_operation() {
        let perms = json!({"other": {"012345678901234567890123": true}});
        assert_eq!(
            validate_clp(&perms, &Value::Null),
            Err(Error::InvalidJson(
                "other is not a valid operation for class level permissions".into()
            ))
        );
    }

    #[test]
    fn test_pointer_permissions() {
        let fields = json!({
            "key1": {"type": "Pointer", "targetClass": "_User"},
            "key2": {"type": "Pointer", "targetClass": "_User"},
        });
        for op in ["readUserFields", "writeUserFields"] {
            let perms = json!({op: ["key1", "key2"]});
            assert!(validate_clp(&perms, &fields).is_ok(), "{op}");
        }
    }

    #[test]
    fn test_pointer_permissions_rejections() {
        let perms = json!({"readUserFields": "hello"});
        assert_eq!(
            validate_clp(&perms, &Value::Null),
            Err(Error::InvalidJson(
                "this perms[operation] is not a valid value for class level permissions readUserFields".into()
            ))
        );

        let perms = json!({"readUserFields": ["key1", "key2"]});
        let expected = Err(Error::InvalidJson(
            "key1 is not a valid column for class level pointer permissions readUserFields".into(),
        ));
        assert_eq!(validate_clp(&perms, &Value::Null), expected);
        assert_eq!(validate_clp(&perms, &json!({})), expected);
        assert_eq!(validate_clp(&perms, &json!({"key1": 1024})), expected);
        assert_eq!(validate_clp(&perms, &json!({"key1": {"type": "Other"}})), expected);
    }

    #[test]
    fn test_principal_keys() {
        assert!(verify_permission_key("0123456789abcdefghij0123").is_ok());
        assert!(verify_permission_key("role:1024").is_ok());
        assert!(verify_permission_key("role:*abc").is_ok());
        assert!(verify_permission_key("*").is_ok());
        assert!(verify_permission_key("requiresAuthentication").is_ok());

        for key in ["abcd", "*abc", "@mail"] {
            assert_eq!(
                verify_permission_key(key),
                Err(Error::InvalidJson(format!(
                    "{key} is not a valid key for class level permissions"
                )))
            );
        }
    }

    #[test]
    fn test_principal_values() {
        let perms = json!({"get": {"abc": true}});
        assert_eq!(
            validate_clp(&perms, &Value::Null),
            Err(Error::InvalidJson("abc is not a valid key for class level permissions".into()))
        );

        let perms = json!({"get": {"role:abc": false}});
        assert_eq!(
            validate_clp(&perms, &Value::Null),
            Err(Error::InvalidJson(
                "false is not a valid value for class level permissions get:role:abc:false".into()
            ))
        );

        let perms = json!({"get": {"role:abc": "hello"}});
        assert_eq!(
            validate_clp(&perms, &Value::Null),
            Err(Error::InvalidJson(
                "this perm is not a valid value for class level permissions get:role:abc:perm".into()
            ))
        );
    }

    #[test]
    fn test_merge_with_defaults() {
        let merged = merge_with_defaults(&json!({"get": {"*": true}}));
        assert_eq!(merged, default_clp());

        let merged = merge_with_defaults(&json!({"get": {"role:admin": true}}));
        assert_eq!(merged["get"], json!({"role:admin": true}));
        assert_eq!(merged["find"], json!({"*": true}));
        assert!(merged.get("count").is_none());
    }
}

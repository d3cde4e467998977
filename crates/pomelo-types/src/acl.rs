//! Per-row access lists.
//!
//! The public shape is a map from principal to `{read, write}` flags:
//!
//! ```json
//! {"8TOXdXf3tz": {"read": true, "write": true}, "*": {"read": true}}
//! ```
//!
//! The stored shape is a pair of principal arrays, `_rperm` and
//! `_wperm`. A record without `_rperm`/`_wperm` is publicly accessible.

use serde_json::{json, Value};

use crate::{Error, Result};

/// Split a public `ACL` object into `(_rperm, _wperm)` arrays.
pub fn acl_to_perms(acl: &Value) -> Result<(Vec<String>, Vec<String>)> {
    let map = acl
        .as_object()
        .ok_or_else(|| Error::InvalidJson("invalid ACL format".to_string()))?;

    let mut rperm = Vec::new();
    let mut wperm = Vec::new();
    for (principal, flags) in map {
        let flags = flags
            .as_object()
            .ok_or_else(|| Error::InvalidJson("invalid ACL format".to_string()))?;
        if flags.get("read").and_then(Value::as_bool) == Some(true) {
            rperm.push(principal.clone());
        }
        if flags.get("write").and_then(Value::as_bool) == Some(true) {
            wperm.push(principal.clone());
        }
    }
    Ok((rperm, wperm))
}

/// Fold `_rperm`/`_wperm` arrays back into the public `ACL` object.
pub fn perms_to_acl(rperm: &[String], wperm: &[String]) -> Value {
    let mut acl = serde_json::Map::new();
    for principal in rperm {
        acl.insert(principal.clone(), json!({"read": true}));
    }
    for principal in wperm {
        match acl.get_mut(principal) {
            Some(Value::Object(flags)) => {
                flags.insert("write".to_string(), Value::Bool(true));
            },
            _ => {
                acl.insert(principal.clone(), json!({"write": true}));
            },
        }
    }
    Value::Object(acl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_round_trip() {
        let acl = json!({
            "1024": {"read": true, "write": true},
            "*": {"read": true},
        });
        let (mut rperm, wperm) = acl_to_perms(&acl).unwrap();
        rperm.sort();
        assert_eq!(rperm, vec!["*".to_string(), "1024".to_string()]);
        assert_eq!(wperm, vec!["1024".to_string()]);

        let rebuilt = perms_to_acl(&rperm, &wperm);
        assert_eq!(rebuilt, acl);
    }

    #[test]
    fn test_write_only_principal() {
        let acl = perms_to_acl(&[], &["role:admin".to_string()]);
        assert_eq!(acl, json!({"role:admin": {"write": true}}));
    }

    #[test]
    fn test_invalid_acl() {
        assert!(acl_to_perms(&json!("nope")).is_err());
        assert!(acl_to_perms(&json!({"1024": "rw"})).is_err());
    }
}

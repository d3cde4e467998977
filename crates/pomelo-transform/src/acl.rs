//! Row-level ACL predicate injection.
//!
//! Master callers (no acl group) skip this entirely; everyone else gets
//! the permission arrays constrained: the row must have no ACL, grant
//! the public principal, or grant one of the caller's principals. The
//! `null` entry matches rows without the array.

use serde_json::{json, Value};

/// Constrain a native query to rows the acl group may read.
pub fn add_read_acl(query: &Value, acl_group: &[String]) -> Value {
    add_acl(query, acl_group, "_rperm")
}

/// Constrain a native query to rows the acl group may write.
pub fn add_write_acl(query: &Value, acl_group: &[String]) -> Value {
    add_acl(query, acl_group, "_wperm")
}

fn add_acl(query: &Value, acl_group: &[String], perm_key: &str) -> Value {
    let mut out = query.clone();
    if !out.is_object() {
        out = json!({});
    }

    let mut allowed = vec![Value::Null, json!("*")];
    allowed.extend(acl_group.iter().map(|principal| json!(principal)));
    out.as_object_mut()
        .expect("query is an object")
        .insert(perm_key.to_string(), json!({"$in": allowed}));
    out
}

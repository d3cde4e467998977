//! Fixed schemas of the volatile system classes.
//!
//! These classes are injected into every loaded catalog whether or not
//! the store has rows for them.

use serde_json::{json, Value};

/// The volatile class schemas in their public shape, empty CLP.
pub fn volatile_class_schemas() -> Vec<Value> {
    vec![
        json!({
            "className": "_Hooks",
            "fields": {
                "functionName": {"type": "String"},
                "className": {"type": "String"},
                "triggerName": {"type": "String"},
                "url": {"type": "String"},
            },
            "classLevelPermissions": {},
        }),
        json!({
            "className": "_JobStatus",
            "fields": {
                "objectId": {"type": "String"},
                "createdAt": {"type": "Date"},
                "updatedAt": {"type": "Date"},
                "_rperm": {"type": "Array"},
                "_wperm": {"type": "Array"},
                "jobName": {"type": "String"},
                "source": {"type": "String"},
                "status": {"type": "String"},
                "message": {"type": "String"},
                "params": {"type": "Object"},
                "finishedAt": {"type": "Date"},
            },
            "classLevelPermissions": {},
        }),
        json!({
            "className": "_PushStatus",
            "fields": {
                "objectId": {"type": "String"},
                "createdAt": {"type": "Date"},
                "updatedAt": {"type": "Date"},
                "_rperm": {"type": "Array"},
                "_wperm": {"type": "Array"},
                "pushTime": {"type": "String"},
                "source": {"type": "String"},
                "query": {"type": "String"},
                "payload": {"type": "String"},
                "title": {"type": "String"},
                "expiry": {"type": "Number"},
                "status": {"type": "String"},
                "numSent": {"type": "Number"},
                "numFailed": {"type": "Number"},
                "pushHash": {"type": "String"},
                "errorMessage": {"type": "Object"},
                "sentPerType": {"type": "Object"},
                "failedPerType": {"type": "Object"},
                "count": {"type": "Number"},
            },
            "classLevelPermissions": {},
        }),
        json!({
            "className": "_GlobalConfig",
            "fields": {
                "objectId": {"type": "String"},
                "params": {"type": "Object"},
            },
            "classLevelPermissions": {},
        }),
    ]
}

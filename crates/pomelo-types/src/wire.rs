//! Tagged wire forms of the public JSON dialect.
//!
//! Rich values travel as objects carrying a `__type` tag:
//! `Date`, `Pointer`, `Relation`, `File`, `GeoPoint`, and `Bytes`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::json::{get_str, type_tag};

/// A typed reference to a single record of another class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), object_id: object_id.into() }
    }

    /// Parse `{"__type": "Pointer", "className": ..., "objectId": ...}`.
    pub fn from_value(value: &Value) -> Option<Pointer> {
        let map = value.as_object()?;
        if type_tag(value) != Some("Pointer") {
            return None;
        }
        Some(Pointer {
            class_name: get_str(map, "className")?.to_string(),
            object_id: get_str(map, "objectId")?.to_string(),
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Parse `{"__type": "GeoPoint", "latitude": ..., "longitude": ...}`,
    /// or a bare `{latitude, longitude}` object as the query operators use.
    pub fn from_value(value: &Value) -> Option<GeoPoint> {
        let map = value.as_object()?;
        Some(GeoPoint {
            latitude: map.get("latitude")?.as_f64()?,
            longitude: map.get("longitude")?.as_f64()?,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "__type": "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}

/// Parse a `{"__type": "Date", "iso": ...}` tag into a timestamp.
pub fn date_from_value(value: &Value) -> Option<DateTime<Utc>> {
    let map = value.as_object()?;
    if type_tag(value) != Some("Date") {
        return None;
    }
    let iso = get_str(map, "iso")?;
    DateTime::parse_from_rfc3339(iso)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The wire form of a timestamp.
pub fn date_value(iso: &str) -> Value {
    json!({"__type": "Date", "iso": iso})
}

/// The wire form of a stored file reference.
pub fn file_value(name: &str) -> Value {
    json!({"__type": "File", "name": name})
}

/// The wire form of an opaque byte payload.
pub fn bytes_value(base64: &str) -> Value {
    json!({"__type": "Bytes", "base64": base64})
}

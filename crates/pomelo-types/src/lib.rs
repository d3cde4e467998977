//! # Pomelo Types
//!
//! Shared type definitions for the Pomelo object database.
//!
//! This crate provides the public error codes, the field-type sum, the
//! tagged wire forms (`__type` / `__op`) of the JSON dialect, and the
//! per-row ACL model used across the Pomelo ecosystem, ensuring a single
//! source of truth and preventing circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod acl;
pub mod json;
pub mod ops;
pub mod wire;

pub use acl::{acl_to_perms, perms_to_acl};
pub use ops::UpdateOperator;
pub use wire::{GeoPoint, Pointer};

// ============================================================================
// Error Types
// ============================================================================

/// The public error taxonomy of the object database.
///
/// Every variant carries the human-readable message surfaced to API
/// callers; [`Error::code`] yields the Parse wire code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{0}")]
    ObjectNotFound(String),

    #[error("{0}")]
    InvalidClassName(String),

    #[error("{0}")]
    InvalidKeyName(String),

    #[error("{0}")]
    InvalidJson(String),

    #[error("{0}")]
    IncorrectType(String),

    #[error("{0}")]
    OperationForbidden(String),

    #[error("{0}")]
    InvalidNestedKey(String),

    #[error("{0}")]
    MissingRequiredField(String),

    #[error("{0}")]
    ChangedImmutableField(String),

    #[error("{0}")]
    DuplicateValue(String),

    #[error("{0}")]
    ClassNotEmpty(String),

    /// Adapter-level failure that has no public taxonomy entry.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// The numeric code transmitted on the wire.
    pub fn code(&self) -> u16 {
        match self {
            Error::ObjectNotFound(_) => 101,
            Error::InvalidClassName(_) => 103,
            Error::InvalidKeyName(_) => 105,
            Error::InvalidJson(_) => 107,
            Error::IncorrectType(_) => 111,
            Error::OperationForbidden(_) => 119,
            Error::InvalidNestedKey(_) => 121,
            Error::MissingRequiredField(_) => 135,
            Error::ChangedImmutableField(_) => 136,
            Error::DuplicateValue(_) => 137,
            Error::ClassNotEmpty(_) => 255,
            Error::Store(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Field Types
// ============================================================================

/// The schema type of a field.
///
/// Serializes to the public wire shape, e.g. `{"type": "String"}` or
/// `{"type": "Pointer", "targetClass": "_User"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    GeoPoint,
    File,
    Bytes,
    #[serde(rename = "ACL")]
    Acl,
    Pointer {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
    Relation {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
}

impl FieldType {
    /// The bare type name, without any target class.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::Object => "Object",
            FieldType::Array => "Array",
            FieldType::GeoPoint => "GeoPoint",
            FieldType::File => "File",
            FieldType::Bytes => "Bytes",
            FieldType::Acl => "ACL",
            FieldType::Pointer { .. } => "Pointer",
            FieldType::Relation { .. } => "Relation",
        }
    }

    /// The target class of a `Pointer` or `Relation`, if any.
    pub fn target_class(&self) -> Option<&str> {
        match self {
            FieldType::Pointer { target_class } | FieldType::Relation { target_class } => {
                Some(target_class)
            },
            _ => None,
        }
    }

    /// Parse the wire shape `{"type": ..., "targetClass": ...}`.
    ///
    /// Target-class *name validity* is not checked here; the schema
    /// layer rejects invalid class names with its own message.
    pub fn from_json(value: &serde_json::Value) -> Result<FieldType> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::InvalidJson("invalid JSON".to_string()))?;
        let name = match map.get("type").and_then(|t| t.as_str()) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(Error::InvalidJson("invalid JSON".to_string())),
        };

        let simple = match name {
            "String" => Some(FieldType::String),
            "Number" => Some(FieldType::Number),
            "Boolean" => Some(FieldType::Boolean),
            "Date" => Some(FieldType::Date),
            "Object" => Some(FieldType::Object),
            "Array" => Some(FieldType::Array),
            "GeoPoint" => Some(FieldType::GeoPoint),
            "File" => Some(FieldType::File),
            "Bytes" => Some(FieldType::Bytes),
            "ACL" => Some(FieldType::Acl),
            _ => None,
        };
        if let Some(ty) = simple {
            return Ok(ty);
        }

        if name == "Pointer" || name == "Relation" {
            let target = match map.get("targetClass") {
                None => {
                    return Err(Error::MissingRequiredField(format!(
                        "type {name} needs a class name"
                    )))
                },
                Some(serde_json::Value::String(target)) => target.clone(),
                Some(_) => return Err(Error::InvalidJson("invalid JSON".to_string())),
            };
            return Ok(if name == "Pointer" {
                FieldType::Pointer { target_class: target }
            } else {
                FieldType::Relation { target_class: target }
            });
        }

        Err(Error::IncorrectType(format!("invalid field type: {name}")))
    }

    /// The wire shape of this type.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("field type serialization is infallible")
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target_class() {
            Some(target) => write!(f, "{}<{}>", self.name(), target),
            None => f.write_str(self.name()),
        }
    }
}

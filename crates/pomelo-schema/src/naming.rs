//! Class and field naming rules.
//!
//! A class is *regular* (`^[A-Za-z][A-Za-z0-9_]*$`), *system* (the
//! fixed `_`-prefixed set), or *join* (`_Join:<field>:<class>`). Field
//! names follow the regular pattern; the implicit fields and the
//! per-system-class default columns are reserved.

use std::sync::LazyLock;

use pomelo_types::FieldType;
use regex::Regex;

static CLASS_AND_FIELD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static pattern compiles"));

static JOIN_CLASS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^_Join:[A-Za-z0-9_]+:[A-Za-z0-9_]+$").expect("static pattern compiles")
});

/// System classes callers may address directly.
pub const SYSTEM_CLASSES: &[&str] = &[
    "_User",
    "_Installation",
    "_Role",
    "_Session",
    "_Product",
    "_PushStatus",
    "_JobStatus",
    "_Hooks",
    "_GlobalConfig",
];

/// System classes whose schemas are injected at load time regardless of
/// storage state.
pub const VOLATILE_CLASSES: &[&str] = &["_Hooks", "_JobStatus", "_PushStatus", "_GlobalConfig"];

/// The implicit fields every class carries.
pub fn default_fields() -> Vec<(&'static str, FieldType)> {
    vec![
        ("objectId", FieldType::String),
        ("createdAt", FieldType::Date),
        ("updatedAt", FieldType::Date),
        ("ACL", FieldType::Acl),
    ]
}

/// The fixed columns of a system class, if it has any.
pub fn default_columns(class: &str) -> Vec<(&'static str, FieldType)> {
    let pointer = |target: &str| FieldType::Pointer { target_class: target.to_string() };
    let relation = |target: &str| FieldType::Relation { target_class: target.to_string() };
    match class {
        "_User" => vec![
            ("username", FieldType::String),
            ("password", FieldType::String),
            ("email", FieldType::String),
            ("emailVerified", FieldType::Boolean),
            ("authData", FieldType::Object),
        ],
        "_Installation" => vec![
            ("installationId", FieldType::String),
            ("deviceToken", FieldType::String),
            ("channels", FieldType::Array),
            ("deviceType", FieldType::String),
            ("pushType", FieldType::String),
            ("GCMSenderId", FieldType::String),
            ("timeZone", FieldType::String),
            ("localeIdentifier", FieldType::String),
            ("badge", FieldType::Number),
            ("appVersion", FieldType::String),
            ("appName", FieldType::String),
            ("appIdentifier", FieldType::String),
            ("parseVersion", FieldType::String),
        ],
        "_Role" => vec![
            ("name", FieldType::String),
            ("users", relation("_User")),
            ("roles", relation("_Role")),
        ],
        "_Session" => vec![
            ("restricted", FieldType::Boolean),
            ("user", pointer("_User")),
            ("installationId", FieldType::String),
            ("sessionToken", FieldType::String),
            ("expiresAt", FieldType::Date),
            ("createdWith", FieldType::Object),
        ],
        "_Product" => vec![
            ("productIdentifier", FieldType::String),
            ("download", FieldType::File),
            ("downloadName", FieldType::String),
            ("icon", FieldType::File),
            ("order", FieldType::Number),
            ("title", FieldType::String),
            ("subtitle", FieldType::String),
        ],
        _ => Vec::new(),
    }
}

/// Columns a class insists on, checked at object validation time.
pub fn required_columns(class: &str) -> &'static [&'static str] {
    match class {
        "_Role" => &["name", "ACL"],
        "_Product" => &["productIdentifier", "icon", "order", "title", "subtitle"],
        _ => &[],
    }
}

pub fn class_name_is_valid(class: &str) -> bool {
    SYSTEM_CLASSES.contains(&class)
        || join_class_is_valid(class)
        || CLASS_AND_FIELD_PATTERN.is_match(class)
}

pub fn join_class_is_valid(class: &str) -> bool {
    JOIN_CLASS_PATTERN.is_match(class)
}

pub fn field_name_is_valid(field: &str) -> bool {
    CLASS_AND_FIELD_PATTERN.is_match(field)
}

/// Whether a caller may add this field to this class.
pub fn field_name_is_valid_for_class(field: &str, class: &str) -> bool {
    if !field_name_is_valid(field) {
        return false;
    }
    if default_fields().iter().any(|(name, _)| *name == field) {
        return false;
    }
    !default_columns(class).iter().any(|(name, _)| *name == field)
}

pub fn invalid_class_name_message(class: &str) -> String {
    format!(
        "Invalid classname: {class}, classnames can only have alphanumeric characters and _, and must start with an alpha character "
    )
}

/// The auxiliary table backing a relation field.
pub fn join_table_name(class: &str, field: &str) -> String {
    format!("_Join:{field}:{class}")
}

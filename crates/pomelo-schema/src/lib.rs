//! # Pomelo Schema - Dynamic Schema Catalog
//!
//! The in-memory catalog of classes, field types, and class-level
//! permissions. Validates schema changes, infers field types from
//! submitted objects, and guards the reserved system classes.

pub mod catalog;
pub mod clp;
pub mod infer;
pub mod naming;
pub mod volatile;

pub use catalog::{
    build_merged_schema_object, convert_adapter_schema_to_parse_schema,
    convert_schema_to_adapter_schema, inject_default_schema, validate_field_type, SchemaCatalog,
};
pub use clp::{default_clp, merge_with_defaults, validate_clp, verify_permission_key};
pub use infer::infer_type;
pub use naming::{
    class_name_is_valid, field_name_is_valid, field_name_is_valid_for_class,
    invalid_class_name_message, join_class_is_valid, join_table_name, SYSTEM_CLASSES,
    VOLATILE_CLASSES,
};
pub use pomelo_types::{Error, FieldType, Result};
pub use volatile::volatile_class_schemas;

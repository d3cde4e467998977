//! The in-memory schema catalog.
//!
//! Holds the class → field-type and class → CLP mappings, refreshed
//! atomically from the store. All mutation paths (adding classes or
//! fields, deleting fields, changing permissions) go through the
//! adapter and then re-read, so a catalog value is always a faithful
//! snapshot of the store plus the volatile classes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use pomelo_store::StorageAdapter;
use pomelo_types::json::op_tag;
use pomelo_types::{Error, FieldType, Result};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::clp::{default_clp, merge_with_defaults, validate_clp};
use crate::infer::infer_type;
use crate::naming::{
    class_name_is_valid, default_columns, default_fields, field_name_is_valid,
    field_name_is_valid_for_class, invalid_class_name_message, join_table_name, required_columns,
};
use crate::volatile::volatile_class_schemas;

/// The catalog of classes, their field types, and their CLPs.
#[derive(Clone)]
pub struct SchemaCatalog {
    adapter: Arc<dyn StorageAdapter>,
    data: HashMap<String, BTreeMap<String, FieldType>>,
    perms: HashMap<String, Value>,
}

impl SchemaCatalog {
    /// Construct a catalog and populate it from the store.
    pub async fn load(adapter: Arc<dyn StorageAdapter>) -> Result<SchemaCatalog> {
        let mut catalog =
            SchemaCatalog { adapter, data: HashMap::new(), perms: HashMap::new() };
        catalog.reload_data().await?;
        Ok(catalog)
    }

    /// Re-read every class from the store and merge in the volatile
    /// system classes.
    pub async fn reload_data(&mut self) -> Result<()> {
        let mut data = HashMap::new();
        let mut perms = HashMap::new();

        for schema in self.adapter.get_all_classes().await? {
            let Some(class) = schema.get("className").and_then(Value::as_str) else {
                continue;
            };
            let public = inject_default_schema(&convert_adapter_schema_to_parse_schema(&schema));
            data.insert(class.to_string(), parse_fields(&public)?);
            perms.insert(class.to_string(), stored_clp(&schema));
        }

        for schema in volatile_class_schemas() {
            let class = schema["className"].as_str().expect("volatile schemas are named");
            if !data.contains_key(class) {
                let public =
                    inject_default_schema(&convert_adapter_schema_to_parse_schema(&schema));
                data.insert(class.to_string(), parse_fields(&public)?);
                perms.insert(class.to_string(), json!({}));
            }
        }

        debug!(classes = data.len(), "schema catalog reloaded");
        self.data = data;
        self.perms = perms;
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn has_class(&self, class: &str) -> bool {
        self.data.contains_key(class)
    }

    /// Whether every queried key names a known field of the class.
    /// Operator keys are skipped; dotted keys check their root.
    pub fn has_keys(&self, class: &str, keys: &[String]) -> bool {
        let mut wanted = keys
            .iter()
            .filter(|key| !key.starts_with('$'))
            .map(|key| key.split('.').next().unwrap_or(key))
            .peekable();
        if wanted.peek().is_none() {
            return true;
        }
        match self.data.get(class) {
            Some(fields) => wanted.all(|key| fields.contains_key(key)),
            None => false,
        }
    }

    pub fn get_expected_type(&self, class: &str, field: &str) -> Option<&FieldType> {
        self.data.get(class)?.get(field)
    }

    /// The declared fields of a class.
    pub fn fields(&self, class: &str) -> Option<&BTreeMap<String, FieldType>> {
        self.data.get(class)
    }

    /// The stored CLP of a class.
    pub fn class_permissions(&self, class: &str) -> Option<&Value> {
        self.perms.get(class)
    }

    // ========================================================================
    // Class & Field Enforcement
    // ========================================================================

    /// Create the class with public permissions if it is not yet known.
    pub async fn enforce_class_exists(&mut self, class: &str) -> Result<()> {
        if self.has_class(class) {
            return Ok(());
        }
        let schema = json!({
            "className": class,
            "fields": {},
            "classLevelPermissions": default_clp(),
        });
        match self.adapter.create_class(class, &convert_schema_to_adapter_schema(&schema)).await {
            Ok(_) => {},
            // Another caller won the race; the reload below sees its class.
            Err(Error::DuplicateValue(_)) => {},
            Err(e) => return Err(e),
        }
        self.reload_data().await
    }

    /// Ensure a field exists with the given type, adding it when absent.
    ///
    /// Dotted names are enforced as their root field alone. `None`
    /// means the caller has nothing to enforce (a `Delete` op).
    pub async fn enforce_field_exists(
        &mut self,
        class: &str,
        field: &str,
        field_type: Option<&FieldType>,
    ) -> Result<()> {
        let root = field.split('.').next().unwrap_or(field);
        if !field_name_is_valid(root) {
            return Err(Error::InvalidKeyName(format!("Invalid field name: {field}")));
        }
        let Some(field_type) = field_type else {
            return Ok(());
        };

        if self.get_expected_type(class, root).is_none() {
            self.reload_data().await?;
        }
        if let Some(expected) = self.get_expected_type(class, root) {
            if expected != field_type {
                return Err(Error::IncorrectType(format!(
                    "schema mismatch for {class}.{root}; expected {expected} but got {field_type}"
                )));
            }
            return Ok(());
        }

        match self
            .adapter
            .add_field_if_not_exists(class, root, &field_type.to_json())
            .await
        {
            Ok(()) => {},
            // Another caller added it; the mismatch check happens on the
            // reloaded catalog next time around.
            Err(Error::DuplicateValue(_)) => {},
            Err(e) => return Err(e),
        }
        self.reload_data().await
    }

    // ========================================================================
    // Schema Mutation
    // ========================================================================

    /// Validate a schema-creation request.
    pub fn validate_new_class(&self, class: &str, fields: &Value, clp: &Value) -> Result<()> {
        if self.has_class(class) {
            return Err(Error::InvalidClassName(format!("Class {class} already exists.")));
        }
        if !class_name_is_valid(class) {
            return Err(Error::InvalidClassName(invalid_class_name_message(class)));
        }
        self.validate_schema_data(class, fields, clp, &HashSet::new())
    }

    /// Validate submitted fields and permissions against naming rules,
    /// reserved fields, the one-geopoint rule, and CLP shape.
    pub fn validate_schema_data(
        &self,
        class: &str,
        fields: &Value,
        clp: &Value,
        existing: &HashSet<String>,
    ) -> Result<()> {
        let empty = Map::new();
        let fields_map = fields.as_object().unwrap_or(&empty);

        let mut geo_fields: Vec<&str> = Vec::new();
        for (name, spec) in fields_map {
            if !existing.contains(name) {
                if !field_name_is_valid(name) {
                    return Err(Error::InvalidKeyName(format!("invalid field name: {name}")));
                }
                if !field_name_is_valid_for_class(name, class) {
                    return Err(Error::ChangedImmutableField(format!(
                        "field {name} cannot be added"
                    )));
                }
            }
            let field_type = validate_field_type(spec)?;
            if field_type == FieldType::GeoPoint {
                geo_fields.push(name);
            }
        }
        if geo_fields.len() > 1 {
            return Err(Error::IncorrectType(format!(
                "currently, only one GeoPoint field may exist in an object. Adding {} when {} already exists.",
                geo_fields[1], geo_fields[0]
            )));
        }

        validate_clp(clp, fields)
    }

    /// Create a class from an explicit schema request and return the
    /// resulting public schema.
    pub async fn add_class_if_not_exists(
        &mut self,
        class: &str,
        fields: &Value,
        clp: &Value,
    ) -> Result<Value> {
        self.validate_new_class(class, fields, clp)?;

        let schema = json!({
            "className": class,
            "fields": fields.as_object().cloned().unwrap_or_default(),
            "classLevelPermissions": clp,
        });
        let created = match self
            .adapter
            .create_class(class, &convert_schema_to_adapter_schema(&schema))
            .await
        {
            Ok(created) => created,
            Err(Error::DuplicateValue(_)) => {
                return Err(Error::InvalidClassName(format!("Class {class} already exists.")));
            },
            Err(e) => return Err(e),
        };
        self.reload_data().await?;

        let mut public = inject_default_schema(&convert_adapter_schema_to_parse_schema(&created));
        if !public["classLevelPermissions"].is_object() {
            public["classLevelPermissions"] = default_clp();
        }
        Ok(public)
    }

    /// Apply a schema-update request: per submitted entry either delete
    /// (must exist) or add (must not exist), then apply permissions.
    pub async fn update_class(
        &mut self,
        class: &str,
        submitted: &Value,
        clp: &Value,
    ) -> Result<Value> {
        self.reload_data().await?;
        if !self.has_class(class) {
            return Err(Error::InvalidClassName(format!("Class {class} does not exist.")));
        }

        let existing = self.data.get(class).cloned().unwrap_or_default();
        let submitted_map = submitted.as_object().cloned().unwrap_or_default();
        for (name, spec) in &submitted_map {
            if op_tag(spec) == Some("Delete") {
                if !existing.contains_key(name) {
                    return Err(Error::ClassNotEmpty(format!(
                        "Field {name} does not exist, cannot delete."
                    )));
                }
            } else if existing.contains_key(name) {
                return Err(Error::ClassNotEmpty(format!("Field {name} exists, cannot update.")));
            }
        }

        let existing_public = json!({
            "className": class,
            "fields": fields_to_json(&existing),
        });
        let merged = build_merged_schema_object(&existing_public, &submitted_map);
        let existing_names: HashSet<String> = existing.keys().cloned().collect();
        self.validate_schema_data(class, &Value::Object(merged.clone()), clp, &existing_names)?;

        for (name, spec) in &submitted_map {
            if op_tag(spec) == Some("Delete") {
                self.delete_field(name, class).await?;
            }
        }
        for (name, spec) in &merged {
            if !existing_names.contains(name) {
                let field_type = FieldType::from_json(spec)?;
                self.enforce_field_exists(class, name, Some(&field_type)).await?;
            }
        }
        self.set_permissions(class, clp, &Value::Object(merged)).await?;
        self.reload_data().await?;

        Ok(json!({
            "className": class,
            "fields": fields_to_json(self.data.get(class).unwrap_or(&BTreeMap::new())),
            "classLevelPermissions": self.perms.get(class).cloned().unwrap_or_else(default_clp),
        }))
    }

    /// Delete a field, its column data, and (for relations) its join
    /// table.
    pub async fn delete_field(&mut self, field: &str, class: &str) -> Result<()> {
        if !class_name_is_valid(class) {
            return Err(Error::InvalidClassName(invalid_class_name_message(class)));
        }
        if !field_name_is_valid(field) {
            return Err(Error::InvalidKeyName(format!("invalid field name: {field}")));
        }
        if !field_name_is_valid_for_class(field, class) {
            return Err(Error::ChangedImmutableField(format!("field {field} cannot be changed")));
        }

        self.reload_data().await?;
        if !self.has_class(class) {
            return Err(Error::InvalidClassName(format!("Class {class} does not exist.")));
        }
        let Some(field_type) = self.get_expected_type(class, field).cloned() else {
            return Err(Error::ClassNotEmpty(format!(
                "Field {field} does not exist, cannot delete."
            )));
        };

        let adapter_schema = self
            .adapter
            .get_class(class)
            .await?
            .unwrap_or_else(|| json!({"className": class, "fields": {}}));
        self.adapter
            .delete_fields(class, &adapter_schema, &[field.to_string()])
            .await?;
        if matches!(field_type, FieldType::Relation { .. }) {
            self.adapter.delete_class(&join_table_name(class, field)).await?;
        }
        self.reload_data().await
    }

    // ========================================================================
    // Object Validation
    // ========================================================================

    /// Validate an object against the class schema, inferring and
    /// enforcing a type for every submitted field.
    pub async fn validate_object(
        &mut self,
        class: &str,
        object: &Value,
        query: &Value,
    ) -> Result<()> {
        self.enforce_class_exists(class).await?;

        let empty = Map::new();
        let object_map = object.as_object().unwrap_or(&empty);
        let mut geo_seen = false;
        for (name, value) in object_map {
            if value.is_null() {
                continue;
            }
            let Some(expected) = infer_type(value)? else {
                continue;
            };
            if expected == FieldType::GeoPoint {
                if geo_seen {
                    return Err(Error::IncorrectType(
                        "there can only be one geopoint field in a class".to_string(),
                    ));
                }
                geo_seen = true;
            }
            self.enforce_field_exists(class, name, Some(&expected)).await?;
        }

        self.validate_required_columns(class, object_map, query)
    }

    /// Check the class's required columns. A column is satisfied when
    /// the object carries a non-`Delete` value, or when the query
    /// targets a specific object (an update need not resubmit it).
    pub fn validate_required_columns(
        &self,
        class: &str,
        object: &Map<String, Value>,
        query: &Value,
    ) -> Result<()> {
        let required = required_columns(class);
        if required.is_empty() {
            return Ok(());
        }

        let targets_object = query
            .as_object()
            .and_then(|q| q.get("objectId"))
            .and_then(Value::as_str)
            .map(|id| !id.is_empty())
            .unwrap_or(false);

        for column in required {
            match object.get(*column) {
                Some(value) if op_tag(value) == Some("Delete") => {
                    return Err(Error::IncorrectType(format!("{column} is required.")));
                },
                Some(_) => {},
                None if targets_object => {},
                None => return Err(Error::IncorrectType(format!("{column} is required."))),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// The base CLP test: no CLP means public; otherwise `*` or any
    /// principal of the acl group must be granted.
    pub fn test_base_clp(&self, class: &str, acl_group: &[String], operation: &str) -> bool {
        let Some(class_perms) = self.perms.get(class).and_then(Value::as_object) else {
            return true;
        };
        let Some(op_perms) = class_perms.get(operation).and_then(Value::as_object) else {
            return true;
        };

        if op_perms.get("*").and_then(Value::as_bool) == Some(true) {
            return true;
        }
        acl_group
            .iter()
            .any(|principal| op_perms.get(principal).and_then(Value::as_bool) == Some(true))
    }

    /// Gate an operation on a class for the given acl group.
    pub fn validate_permission(
        &self,
        class: &str,
        acl_group: &[String],
        operation: &str,
    ) -> Result<()> {
        if self.test_base_clp(class, acl_group, operation) {
            return Ok(());
        }

        let class_perms = self
            .perms
            .get(class)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(op_perms) = class_perms.get(operation).and_then(Value::as_object) {
            if op_perms.contains_key("requiresAuthentication") {
                // Any principal besides the public marker means the
                // caller is an authenticated user.
                if acl_group.iter().any(|principal| principal != "*") {
                    return Ok(());
                }
                return Err(Error::ObjectNotFound(
                    "Permission denied, user needs to be authenticated.".to_string(),
                ));
            }
        }

        let pointer_permissions = match operation {
            "get" | "find" | "count" => "readUserFields",
            "update" | "delete" => "writeUserFields",
            _ => "",
        };
        if !pointer_permissions.is_empty() {
            let has_pointer_fields = class_perms
                .get(pointer_permissions)
                .and_then(Value::as_array)
                .map(|fields| !fields.is_empty())
                .unwrap_or(false);
            // Row-level enforcement happens in the query builder.
            if has_pointer_fields {
                return Ok(());
            }
        }

        Err(Error::OperationForbidden(format!(
            "Permission denied for action {operation} on class {class}."
        )))
    }

    /// Persist a CLP, overlaying it onto the public defaults.
    pub async fn set_permissions(
        &mut self,
        class: &str,
        perms: &Value,
        fields: &Value,
    ) -> Result<()> {
        if perms.is_null() {
            return Ok(());
        }
        validate_clp(perms, fields)?;
        let merged = merge_with_defaults(perms);
        self.adapter.set_class_level_permissions(class, &merged).await?;
        self.reload_data().await
    }

    // ========================================================================
    // Public Schema API
    // ========================================================================

    /// Every stored class in its public shape.
    pub async fn get_all_classes(&mut self) -> Result<Vec<Value>> {
        self.reload_data().await?;
        let mut schemas = Vec::new();
        for schema in self.adapter.get_all_classes().await? {
            schemas.push(publish_schema(&schema));
        }
        Ok(schemas)
    }

    /// One class in its public shape, falling back to the volatile
    /// definitions when asked.
    pub async fn get_one_schema(&mut self, class: &str, allow_volatile: bool) -> Result<Option<Value>> {
        if allow_volatile {
            if let Some(schema) =
                volatile_class_schemas().into_iter().find(|s| s["className"] == class)
            {
                return Ok(Some(publish_schema(&schema)));
            }
        }
        match self.adapter.get_class(class).await? {
            Some(schema) => Ok(Some(publish_schema(&schema))),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Schema Shape Conversion
// ============================================================================

/// Add the implicit fields (and system default columns) to a public
/// schema.
pub fn inject_default_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    let Some(class) = schema.get("className").and_then(Value::as_str).map(str::to_string) else {
        return schema;
    };

    let map = match schema.as_object_mut() {
        Some(map) => map,
        None => return schema,
    };
    let fields = map
        .entry("fields")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(fields) = fields.as_object_mut() {
        for (name, field_type) in default_fields().into_iter().chain(default_columns(&class)) {
            if !fields.contains_key(name) {
                fields.insert(name.to_string(), field_type.to_json());
            }
        }
    }
    if !map.contains_key("classLevelPermissions") {
        map.insert("classLevelPermissions".to_string(), Value::Null);
    }
    schema
}

/// Public shape → adapter shape: `ACL` becomes the `_rperm`/`_wperm`
/// arrays, and `_User.password` is stored hashed.
pub fn convert_schema_to_adapter_schema(schema: &Value) -> Value {
    let mut schema = inject_default_schema(schema);
    let class = schema
        .get("className")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(fields) = schema.get_mut("fields").and_then(Value::as_object_mut) {
        fields.remove("ACL");
        fields.insert("_rperm".to_string(), json!({"type": "Array"}));
        fields.insert("_wperm".to_string(), json!({"type": "Array"}));
        if class == "_User" {
            fields.remove("password");
            fields.insert("_hashed_password".to_string(), json!({"type": "String"}));
        }
    }
    schema
}

/// Adapter shape → public shape: fold the permission arrays back into
/// `ACL` and hide `_User` credential storage.
pub fn convert_adapter_schema_to_parse_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    let class = schema
        .get("className")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(fields) = schema.get_mut("fields").and_then(Value::as_object_mut) {
        fields.remove("_rperm");
        fields.remove("_wperm");
        fields.insert("ACL".to_string(), json!({"type": "ACL"}));
        if class == "_User" {
            fields.remove("authData");
            if let Some(spec) = fields.remove("_hashed_password") {
                fields.insert("password".to_string(), spec);
            }
        }
    }
    schema
}

/// Merge an existing public schema with a put-request, honoring
/// `Delete` entries and skipping implicit and system fields.
pub fn build_merged_schema_object(existing: &Value, put: &Map<String, Value>) -> Map<String, Value> {
    let class = existing
        .get("className")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut reserved: HashSet<&str> =
        default_fields().iter().map(|(name, _)| *name).collect();
    let columns = default_columns(&class);
    reserved.extend(columns.iter().map(|(name, _)| *name));

    let mut merged = Map::new();
    if let Some(fields) = existing.get("fields").and_then(Value::as_object) {
        for (name, spec) in fields {
            if reserved.contains(name.as_str()) {
                continue;
            }
            if put.get(name).and_then(op_tag) == Some("Delete") {
                continue;
            }
            merged.insert(name.clone(), spec.clone());
        }
    }
    for (name, spec) in put {
        if name == "_id" || op_tag(spec) == Some("Delete") {
            continue;
        }
        merged.insert(name.clone(), spec.clone());
    }
    merged
}

/// Parse a field-type wire shape, also checking pointer/relation target
/// class names.
pub fn validate_field_type(spec: &Value) -> Result<FieldType> {
    let field_type = FieldType::from_json(spec)?;
    if let Some(target) = field_type.target_class() {
        if !class_name_is_valid(target) {
            return Err(Error::InvalidClassName(invalid_class_name_message(target)));
        }
    }
    Ok(field_type)
}

fn parse_fields(public_schema: &Value) -> Result<BTreeMap<String, FieldType>> {
    let mut fields = BTreeMap::new();
    if let Some(map) = public_schema.get("fields").and_then(Value::as_object) {
        for (name, spec) in map {
            fields.insert(name.clone(), FieldType::from_json(spec)?);
        }
    }
    Ok(fields)
}

fn fields_to_json(fields: &BTreeMap<String, FieldType>) -> Value {
    let mut map = Map::new();
    for (name, field_type) in fields {
        map.insert(name.clone(), field_type.to_json());
    }
    Value::Object(map)
}

fn stored_clp(schema: &Value) -> Value {
    match schema.get("classLevelPermissions") {
        Some(Value::Object(clp)) => Value::Object(clp.clone()),
        _ => default_clp(),
    }
}

fn publish_schema(adapter_schema: &Value) -> Value {
    let mut public =
        inject_default_schema(&convert_adapter_schema_to_parse_schema(adapter_schema));
    if !public["classLevelPermissions"].is_object() {
        public["classLevelPermissions"] = stored_clp(adapter_schema);
    }
    public
}

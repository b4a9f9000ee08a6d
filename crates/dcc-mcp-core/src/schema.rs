//! Declared input schemas and the validator seam.
//!
//! An [`InputSchema`] is an ordered list of fields. The runtime never
//! interprets it beyond rendering metadata: checking parameters against it is
//! the job of an [`InputValidator`]. [`SchemaValidator`] is the bundled
//! implementation and covers required fields, defaults, JSON kinds and enums.

use crate::context::ContextMap;
use crate::error::ValidationError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON kind accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Any,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl FieldKind {
    /// JSON schema `type` keyword.
    pub fn schema_type(self) -> &'static str {
        match self {
            FieldKind::Any => "any",
            FieldKind::Bool => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Float => "number",
            FieldKind::String => "string",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }
}

/// Name of the JSON type of `value`, used in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl InputField {
    /// A required field with no default.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: String::new(),
            enum_values: None,
        }
    }

    /// An optional field that falls back to `default` when absent.
    pub fn optional(name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
            description: String::new(),
            enum_values: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_enum(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = Some(values.into_iter().collect());
        self
    }
}

/// Ordered set of input fields declared by an action type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<InputField>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field, keeping declaration order.
    pub fn field(mut self, field: InputField) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render a simplified JSON schema titled `title`.
    ///
    /// Fields whose name starts with `_` are internal and left out.
    pub fn to_json_schema(&self, title: &str) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in self.fields.iter().filter(|f| !f.name.starts_with('_')) {
            let mut property = json!({
                "type": field.kind.schema_type(),
                "description": field.description,
            });
            if let Some(values) = &field.enum_values {
                property["enum"] = Value::Array(values.clone());
            }
            if let Some(default) = &field.default {
                property["default"] = default.clone();
            }
            if field.required {
                required.push(field.name.clone());
            }
            properties.insert(field.name.clone(), property);
        }
        json!({
            "title": title,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Opaque input validator consumed by action instances.
pub trait InputValidator: Send + Sync {
    /// Check `params` against `schema`, returning the normalized parameters.
    fn validate(&self, schema: &InputSchema, params: &ContextMap)
    -> Result<ContextMap, ValidationError>;
}

/// Default validator.
///
/// - missing required field: error
/// - missing optional field: default inserted (or left absent if none)
/// - `null` on an optional field: treated as absent
/// - integer supplied for a float field: widened
/// - keys not declared in the schema: kept as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl InputValidator for SchemaValidator {
    fn validate(
        &self,
        schema: &InputSchema,
        params: &ContextMap,
    ) -> Result<ContextMap, ValidationError> {
        let mut output = params.clone();
        let mut errors = Vec::new();

        for field in schema.fields() {
            let supplied = params.get(&field.name).filter(|v| !v.is_null());
            let Some(value) = supplied else {
                match (&field.default, field.required) {
                    (Some(default), _) => {
                        output.insert(field.name.clone(), default.clone());
                    }
                    (None, true) => errors.push(ValidationError::MissingField {
                        field: field.name.clone(),
                    }),
                    (None, false) => {
                        output.remove(&field.name);
                    }
                }
                continue;
            };

            if !field.kind.accepts(value) {
                errors.push(ValidationError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.kind.schema_type().to_string(),
                    found: json_type_name(value).to_string(),
                });
                continue;
            }

            if let Some(allowed) = &field.enum_values
                && !allowed.contains(value)
            {
                errors.push(ValidationError::NotAllowed {
                    field: field.name.clone(),
                    allowed: Value::Array(allowed.clone()).to_string(),
                    found: value.to_string(),
                });
                continue;
            }

            if field.kind == FieldKind::Float
                && !value.is_f64()
                && let Some(widened) = value.as_f64().and_then(serde_json::Number::from_f64)
            {
                output.insert(field.name.clone(), Value::Number(widened));
            }
        }

        match ValidationError::from_many(errors) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }
}

/// Interpret raw call parameters as an object. `null` counts as empty.
pub fn params_to_map(params: Value) -> Result<ContextMap, ValidationError> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ContextMap::new()),
        other => Err(ValidationError::NotAnObject {
            found: json_type_name(&other).to_string(),
        }),
    }
}

/// Validated input handed to an execution hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionInput {
    values: ContextMap,
}

impl ActionInput {
    pub fn new(values: ContextMap) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Deserialize the whole input into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.values.clone()))
    }

    pub fn values(&self) -> &ContextMap {
        &self.values
    }

    pub fn into_values(self) -> ContextMap {
        self.values
    }
}

//! Per-index parameter schemas.
//!
//! Each lookup publishes an explicit JSON Schema in place of a native
//! function signature; clients see one required property per index key.

use std::fmt;
use std::sync::Arc;

use jsonschema::{validator_for, Validator};
use serde_json::{json, Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum SchemaValidationError {
    #[error("Schema compile error: {0}")]
    SchemaCompile(String),
    #[error("{}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}

/// JSON type a key value is published as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Integer,
    Number,
    Boolean,
    String,
}

impl JsonType {
    /// Map a catalog type name. Unknown and expression keys are strings.
    pub fn from_catalog(type_name: Option<&str>) -> Self {
        let Some(type_name) = type_name else {
            return Self::String;
        };
        match type_name.to_ascii_lowercase().as_str() {
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" | "uint2" | "uint4"
            | "uint8" => Self::Integer,
            "real" | "double precision" | "float4" | "float8" | "numeric" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            _ => Self::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Accepted JSON types. Values are bound as text, so typed keys also
    /// accept their string spelling.
    fn accepted(self) -> Value {
        match self {
            Self::String => json!(["string", "number"]),
            other => json!([other.as_str(), "string"]),
        }
    }
}

/// One formal parameter of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupParam {
    pub name: String,
    pub json_type: JsonType,
}

/// Build the `inputSchema` object for an ordered parameter list.
pub fn input_schema(params: &[LookupParam]) -> Value {
    let mut properties = Map::new();
    for param in params {
        properties.insert(
            param.name.clone(),
            json!({
                "type": param.json_type.accepted(),
                "description": format!("Value of index key `{}`", param.name),
            }),
        );
    }
    let required: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();

    json!({
        "type": "object",
        "required": required,
        "properties": properties,
        "additionalProperties": false,
    })
}

/// A lookup's published schema together with its compiled validator.
///
/// Compiled once at bind time and shared by every call.
#[derive(Clone)]
pub struct ArgumentSchema {
    schema: Value,
    validator: Arc<Validator>,
}

impl ArgumentSchema {
    pub fn compile(params: &[LookupParam]) -> Result<Self, SchemaValidationError> {
        let schema = input_schema(params);
        let validator = validator_for(&schema)
            .map_err(|e| SchemaValidationError::SchemaCompile(e.to_string()))?;
        Ok(Self {
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Every violation is reported.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaValidationError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError::ValidationFailed(errors))
        }
    }
}

impl fmt::Debug for ArgumentSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

//! JSON Schema generation and validation for tool inputs and outputs.
//!
//! Schemas are generated from Rust types with [`schema_for`] and compiled
//! once per tool into a [`SchemaValidator`] when the tool is registered.

use std::sync::Arc;

use jsonschema::JSONSchema;
use schemars::JsonSchema;
use serde_json::Value;

/// Generates the JSON Schema of `T`.
///
/// The `$schema` marker is dropped so the result can be embedded in tool
/// listings and compiled by any draft-7 validator.
#[must_use]
pub fn schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::SchemaGenerator::default().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
    }
    value
}

/// Schema accepting any JSON object.
#[must_use]
pub fn any_object() -> Value {
    serde_json::json!({ "type": "object" })
}

/// A compiled JSON Schema.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Value,
    compiled: Arc<JSONSchema>,
}

impl SchemaValidator {
    /// Compiles `schema`.
    ///
    /// # Errors
    ///
    /// Returns the compiler message if `schema` is not a valid JSON Schema.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| e.to_string())?;
        Ok(Self {
            schema: schema.clone(),
            compiled: Arc::new(compiled),
        })
    }

    /// Returns the schema source.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validates `instance`.
    ///
    /// # Errors
    ///
    /// Returns every violation, joined with `; `.
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        self.compiled.validate(instance).map_err(|errors| {
            errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
    }
}

impl core::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code, reason = "only the schema is used")]
    struct Lookup {
        /// City to look up.
        city: String,
        limit: Option<u32>,
    }

    #[test]
    fn generated_schema_lists_required_fields() {
        let schema = schema_for::<Lookup>();

        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["city"]));
        assert_eq!(schema["properties"]["city"]["description"], "City to look up.");
    }

    #[test]
    fn generated_schema_validates_instances() {
        let validator = SchemaValidator::compile(&schema_for::<Lookup>()).unwrap();

        assert!(validator.validate(&json!({ "city": "Oslo" })).is_ok());
        assert!(validator.validate(&json!({ "city": "Oslo", "limit": 3 })).is_ok());

        let err = validator.validate(&json!({ "limit": "three" })).unwrap_err();
        assert!(err.contains("city"), "{err}");
    }

    #[test]
    fn invalid_schema_does_not_compile() {
        let result = SchemaValidator::compile(&json!({ "type": 12 }));

        assert!(result.is_err());
    }

    #[test]
    fn any_object_rejects_scalars() {
        let validator = SchemaValidator::compile(&any_object()).unwrap();

        assert!(validator.validate(&json!({})).is_ok());
        assert!(validator.validate(&json!("text")).is_err());
    }
}

//! JSON schema descriptors for structured generation.
//!
//! `ObjectSchema` describes the top-level object a generator must return.
//! `Schema<T>` pairs a named descriptor with the Rust type it deserializes
//! into, so callers get typed access to the generated fields.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: bool,
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Check that `value` is an object carrying every required property.
    ///
    /// Field types are left to serde when the value is deserialized.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let Some(object) = value.as_object() else {
            return Err(format!("expected a JSON object, got {}", type_name(value)));
        };

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| !object.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required properties: {}", missing.join(", ")))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}

impl PropertySchema {
    fn typed(schema_type: &str, description: Option<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description,
            items: None,
            properties: None,
            required: None,
            additional_properties: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", Some(description.into()))
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        let mut schema = Self::typed("array", Some(description.into()));
        schema.items = Some(Box::new(items));
        schema
    }

    /// Plain string items, for arrays where the array itself carries the description.
    pub fn string_item() -> Self {
        Self::typed("string", None)
    }

    /// Nested object, used as array items.
    pub fn object(object: ObjectSchema) -> Self {
        let mut schema = Self::typed("object", None);
        schema.properties = Some(object.properties);
        schema.required = Some(object.required);
        schema.additional_properties = Some(object.additional_properties);
        schema
    }
}

/// A named object schema tied to the type it deserializes into.
#[derive(Debug, Clone)]
pub struct Schema<T> {
    pub name: String,
    pub object: ObjectSchema,
    _output: PhantomData<fn() -> T>,
}

impl<T> Schema<T> {
    pub fn new(name: impl Into<String>, object: ObjectSchema) -> Self {
        Self {
            name: name.into(),
            object,
            _output: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_schema() -> ObjectSchema {
        let item = ObjectSchema::new()
            .add_property("query", PropertySchema::string("The SERP query"), true)
            .add_property("researchGoal", PropertySchema::string("Goal"), true);
        ObjectSchema::new().add_property(
            "queries",
            PropertySchema::array("List of queries", PropertySchema::object(item)),
            true,
        )
    }

    #[test]
    fn test_object_schema_serializes_nested_items() {
        let value = serde_json::to_value(query_schema()).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["additionalProperties"], false);
        assert_eq!(value["required"], json!(["queries"]));
        let items = &value["properties"]["queries"]["items"];
        assert_eq!(items["type"], "object");
        assert_eq!(items["required"], json!(["query", "researchGoal"]));
        assert_eq!(items["additionalProperties"], false);
    }

    #[test]
    fn test_validate_accepts_complete_object() {
        let schema = query_schema();
        assert!(schema.validate(&json!({"queries": []})).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_and_wrong_type() {
        let schema = query_schema();
        let err = schema.validate(&json!({"other": 1})).unwrap_err();
        assert!(err.contains("queries"));

        let err = schema.validate(&json!(["not", "an", "object"])).unwrap_err();
        assert!(err.contains("array"));
    }

    #[test]
    fn test_string_item_has_no_description() {
        let value = serde_json::to_value(PropertySchema::string_item()).unwrap();
        assert_eq!(value, json!({"type": "string"}));
    }
}

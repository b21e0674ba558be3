//! Response schemas in the OpenAPI subset accepted by `generationConfig.responseSchema`.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub property_ordering: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Schema {
    fn of(kind: SchemaType) -> Self {
        Self {
            kind,
            enum_values: Vec::new(),
            items: None,
            properties: BTreeMap::new(),
            property_ordering: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn string_enum(values: &[&str]) -> Self {
        Self {
            enum_values: values.iter().map(|v| (*v).to_string()).collect(),
            ..Self::of(SchemaType::String)
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    pub fn string_array() -> Self {
        Self::array(Self::string())
    }

    /// Object whose properties are all required, emitted in declaration order.
    pub fn object<const N: usize>(properties: [(&str, Schema); N]) -> Self {
        let mut schema = Self::of(SchemaType::Object);
        for (name, property) in properties {
            schema.property_ordering.push(name.to_string());
            schema.required.push(name.to_string());
            schema.properties.insert(name.to_string(), property);
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_object_schema_wire_format() {
        let schema = Schema::object([
            ("recommendation", Schema::string_enum(&["BUY", "HOLD", "SELL"])),
            ("bullishPoints", Schema::string_array()),
        ]);

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "recommendation": {"type": "STRING", "enum": ["BUY", "HOLD", "SELL"]},
                    "bullishPoints": {"type": "ARRAY", "items": {"type": "STRING"}}
                },
                "propertyOrdering": ["recommendation", "bullishPoints"],
                "required": ["recommendation", "bullishPoints"]
            })
        );
    }

    #[test]
    fn test_nested_array_of_objects() {
        let schema = Schema::array(Schema::object([
            ("risk", Schema::string()),
            ("mitigation", Schema::string()),
        ]));
        let items = schema.items.as_deref().unwrap();
        assert_eq!(items.kind, SchemaType::Object);
        assert_eq!(items.required, vec!["risk", "mitigation"]);
    }
}

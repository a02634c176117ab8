use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validation rule as carried by `x-kubernetes-validations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// CEL source evaluated with `self` bound to the node value.
    pub rule: String,
    /// Message reported when the rule evaluates to `false`.
    #[serde(default)]
    pub message: String,
}

impl Rule {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// `additionalProperties` is either a boolean or a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

/// One OpenAPI v3 schema object, as found in a definition catalogue.
///
/// This is the unresolved, unrestricted form: it may carry `$ref`
/// placeholders and combinators anywhere. [`crate::resolve`] inlines the
/// references and [`crate::normalize`] restricts it to a
/// [`crate::Structural`] schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<SchemaNode>>,

    #[serde(
        rename = "x-kubernetes-int-or-string",
        default,
        skip_serializing_if = "is_false"
    )]
    pub x_int_or_string: bool,

    #[serde(
        rename = "x-kubernetes-preserve-unknown-fields",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub x_preserve_unknown_fields: Option<bool>,

    #[serde(
        rename = "x-kubernetes-embedded-resource",
        default,
        skip_serializing_if = "is_false"
    )]
    pub x_embedded_resource: bool,

    #[serde(
        rename = "x-kubernetes-list-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub x_list_type: Option<String>,

    #[serde(
        rename = "x-kubernetes-list-map-keys",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub x_list_map_keys: Vec<String>,

    #[serde(
        rename = "x-kubernetes-map-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub x_map_type: Option<String>,

    #[serde(
        rename = "x-kubernetes-validations",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub x_validations: Vec<Rule>,
}

impl SchemaNode {
    /// A bare `$ref` placeholder.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            reference: Some(name.into()),
            ..Self::default()
        }
    }

    /// A node with only `type` set.
    pub fn typed(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: Some(schema_type.into()),
            ..Self::default()
        }
    }

    /// Schema of `additionalProperties` when it is given as a schema.
    pub fn additional_schema(&self) -> Option<&SchemaNode> {
        match &self.additional_properties {
            Some(AdditionalProperties::Schema(schema)) => Some(schema.as_ref()),
            _ => None,
        }
    }

    /// True when this node or any descendant still carries `$ref`.
    pub fn has_references(&self) -> bool {
        self.reference.is_some()
            || self.items.as_deref().is_some_and(SchemaNode::has_references)
            || self.properties.values().any(SchemaNode::has_references)
            || self
                .additional_schema()
                .is_some_and(SchemaNode::has_references)
            || self
                .all_of
                .iter()
                .chain(&self.any_of)
                .chain(&self.one_of)
                .any(SchemaNode::has_references)
            || self.not.as_deref().is_some_and(SchemaNode::has_references)
    }

    pub(crate) fn has_combinators(&self) -> bool {
        !self.all_of.is_empty()
            || !self.any_of.is_empty()
            || !self.one_of.is_empty()
            || self.not.is_some()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_and_extensions() {
        let node: SchemaNode = serde_json::from_str(
            r#"{
                "type": "object",
                "properties": {
                    "spec": { "$ref": "pods.v1.PodSpec" },
                    "labels": { "type": "object", "additionalProperties": { "type": "string" } }
                },
                "x-kubernetes-validations": [{ "rule": "has(self.spec)", "message": "spec" }]
            }"#,
        )
        .unwrap();

        assert_eq!(node.schema_type.as_deref(), Some("object"));
        assert_eq!(
            node.properties["spec"].reference.as_deref(),
            Some("pods.v1.PodSpec")
        );
        assert_eq!(
            node.properties["labels"]
                .additional_schema()
                .and_then(|s| s.schema_type.as_deref()),
            Some("string")
        );
        assert_eq!(node.x_validations, vec![Rule::new("has(self.spec)", "spec")]);
        assert!(node.has_references());
    }

    #[test]
    fn additional_properties_accepts_booleans() {
        let node: SchemaNode =
            serde_json::from_str(r#"{"type":"object","additionalProperties":false}"#).unwrap();
        assert_eq!(
            node.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        );
        assert!(node.additional_schema().is_none());
    }

    #[test]
    fn serialization_omits_defaults() {
        let node = SchemaNode::typed("string");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            serde_json::json!({"type": "string"})
        );
    }
}

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::node::{AdditionalProperties, Rule, SchemaNode};

/// Definite kind of a structural schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    /// `x-kubernetes-int-or-string`: an integer or a string.
    IntOrString,
    /// Untyped node under `x-kubernetes-preserve-unknown-fields`.
    Any,
}

impl Kind {
    fn from_type(schema_type: &str) -> Option<Self> {
        match schema_type {
            "object" => Some(Kind::Object),
            "array" => Some(Kind::Array),
            "string" => Some(Kind::String),
            "integer" => Some(Kind::Integer),
            "number" => Some(Kind::Number),
            "boolean" => Some(Kind::Boolean),
            _ => None,
        }
    }

    /// The OpenAPI `type` keyword for this kind, if it has one.
    pub fn schema_type(self) -> Option<&'static str> {
        match self {
            Kind::Object => Some("object"),
            Kind::Array => Some("array"),
            Kind::String => Some("string"),
            Kind::Integer => Some("integer"),
            Kind::Number => Some("number"),
            Kind::Boolean => Some("boolean"),
            Kind::IntOrString | Kind::Any => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Kind::String | Kind::Integer | Kind::Number | Kind::Boolean | Kind::IntOrString
        )
    }
}

/// `x-kubernetes-*` extensions of a structural node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
    pub validations: Vec<Rule>,
    pub int_or_string: bool,
    pub preserve_unknown_fields: bool,
    pub embedded_resource: bool,
    pub list_type: Option<String>,
    pub list_map_keys: Vec<String>,
    pub map_type: Option<String>,
}

/// Value validation carried alongside the structural skeleton.
///
/// None of this drives rule typing except the size limits, which bound
/// the static cost estimate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueValidation {
    pub format: Option<String>,
    pub enum_values: Vec<Value>,
    pub required: Vec<String>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub max_items: Option<u64>,
    pub min_items: Option<u64>,
    pub max_length: Option<u64>,
    pub min_length: Option<u64>,
    pub max_properties: Option<u64>,
    pub min_properties: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub pattern: Option<String>,
    pub all_of: Vec<SchemaNode>,
    pub any_of: Vec<SchemaNode>,
    pub one_of: Vec<SchemaNode>,
    pub not: Option<Box<SchemaNode>>,
}

/// A schema restricted to the structural subset.
///
/// Every node has a definite [`Kind`]; objects have either `properties` or
/// `additional`, never both; arrays always have `items`.
#[derive(Debug, Clone, PartialEq)]
pub struct Structural {
    pub kind: Kind,
    pub description: Option<String>,
    pub properties: BTreeMap<String, Structural>,
    pub additional: Option<Box<Structural>>,
    pub items: Option<Box<Structural>>,
    pub extensions: Extensions,
    pub value_validation: ValueValidation,
}

impl Structural {
    /// A leaf node of the given kind.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            description: None,
            properties: BTreeMap::new(),
            additional: None,
            items: None,
            extensions: Extensions::default(),
            value_validation: ValueValidation::default(),
        }
    }

    /// An object node with the given properties.
    pub fn object(properties: impl IntoIterator<Item = (String, Structural)>) -> Self {
        Self {
            properties: properties.into_iter().collect(),
            ..Self::new(Kind::Object)
        }
    }

    /// An array node with the given items.
    pub fn array(items: Structural) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(Kind::Array)
        }
    }

    /// An object node used as a map with the given value schema.
    pub fn map(values: Structural) -> Self {
        Self {
            additional: Some(Box::new(values)),
            ..Self::new(Kind::Object)
        }
    }

    pub fn property(&self, name: &str) -> Option<&Structural> {
        self.properties.get(name)
    }

    /// Replace the rules attached to this node.
    pub fn attach_rules(&mut self, rules: Vec<Rule>) {
        self.extensions.validations = rules;
    }

    /// Rules attached to this node.
    pub fn rules(&self) -> &[Rule] {
        &self.extensions.validations
    }

    /// Number of rules attached anywhere in the tree.
    pub fn rule_count(&self) -> usize {
        self.extensions.validations.len()
            + self.properties.values().map(Structural::rule_count).sum::<usize>()
            + self.additional.as_deref().map_or(0, Structural::rule_count)
            + self.items.as_deref().map_or(0, Structural::rule_count)
    }

    /// Map back to the unrestricted schema form.
    pub fn to_schema_node(&self) -> SchemaNode {
        let vv = &self.value_validation;
        let ext = &self.extensions;

        let preserve = ext.preserve_unknown_fields || self.kind == Kind::Any;
        SchemaNode {
            reference: None,
            schema_type: self.kind.schema_type().map(str::to_string),
            description: self.description.clone(),
            format: vv.format.clone(),
            properties: self
                .properties
                .iter()
                .map(|(name, property)| (name.clone(), property.to_schema_node()))
                .collect(),
            additional_properties: self
                .additional
                .as_deref()
                .map(|additional| AdditionalProperties::Schema(Box::new(additional.to_schema_node()))),
            items: self
                .items
                .as_deref()
                .map(|items| Box::new(items.to_schema_node())),
            required: vv.required.clone(),
            enum_values: vv.enum_values.clone(),
            nullable: vv.nullable,
            default: vv.default.clone(),
            max_items: vv.max_items,
            min_items: vv.min_items,
            max_length: vv.max_length,
            min_length: vv.min_length,
            max_properties: vv.max_properties,
            min_properties: vv.min_properties,
            minimum: vv.minimum,
            maximum: vv.maximum,
            pattern: vv.pattern.clone(),
            all_of: vv.all_of.clone(),
            any_of: vv.any_of.clone(),
            one_of: vv.one_of.clone(),
            not: vv.not.clone(),
            x_int_or_string: self.kind == Kind::IntOrString,
            x_preserve_unknown_fields: preserve.then_some(true),
            x_embedded_resource: ext.embedded_resource,
            x_list_type: ext.list_type.clone(),
            x_list_map_keys: ext.list_map_keys.clone(),
            x_map_type: ext.map_type.clone(),
            x_validations: ext.validations.clone(),
        }
    }
}

/// Return a copy of `structural` whose root carries `rules`.
pub fn attach(structural: &Structural, rules: Vec<Rule>) -> Structural {
    let mut attached = structural.clone();
    attached.attach_rules(rules);
    attached
}

/// Restrict a resolved schema to the structural subset.
///
/// Every violation is collected, so the error lists all offending paths.
pub fn normalize(schema: &SchemaNode) -> Result<Structural> {
    let mut problems = Vec::new();
    let structural = build(schema, "root", true, &mut problems);

    if problems.is_empty() {
        tracing::debug!(rules = structural.rule_count(), "normalized structural schema");
        Ok(structural)
    } else {
        Err(SchemaError::NonStructural(problems))
    }
}

fn build(node: &SchemaNode, path: &str, is_root: bool, problems: &mut Vec<String>) -> Structural {
    if let Some(reference) = &node.reference {
        problems.push(format!(
            "{path}.$ref: must not be set (unresolved reference {reference})"
        ));
    }

    match node.x_preserve_unknown_fields {
        Some(false) => problems.push(format!(
            "{path}.x-kubernetes-preserve-unknown-fields: must be true or undefined"
        )),
        Some(true) | None => {}
    }
    let preserve = node.x_preserve_unknown_fields == Some(true);

    let kind = if node.x_int_or_string {
        if node.schema_type.is_some() {
            problems.push(format!(
                "{path}.type: must be empty when x-kubernetes-int-or-string is true"
            ));
        }
        Kind::IntOrString
    } else {
        match node.schema_type.as_deref() {
            Some(schema_type) => Kind::from_type(schema_type).unwrap_or_else(|| {
                problems.push(format!("{path}.type: unsupported value \"{schema_type}\""));
                Kind::Any
            }),
            None if preserve => Kind::Any,
            None => {
                problems.push(format!("{path}.type: must not be empty"));
                Kind::Any
            }
        }
    };

    let items = match (&node.items, kind) {
        (Some(items), Kind::Array) => Some(Box::new(build(
            items,
            &format!("{path}.items"),
            false,
            problems,
        ))),
        (Some(_), _) => {
            problems.push(format!("{path}.items: must only be specified for arrays"));
            None
        }
        (None, Kind::Array) => {
            problems.push(format!("{path}.items: must be specified for arrays"));
            None
        }
        (None, _) => None,
    };

    if !node.properties.is_empty() && kind != Kind::Object {
        problems.push(format!("{path}.properties: must only be specified for objects"));
    }
    let properties = node
        .properties
        .iter()
        .map(|(name, property)| {
            let child = build(property, &format!("{path}.properties[{name}]"), false, problems);
            (name.clone(), child)
        })
        .collect::<BTreeMap<_, _>>();

    let additional = match &node.additional_properties {
        None | Some(AdditionalProperties::Allowed(false)) => None,
        Some(AdditionalProperties::Allowed(true)) => {
            problems.push(format!(
                "{path}.additionalProperties: must be a schema or false"
            ));
            None
        }
        Some(AdditionalProperties::Schema(additional)) => {
            if kind != Kind::Object {
                problems.push(format!(
                    "{path}.additionalProperties: must only be specified for objects"
                ));
            }
            if !node.properties.is_empty() {
                problems.push(format!(
                    "{path}.additionalProperties: must not be used together with properties"
                ));
            }
            Some(Box::new(build(
                additional,
                &format!("{path}.additionalProperties"),
                false,
                problems,
            )))
        }
    };

    if node.has_combinators() {
        if is_root {
            check_value_branches(node, path, problems);
        } else {
            problems.push(format!(
                "{path}: allOf, anyOf, oneOf and not are only allowed at the root"
            ));
        }
    }

    if let Some(list_type) = &node.x_list_type {
        if kind != Kind::Array {
            problems.push(format!(
                "{path}.x-kubernetes-list-type: must only be used on arrays"
            ));
        }
        if !matches!(list_type.as_str(), "atomic" | "set" | "map") {
            problems.push(format!(
                "{path}.x-kubernetes-list-type: unsupported value \"{list_type}\""
            ));
        }
    }
    if !node.x_list_map_keys.is_empty() && node.x_list_type.as_deref() != Some("map") {
        problems.push(format!(
            "{path}.x-kubernetes-list-map-keys: requires x-kubernetes-list-type map"
        ));
    }
    if let Some(map_type) = &node.x_map_type {
        if !matches!(map_type.as_str(), "atomic" | "granular") {
            problems.push(format!(
                "{path}.x-kubernetes-map-type: unsupported value \"{map_type}\""
            ));
        }
    }

    Structural {
        kind,
        description: node.description.clone(),
        properties,
        additional,
        items,
        extensions: Extensions {
            validations: node.x_validations.clone(),
            int_or_string: node.x_int_or_string,
            preserve_unknown_fields: preserve,
            embedded_resource: node.x_embedded_resource,
            list_type: node.x_list_type.clone(),
            list_map_keys: node.x_list_map_keys.clone(),
            map_type: node.x_map_type.clone(),
        },
        value_validation: ValueValidation {
            format: node.format.clone(),
            enum_values: node.enum_values.clone(),
            required: node.required.clone(),
            nullable: node.nullable,
            default: node.default.clone(),
            max_items: node.max_items,
            min_items: node.min_items,
            max_length: node.max_length,
            min_length: node.min_length,
            max_properties: node.max_properties,
            min_properties: node.min_properties,
            minimum: node.minimum,
            maximum: node.maximum,
            pattern: node.pattern.clone(),
            all_of: node.all_of.clone(),
            any_of: node.any_of.clone(),
            one_of: node.one_of.clone(),
            not: node.not.clone(),
        },
    }
}

/// Root combinators may only add value validation, never shape.
fn check_value_branches(node: &SchemaNode, path: &str, problems: &mut Vec<String>) {
    let branches = [("allOf", &node.all_of), ("anyOf", &node.any_of), ("oneOf", &node.one_of)];
    for (keyword, branch_list) in branches {
        for (index, branch) in branch_list.iter().enumerate() {
            if declares_shape(branch) {
                problems.push(format!(
                    "{path}.{keyword}[{index}]: must not specify type, properties, items or additionalProperties"
                ));
            }
        }
    }
    if node.not.as_deref().is_some_and(declares_shape) {
        problems.push(format!(
            "{path}.not: must not specify type, properties, items or additionalProperties"
        ));
    }
}

fn declares_shape(branch: &SchemaNode) -> bool {
    branch.reference.is_some()
        || branch.schema_type.is_some()
        || !branch.properties.is_empty()
        || branch.items.is_some()
        || branch.additional_properties.is_some()
        || branch.x_int_or_string
        || branch.x_preserve_unknown_fields.is_some()
}

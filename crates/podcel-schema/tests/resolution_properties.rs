use std::collections::BTreeMap;

use podcel_schema::{normalize, resolve, SchemaNode, SchemaRegistry};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Field {
    Scalar(&'static str),
    Reference(usize),
    ListOf(usize),
    MapOf(usize),
}

fn field_strategy() -> impl Strategy<Value = Field> {
    prop_oneof![
        prop_oneof![
            Just("string"),
            Just("integer"),
            Just("number"),
            Just("boolean")
        ]
        .prop_map(Field::Scalar),
        (1usize..8).prop_map(Field::Reference),
        (1usize..8).prop_map(Field::ListOf),
        (1usize..8).prop_map(Field::MapOf),
    ]
}

/// Definition `i` only references definitions with a larger index, so the
/// generated catalogue is acyclic.
fn catalogue_strategy() -> impl Strategy<Value = Vec<Vec<Field>>> {
    proptest::collection::vec(proptest::collection::vec(field_strategy(), 0..5), 1..6)
}

fn name(index: usize) -> String {
    format!("gen.v1.T{index}")
}

fn target(from: usize, offset: usize, count: usize) -> Option<usize> {
    let to = from + offset;
    (to < count).then_some(to)
}

fn fragment(index: usize, fields: &[Field], count: usize) -> SchemaNode {
    let reference = |to: usize| SchemaNode::reference(name(to));

    let mut properties = BTreeMap::new();
    for (position, field) in fields.iter().enumerate() {
        let key = format!("f{position}");
        let node = match field {
            Field::Scalar(kind) => SchemaNode::typed(*kind),
            Field::Reference(offset) => match target(index, *offset, count) {
                Some(to) => reference(to),
                None => SchemaNode::typed("string"),
            },
            Field::ListOf(offset) => match target(index, *offset, count) {
                Some(to) => SchemaNode {
                    items: Some(Box::new(reference(to))),
                    ..SchemaNode::typed("array")
                },
                None => SchemaNode::typed("boolean"),
            },
            Field::MapOf(offset) => match target(index, *offset, count) {
                Some(to) => SchemaNode {
                    additional_properties: Some(podcel_schema::AdditionalProperties::Schema(
                        Box::new(reference(to)),
                    )),
                    ..SchemaNode::typed("object")
                },
                None => SchemaNode::typed("integer"),
            },
        };
        properties.insert(key, node);
    }

    SchemaNode {
        properties,
        ..SchemaNode::typed("object")
    }
}

fn expanded(index: usize, catalogue: &[Vec<Field>]) -> SchemaNode {
    let mut node = fragment(index, &catalogue[index], catalogue.len());
    substitute(&mut node, catalogue);
    node
}

fn substitute(node: &mut SchemaNode, catalogue: &[Vec<Field>]) {
    if let Some(reference) = node.reference.take() {
        let index: usize = reference.trim_start_matches("gen.v1.T").parse().unwrap();
        *node = expanded(index, catalogue);
        return;
    }
    if let Some(items) = node.items.as_deref_mut() {
        substitute(items, catalogue);
    }
    for property in node.properties.values_mut() {
        substitute(property, catalogue);
    }
    if let Some(podcel_schema::AdditionalProperties::Schema(additional)) =
        node.additional_properties.as_mut()
    {
        substitute(additional, catalogue);
    }
}

fn registry(catalogue: &[Vec<Field>]) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new().unwrap();
    for (index, fields) in catalogue.iter().enumerate() {
        registry
            .register_node(&name(index), fragment(index, fields, catalogue.len()))
            .unwrap();
    }
    registry
}

proptest! {
    #[test]
    fn resolution_removes_every_reference(catalogue in catalogue_strategy()) {
        let registry = registry(&catalogue);
        let resolved = resolve(&registry, &SchemaNode::reference(name(0))).unwrap();
        prop_assert!(!resolved.has_references());
    }

    #[test]
    fn resolution_substitutes_targets_in_place(catalogue in catalogue_strategy()) {
        let registry = registry(&catalogue);
        let resolved = resolve(&registry, &SchemaNode::reference(name(0))).unwrap();
        prop_assert_eq!(resolved, expanded(0, &catalogue));
    }

    #[test]
    fn normalize_is_idempotent(catalogue in catalogue_strategy()) {
        let registry = registry(&catalogue);
        let resolved = resolve(&registry, &SchemaNode::reference(name(0))).unwrap();
        let once = normalize(&resolved).unwrap();
        let twice = normalize(&once.to_schema_node()).unwrap();
        prop_assert_eq!(once, twice);
    }
}

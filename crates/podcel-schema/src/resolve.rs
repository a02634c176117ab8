use crate::error::{Result, SchemaError};
use crate::node::{AdditionalProperties, SchemaNode};
use crate::registry::SchemaRegistry;

/// Inline every `$ref` of `schema` with the registered fragment.
///
/// Nodes are visited in a fixed order: the node itself, then `items`, then
/// each property by name, then `additionalProperties`, then combinator
/// branches. A referencing node is replaced by a copy of its target before
/// its children are visited, so references reached through a target are
/// resolved too. Sibling keywords of `$ref` are discarded.
pub fn resolve(registry: &SchemaRegistry, schema: &SchemaNode) -> Result<SchemaNode> {
    resolve_at(registry, schema, "schema")
}

/// Look up `name` and resolve it into a self-contained schema.
pub fn resolve_definition(registry: &SchemaRegistry, name: &str) -> Result<SchemaNode> {
    let schema = registry.lookup(name)?;
    let resolved = resolve_at(registry, schema, name)?;
    tracing::debug!(definition = name, "resolved definition");
    Ok(resolved)
}

fn resolve_at(registry: &SchemaRegistry, schema: &SchemaNode, root: &str) -> Result<SchemaNode> {
    let mut resolved = schema.clone();
    let mut chain = Vec::new();
    resolve_node(registry, &mut resolved, &mut chain, root)?;
    Ok(resolved)
}

fn resolve_node(
    registry: &SchemaRegistry,
    node: &mut SchemaNode,
    chain: &mut Vec<String>,
    path: &str,
) -> Result<()> {
    let depth = chain.len();

    // A target may itself be a bare reference.
    while let Some(reference) = node.reference.take() {
        if chain.contains(&reference) {
            let mut cycle = chain.clone();
            cycle.push(reference);
            return Err(SchemaError::CyclicSchema { chain: cycle });
        }

        let target = registry
            .lookup(&reference)
            .map_err(|_| SchemaError::UnresolvedReference {
                reference: reference.clone(),
                path: path.to_string(),
            })?;
        *node = target.clone();
        chain.push(reference);
    }

    let result = resolve_children(registry, node, chain, path);
    chain.truncate(depth);
    result
}

fn resolve_children(
    registry: &SchemaRegistry,
    node: &mut SchemaNode,
    chain: &mut Vec<String>,
    path: &str,
) -> Result<()> {
    if let Some(items) = node.items.as_deref_mut() {
        resolve_node(registry, items, chain, &format!("{path}.items"))?;
    }

    for (name, property) in node.properties.iter_mut() {
        resolve_node(
            registry,
            property,
            chain,
            &format!("{path}.properties[{name}]"),
        )?;
    }

    if let Some(AdditionalProperties::Schema(additional)) = node.additional_properties.as_mut() {
        resolve_node(
            registry,
            additional,
            chain,
            &format!("{path}.additionalProperties"),
        )?;
    }

    for (keyword, branches) in [
        ("allOf", &mut node.all_of),
        ("anyOf", &mut node.any_of),
        ("oneOf", &mut node.one_of),
    ] {
        for (index, branch) in branches.iter_mut().enumerate() {
            resolve_node(registry, branch, chain, &format!("{path}.{keyword}[{index}]"))?;
        }
    }

    if let Some(not) = node.not.as_deref_mut() {
        resolve_node(registry, not, chain, &format!("{path}.not"))?;
    }

    Ok(())
}

//! Cost model shared by the static estimator and the runtime meter.
//!
//! Every evaluated node costs one unit. Operations whose work grows with
//! the size of their operands add the extras below, computed from actual
//! sizes at runtime and from maximum sizes statically, so the static
//! estimate bounds the actual cost of any instance within the schema's
//! size limits.

use podcel_schema::{Kind, Structural};

/// Largest request the estimator assumes when a schema declares no limit.
pub const MAX_REQUEST_SIZE_BYTES: u64 = 3 * 1024 * 1024;

/// Cost of one evaluated node.
pub const NODE_COST: u64 = 1;

/// Longest text form of an int, uint, double or bool (`i64::MIN` is 20
/// bytes, shortest-round-trip doubles at most 25).
pub const MAX_SCALAR_STRING_BYTES: u64 = 32;

/// Cost factor applied to string and byte traversals.
const STRING_TRAVERSAL_FACTOR: f64 = 0.1;

/// `ceil(0.1 * size)`
pub fn traversal_cost(size: u64) -> u64 {
    (size as f64 * STRING_TRAVERSAL_FACTOR).ceil() as u64
}

/// Extra cost of comparing two strings or byte sequences.
pub fn string_equality_cost(left: u64, right: u64) -> u64 {
    traversal_cost(left.min(right))
}

/// Extra cost of comparing two lists or maps.
pub fn collection_equality_cost(left: u64, right: u64) -> u64 {
    left.saturating_add(right)
}

/// Extra cost of concatenating strings, bytes or lists.
pub fn concat_cost(left: u64, right: u64) -> u64 {
    traversal_cost(left.saturating_add(right))
}

/// Extra cost of `text.matches(pattern)`.
pub fn matches_cost(text: u64, pattern: u64) -> u64 {
    traversal_cost(text).saturating_add(traversal_cost(pattern))
}

/// Smallest serialized JSON form of a value of `schema`, with its separator.
fn min_serialized_size(schema: &Structural) -> u64 {
    match schema.kind {
        // `"",`
        Kind::String => 3,
        // `0,`
        Kind::Integer | Kind::Number | Kind::IntOrString | Kind::Any => 2,
        // `true,`
        Kind::Boolean => 5,
        // `{},` and `[],`
        Kind::Object | Kind::Array => 3,
    }
}

/// Maximum byte length of a string conforming to `schema`.
pub fn max_string_bytes(schema: &Structural) -> u64 {
    schema
        .value_validation
        .max_length
        .map_or(MAX_REQUEST_SIZE_BYTES, |length| length.saturating_mul(4))
}

/// Maximum number of items of a list conforming to `schema`.
pub fn max_list_items(schema: &Structural) -> u64 {
    if let Some(max_items) = schema.value_validation.max_items {
        return max_items;
    }
    let per_item = schema.items.as_deref().map_or(2, min_serialized_size);
    MAX_REQUEST_SIZE_BYTES / per_item
}

/// Maximum number of entries of a map conforming to `schema`.
pub fn max_map_entries(schema: &Structural) -> u64 {
    if let Some(max_properties) = schema.value_validation.max_properties {
        return max_properties;
    }
    // `"":` precedes every value.
    let per_value = schema.additional.as_deref().map_or(2, min_serialized_size);
    MAX_REQUEST_SIZE_BYTES / (3 + per_value)
}

/// Maximum size of a value of `schema` as seen by the cost model: bytes for
/// strings, items for lists, entries for maps, declared fields for objects.
pub fn max_size(schema: &Structural) -> u64 {
    match schema.kind {
        Kind::String => max_string_bytes(schema),
        Kind::Array => max_list_items(schema),
        Kind::Object if schema.additional.is_some() => max_map_entries(schema),
        Kind::Object if schema.properties.is_empty() && schema.extensions.preserve_unknown_fields => {
            max_map_entries(schema)
        }
        Kind::Object => schema.properties.len() as u64,
        Kind::IntOrString | Kind::Any => MAX_REQUEST_SIZE_BYTES,
        Kind::Integer | Kind::Number | Kind::Boolean => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_rounds_up() {
        assert_eq!(traversal_cost(0), 0);
        assert_eq!(traversal_cost(1), 1);
        assert_eq!(traversal_cost(10), 1);
        assert_eq!(traversal_cost(11), 2);
        assert_eq!(string_equality_cost(100, 6), 1);
        assert_eq!(matches_cost(20, 5), 3);
    }

    #[test]
    fn declared_limits_bound_sizes() {
        let mut name = Structural::new(Kind::String);
        name.value_validation.max_length = Some(63);
        assert_eq!(max_size(&name), 252);

        let mut list = Structural::array(Structural::new(Kind::Integer));
        list.value_validation.max_items = Some(8);
        assert_eq!(max_size(&list), 8);
    }

    #[test]
    fn unbounded_sizes_follow_request_size() {
        let strings = Structural::array(Structural::new(Kind::String));
        assert_eq!(max_size(&strings), MAX_REQUEST_SIZE_BYTES / 3);

        let map = Structural::map(Structural::new(Kind::Boolean));
        assert_eq!(max_size(&map), MAX_REQUEST_SIZE_BYTES / 8);

        assert_eq!(max_size(&Structural::new(Kind::String)), MAX_REQUEST_SIZE_BYTES);
    }
}

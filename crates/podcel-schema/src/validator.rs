use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// JSON Schema describing the shape of one catalogue fragment.
pub const FRAGMENT_META_SCHEMA: &str = include_str!("../catalogue/fragment.schema.json");

pub(crate) fn compile_meta_schema() -> Result<Validator> {
    let schema: Value = serde_json::from_str(FRAGMENT_META_SCHEMA)?;
    jsonschema::validator_for(&schema).map_err(|err| SchemaError::CompileFailed(err.to_string()))
}

pub(crate) fn check_fragment(name: &str, fragment: &Value, validator: &Validator) -> Result<()> {
    let mut errors = validator.iter_errors(fragment);
    if let Some(first) = errors.next() {
        let mut message = first.to_string();
        for err in errors.take(3) {
            message.push_str("; ");
            message.push_str(&err.to_string());
        }
        return Err(SchemaError::InvalidDefinition {
            name: name.to_string(),
            message,
        });
    }

    Ok(())
}

/// Checks the `<group>.<version>.<TypeName>` form of a definition name.
pub(crate) fn check_name(name: &str) -> Result<()> {
    let segments: Vec<&str> = name.split('.').collect();
    let well_formed = segments.len() >= 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        && is_version(segments[segments.len() - 2])
        && segments[segments.len() - 1]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase());

    if well_formed {
        Ok(())
    } else {
        Err(SchemaError::InvalidDefinition {
            name: name.to_string(),
            message: "name must have the form <group>.<version>.<TypeName>".to_string(),
        })
    }
}

fn is_version(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_schema_compiles() {
        assert!(compile_meta_schema().is_ok());
    }

    #[test]
    fn rejects_malformed_fragments() {
        let validator = compile_meta_schema().unwrap();
        let bad = serde_json::json!({"type": "object", "properties": {"a": {"maxItems": -1}}});
        assert!(matches!(
            check_fragment("pods.v1.Bad", &bad, &validator),
            Err(SchemaError::InvalidDefinition { .. })
        ));

        let missing_rule = serde_json::json!({"x-kubernetes-validations": [{"message": "m"}]});
        assert!(check_fragment("pods.v1.Bad", &missing_rule, &validator).is_err());

        let good = serde_json::json!({"type": "array", "items": {"$ref": "pods.v1.Container"}});
        assert!(check_fragment("pods.v1.Good", &good, &validator).is_ok());
    }

    #[test]
    fn checks_qualified_names() {
        assert!(check_name("pods.v1.PodSpec").is_ok());
        assert!(check_name("apps.k8s.io.v1beta1.Deployment").is_ok());
        assert!(check_name("PodSpec").is_err());
        assert!(check_name("pods.v1.podSpec").is_err());
        assert!(check_name("pods.one.PodSpec").is_err());
        assert!(check_name("pods..v1.PodSpec").is_err());
    }
}

//! OpenAPI definition registry and structural schemas for CEL rules.
//!
//! Definitions live in a name-keyed [`SchemaRegistry`] and reference each
//! other through `$ref`. [`resolve`] inlines references into a
//! self-contained tree, [`normalize`] restricts that tree to the
//! [`Structural`] subset the rule compiler types against, and [`attach`]
//! puts `x-kubernetes-validations` rules on a node.

pub mod config;
pub mod error;
pub mod field;
pub mod node;
pub mod registry;
pub mod resolve;
pub mod structural;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use field::{FieldPath, PathElement, Violation, ViolationKind};
pub use node::{AdditionalProperties, Rule, SchemaNode};
pub use registry::{SchemaRegistry, PODS_V1_CATALOGUE};
pub use resolve::{resolve, resolve_definition};
pub use structural::{attach, normalize, Extensions, Kind, Structural, ValueValidation};

/// Look up, resolve and normalize a registered definition.
pub fn load_structural(registry: &SchemaRegistry, name: &str) -> Result<Structural> {
    let resolved = resolve_definition(registry, name)?;
    normalize(&resolved)
}

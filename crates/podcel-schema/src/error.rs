/// Errors raised while loading, resolving or normalizing schemas.
///
/// Every variant is a setup failure: none of them can occur once a
/// structural schema has been produced.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A catalogue could not be loaded.
    #[error("failed to load catalogue: {0}")]
    LoadFailed(String),

    /// The fragment meta-schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// A catalogue or fragment is not valid JSON.
    #[error("catalogue is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A fragment or its name is malformed.
    #[error("invalid definition {name}: {message}")]
    InvalidDefinition { name: String, message: String },

    /// The same name was registered twice.
    #[error("definition {0} is already registered")]
    DuplicateDefinition(String),

    /// No fragment is registered under the requested name.
    #[error("no definition registered for {0}")]
    UnknownDefinition(String),

    /// A `$ref` names a definition missing from the registry.
    #[error("unresolved reference {reference} at {path}")]
    UnresolvedReference { reference: String, path: String },

    /// Reference expansion re-entered a definition it is still expanding.
    #[error("cyclic reference: {}", .chain.join(" -> "))]
    CyclicSchema { chain: Vec<String> },

    /// The schema uses constructs outside the structural subset.
    #[error("{}", .0.join("; "))]
    NonStructural(Vec<String>),
}

impl SchemaError {
    /// Stable snake_case name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaError::LoadFailed(_) => "load_failed",
            SchemaError::CompileFailed(_) => "compile_failed",
            SchemaError::InvalidJson(_) => "invalid_json",
            SchemaError::InvalidDefinition { .. } => "invalid_definition",
            SchemaError::DuplicateDefinition(_) => "duplicate_definition",
            SchemaError::UnknownDefinition(_) => "unknown_definition",
            SchemaError::UnresolvedReference { .. } => "unresolved_reference",
            SchemaError::CyclicSchema { .. } => "cyclic_schema",
            SchemaError::NonStructural(_) => "non_structural_schema",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;

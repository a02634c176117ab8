/// Errors converting between typed pod objects and instances.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    /// The typed value could not be encoded as an instance.
    #[error("failed to encode instance: {0}")]
    Encode(#[source] serde_json::Error),

    /// The instance does not match the typed model.
    #[error("failed to decode instance: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PodError>;

use podcel_cel::CompileError;
use podcel_pod::PodError;
use podcel_schema::{SchemaError, Violation};

/// A failure while preparing a benchmark. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl SetupError {
    /// Snake_case name of the underlying failure.
    pub fn kind(&self) -> &'static str {
        match self {
            SetupError::Schema(err) => err.kind(),
            SetupError::Compile(err) => err.kind(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// No benchmark is registered under the name.
    #[error("unknown benchmark: {0}")]
    UnknownBenchmark(String),

    #[error("setup: {kind}: {0}", kind = .0.kind())]
    Setup(#[from] SetupError),

    /// An iteration could not produce its input after setup succeeded.
    #[error("iteration {iteration}: {source}")]
    Iteration {
        iteration: u64,
        #[source]
        source: PodError,
    },

    /// An iteration produced violations when none were expected, or none
    /// when some were.
    #[error("iteration {iteration}: {}", describe(.violations))]
    Assertion {
        iteration: u64,
        violations: Vec<Violation>,
    },

    /// An iteration disagreed with the first one.
    #[error(
        "iteration {iteration} diverged from iteration 0 with {} violations",
        .violations.len()
    )]
    Diverged {
        iteration: u64,
        violations: Vec<Violation>,
    },
}

fn describe(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return "expected violations, got none".to_string();
    }
    let rendered: Vec<String> = violations.iter().map(ToString::to_string).collect();
    format!("unexpected violations: [{}]", rendered.join("; "))
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_errors_render_with_their_kind() {
        let err = BenchError::from(SetupError::from(CompileError::CostLimitExceeded {
            index: 0,
            path: "root".to_string(),
            rule: "true".to_string(),
            estimate: 2,
            limit: 1,
        }));
        assert_eq!(
            err.to_string(),
            "setup: cost_limit_exceeded: rule 0 at root (true): estimated cost 2 exceeds cost limit 1"
        );
    }

    #[test]
    fn iteration_errors_keep_their_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BenchError::Iteration {
            iteration: 7,
            source: PodError::Encode(source),
        };
        assert!(err.to_string().starts_with("iteration 7: failed to encode instance: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}

use std::fmt;

use podcel::{BenchError, SetupError};

pub const SUCCESS: i32 = 0;
/// A benchmark assertion failed, or `check` found violations.
pub const FAILURE: i32 = 1;
/// Setup failed or the invocation was unusable.
pub const SETUP_FAILED: i32 = 2;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn setup_error(err: SetupError) -> CliError {
    CliError::new(SETUP_FAILED, format!("setup: {}: {err}", err.kind()))
}

pub fn bench_error(name: &str, err: BenchError) -> CliError {
    match err {
        BenchError::Setup(err) => setup_error(err),
        BenchError::UnknownBenchmark(_) => CliError::new(SETUP_FAILED, err.to_string()),
        BenchError::Assertion { .. }
        | BenchError::Diverged { .. }
        | BenchError::Iteration { .. } => {
            CliError::new(FAILURE, format!("{name}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use podcel::pod::PodError;
    use podcel::schema::{FieldPath, SchemaError, Violation, ViolationKind};

    use super::*;

    #[test]
    fn setup_errors_name_their_kind() {
        let err = bench_error(
            "podspec-cel",
            BenchError::Setup(SetupError::Schema(SchemaError::UnknownDefinition(
                "pods.v1.Nope".to_string(),
            ))),
        );
        assert_eq!(err.code, SETUP_FAILED);
        assert_eq!(
            err.message,
            "setup: unknown_definition: no definition registered for pods.v1.Nope"
        );
    }

    #[test]
    fn iteration_failures_exit_one() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = bench_error(
            "podspec-cel",
            BenchError::Iteration {
                iteration: 0,
                source: PodError::Encode(source),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(
            err.message.starts_with("podspec-cel: iteration 0: failed to encode instance"),
            "{}",
            err.message
        );
    }

    #[test]
    fn assertion_failures_exit_one() {
        let err = bench_error(
            "podspec-cel",
            BenchError::Assertion {
                iteration: 4,
                violations: vec![Violation::new(
                    FieldPath::new("root"),
                    ViolationKind::RuleViolation,
                    "restartPolicy",
                )],
            },
        );
        assert_eq!(err.code, FAILURE);
        assert_eq!(
            err.message,
            "podspec-cel: iteration 4: unexpected violations: [root: rule_violation: restartPolicy]"
        );
    }
}

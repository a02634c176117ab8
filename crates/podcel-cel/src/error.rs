use thiserror::Error;

/// Syntax error with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

/// Setup-time failure compiling a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("rule {index} at {path} ({rule}): {diagnostic}")]
    Invalid {
        index: usize,
        path: String,
        rule: String,
        diagnostic: String,
    },

    #[error(
        "rule {index} at {path} ({rule}): estimated cost {estimate} exceeds cost limit {limit}"
    )]
    CostLimitExceeded {
        index: usize,
        path: String,
        rule: String,
        estimate: u64,
        limit: u64,
    },
}

impl CompileError {
    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Invalid { .. } => "compile_error",
            CompileError::CostLimitExceeded { .. } => "cost_limit_exceeded",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            CompileError::Invalid { index, .. } | CompileError::CostLimitExceeded { index, .. } => {
                *index
            }
        }
    }
}

/// Runtime failure of a single rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("no matching overload for '{function}' applied to ({args})")]
    NoMatchingOverload { function: String, args: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(i128),

    #[error("type conversion error: {0}")]
    Conversion(String),

    #[error("invalid regular expression: {0}")]
    Regex(String),

    #[error("value does not match schema: {0}")]
    SchemaMismatch(String),

    #[error("undeclared reference to '{0}'")]
    UndeclaredReference(String),

    #[error("validation cancelled")]
    Cancelled,

    #[error("operation cancelled: actual cost limit exceeded")]
    BudgetExhausted,
}

impl EvalError {
    pub(crate) fn no_overload<S: AsRef<str>>(function: &str, args: &[S]) -> Self {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        EvalError::NoMatchingOverload {
            function: function.to_string(),
            args: args.join(", "),
        }
    }

    /// Budget and cancellation errors are never absorbed by `&&`, `||`
    /// or comprehension short-circuiting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::BudgetExhausted | EvalError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

//! CEL rule compilation, cost estimation and evaluation over structural schemas.
//!
//! Rules are typed against a [`Structural`](podcel_schema::Structural) node
//! with `self` bound to the node's instance type. Compilation produces a
//! [`Program`] plus a static worst-case cost that never undercounts the
//! actual cost metered during evaluation.
//!
//! - [`compile`] checks a rule list, optionally against a per-rule cost limit
//! - [`validate`] evaluates compiled rules under a shared runtime budget
//! - [`Validator`] compiles rules at every schema node and walks instances

mod ast;
pub mod cancel;
mod checker;
pub mod cost;
pub mod error;
mod eval;
mod functions;
mod lexer;
mod parser;
pub mod program;
pub mod types;
pub mod validator;
pub mod value;

pub use cancel::CancelHandle;
pub use cost::{MAX_REQUEST_SIZE_BYTES, NODE_COST};
pub use error::{CompileError, EvalError, ParseError, Result};
pub use program::{compile, estimate_cost, Activation, CompiledRule, Program};
pub use types::CelType;
pub use validator::{validate, Validator};
pub use value::Value;

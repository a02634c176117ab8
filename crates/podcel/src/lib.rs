//! PodSpec validation benchmarks: CEL rules versus native Rust checks.
//!
//! # Crate Structure
//!
//! - [`bench`]: benchmark targets and the timing loop
//! - [`fixtures`]: canonical rules and PodSpec samples
//! - [`schema`], [`cel`], [`pod`]: re-exports of the underlying crates

pub mod bench;
pub mod error;
pub mod fixtures;

pub use bench::{
    all_targets, get_target, list_target_ids, run, BenchOptions, BenchReport, BenchTarget,
    Expectation, DEFAULT_ITERATIONS,
};
pub use error::{BenchError, Result, SetupError};

/// Re-export schema types.
pub mod schema {
    pub use podcel_schema::*;
}

/// Re-export rule compiler types.
pub mod cel {
    pub use podcel_cel::*;
}

/// Re-export typed pod objects.
pub mod pod {
    pub use podcel_pod::*;
}

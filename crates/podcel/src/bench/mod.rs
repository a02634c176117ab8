//! Benchmark targets and the driver loop.
//!
//! A [`BenchTarget`] prepares a [`Workload`] once; [`run`] then times
//! `iterations` calls of [`Workload::run_once`], checking each result
//! against the target's [`Expectation`] and against the first iteration.

mod targets;

use std::time::{Duration, Instant};

use podcel_pod::PodError;
use podcel_schema::Violation;

use crate::error::{BenchError, Result, SetupError};

pub use targets::{CelTarget, NativeTarget};

pub const DEFAULT_ITERATIONS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchOptions {
    pub iterations: u64,
    /// Per-rule compile ceiling and per-iteration runtime budget. `None`
    /// is unlimited.
    pub cost_limit: Option<u64>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            cost_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    NoViolations,
    Violations,
}

impl Expectation {
    pub fn holds(self, violations: &[Violation]) -> bool {
        match self {
            Expectation::NoViolations => violations.is_empty(),
            Expectation::Violations => !violations.is_empty(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Expectation::NoViolations => "none",
            Expectation::Violations => "some",
        }
    }
}

/// One benchmark: how to set it up and what each iteration must return.
pub trait BenchTarget: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn expectation(&self) -> Expectation;

    /// One-time preparation, excluded from timing.
    fn setup(&self, options: &BenchOptions) -> std::result::Result<Box<dyn Workload>, SetupError>;
}

/// Prepared, immutable state of a benchmark.
pub trait Workload {
    /// Build a fresh input and validate it.
    fn run_once(&self) -> std::result::Result<Vec<Violation>, PodError>;
}

pub fn all_targets() -> Vec<Box<dyn BenchTarget>> {
    vec![
        Box::new(CelTarget::happy()),
        Box::new(CelTarget::unsupported_restart_policy()),
        Box::new(NativeTarget::invalid()),
        Box::new(NativeTarget::happy()),
    ]
}

pub fn get_target(id: &str) -> Option<Box<dyn BenchTarget>> {
    all_targets().into_iter().find(|target| target.id() == id)
}

pub fn list_target_ids() -> Vec<String> {
    all_targets()
        .iter()
        .map(|target| target.id().to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    pub name: String,
    pub iterations: u64,
    /// Time spent inside iterations; setup is excluded.
    pub total: Duration,
    pub ns_per_op: u64,
    /// Violations of the first iteration. Every other iteration matched.
    pub violations: Vec<Violation>,
}

/// Run the benchmark registered as `name`.
pub fn run(name: &str, options: BenchOptions) -> Result<BenchReport> {
    let target = get_target(name).ok_or_else(|| BenchError::UnknownBenchmark(name.to_string()))?;
    run_target(target.as_ref(), options)
}

pub fn run_target(target: &dyn BenchTarget, options: BenchOptions) -> Result<BenchReport> {
    let setup_start = Instant::now();
    let workload = target.setup(&options)?;
    tracing::debug!(
        target_id = target.id(),
        elapsed_us = setup_start.elapsed().as_micros() as u64,
        "benchmark setup complete"
    );

    let expectation = target.expectation();
    let mut total = Duration::ZERO;
    let mut first: Option<Vec<Violation>> = None;

    for iteration in 0..options.iterations {
        let start = Instant::now();
        let violations = workload
            .run_once()
            .map_err(|source| BenchError::Iteration { iteration, source })?;
        total += start.elapsed();

        if !expectation.holds(&violations) {
            return Err(BenchError::Assertion {
                iteration,
                violations,
            });
        }
        match &first {
            None => first = Some(violations),
            Some(expected) if *expected != violations => {
                return Err(BenchError::Diverged {
                    iteration,
                    violations,
                });
            }
            Some(_) => {}
        }
    }

    let ns_per_op = match options.iterations {
        0 => 0,
        iterations => u64::try_from(total.as_nanos() / u128::from(iterations)).unwrap_or(u64::MAX),
    };
    tracing::debug!(
        target_id = target.id(),
        iterations = options.iterations,
        ns_per_op,
        "benchmark finished"
    );

    Ok(BenchReport {
        name: target.id().to_string(),
        iterations: options.iterations,
        total,
        ns_per_op,
        violations: first.unwrap_or_default(),
    })
}

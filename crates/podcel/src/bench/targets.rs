use podcel_cel::{CancelHandle, Validator};
use podcel_pod::{validate_pod_spec, PodError, PodSpec, ToInstance};
use podcel_schema::{
    attach, normalize, resolve_definition, FieldPath, SchemaRegistry, Violation,
};

use super::{BenchOptions, BenchTarget, Expectation, Workload};
use crate::error::SetupError;
use crate::fixtures;

/// Validates a PodSpec instance with the canonical CEL rules.
pub struct CelTarget {
    id: &'static str,
    description: &'static str,
    expectation: Expectation,
    sample: fn() -> PodSpec,
}

impl CelTarget {
    pub fn happy() -> Self {
        Self {
            id: "podspec-cel",
            description: "CEL rules against a valid, defaulted PodSpec",
            expectation: Expectation::NoViolations,
            sample: fixtures::happy_pod_spec,
        }
    }

    pub fn unsupported_restart_policy() -> Self {
        Self {
            id: "podspec-cel-invalid",
            description: "CEL rules against a PodSpec with restartPolicy Sometimes",
            expectation: Expectation::Violations,
            sample: fixtures::unsupported_restart_pod_spec,
        }
    }
}

impl BenchTarget for CelTarget {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        self.description
    }

    fn expectation(&self) -> Expectation {
        self.expectation
    }

    fn setup(&self, options: &BenchOptions) -> Result<Box<dyn Workload>, SetupError> {
        let registry = SchemaRegistry::pods_v1()?;
        let resolved = resolve_definition(&registry, fixtures::POD_SPEC_DEFINITION)?;
        let structural = normalize(&resolved)?;
        tracing::debug!(
            definition = fixtures::POD_SPEC_DEFINITION,
            properties = structural.properties.len(),
            "normalized schema"
        );

        let schema = attach(&structural, fixtures::canonical_rules());
        let validator = Validator::new(&schema, options.cost_limit)?;

        Ok(Box::new(CelWorkload {
            validator,
            root: FieldPath::new(fixtures::ROOT_PATH),
            budget: options.cost_limit.unwrap_or(u64::MAX),
            sample: self.sample,
            cancel: CancelHandle::never(),
        }))
    }
}

struct CelWorkload {
    validator: Validator,
    root: FieldPath,
    budget: u64,
    sample: fn() -> PodSpec,
    cancel: CancelHandle,
}

impl Workload for CelWorkload {
    fn run_once(&self) -> Result<Vec<Violation>, PodError> {
        let instance = (self.sample)().to_instance()?;
        // Old and new are the same object, as for an unchanged update.
        let (violations, _) = self.validator.validate(
            &self.root,
            Some(&instance),
            &instance,
            self.budget,
            &self.cancel,
        );
        Ok(violations)
    }
}

/// Validates a typed PodSpec with the native validator.
pub struct NativeTarget {
    id: &'static str,
    description: &'static str,
    expectation: Expectation,
    sample: fn() -> PodSpec,
}

impl NativeTarget {
    pub fn invalid() -> Self {
        Self {
            id: "podspec-native",
            description: "native validation of a PodSpec with restartPolicy +invalid",
            expectation: Expectation::Violations,
            sample: fixtures::invalid_restart_pod_spec,
        }
    }

    pub fn happy() -> Self {
        Self {
            id: "podspec-native-valid",
            description: "native validation of a valid, defaulted PodSpec",
            expectation: Expectation::NoViolations,
            sample: fixtures::happy_pod_spec,
        }
    }
}

impl BenchTarget for NativeTarget {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        self.description
    }

    fn expectation(&self) -> Expectation {
        self.expectation
    }

    fn setup(&self, _options: &BenchOptions) -> Result<Box<dyn Workload>, SetupError> {
        Ok(Box::new(NativeWorkload {
            sample: self.sample,
        }))
    }
}

struct NativeWorkload {
    sample: fn() -> PodSpec,
}

impl Workload for NativeWorkload {
    fn run_once(&self) -> Result<Vec<Violation>, PodError> {
        Ok(validate_pod_spec(&(self.sample)()))
    }
}

//! Inputs shared by the benchmark targets.

use podcel_pod::{set_pod_spec_defaults, Container, PodSpec};
use podcel_schema::Rule;

/// Registry name of the benchmarked definition.
pub const POD_SPEC_DEFINITION: &str = "pods.v1.PodSpec";

/// Root of every CEL violation path.
pub const ROOT_PATH: &str = "root";

/// Rules attached to the PodSpec root for the CEL targets.
pub fn canonical_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "has(self.containers) && self.containers.size() > 0",
            "containers must not be empty",
        ),
        Rule::new(
            "has(self.restartPolicy) && (self.restartPolicy == 'Always' || self.restartPolicy == 'OnFailure' || self.restartPolicy == 'Never')",
            "restartPolicy",
        ),
    ]
}

/// One `debian` container named `foo`, restart policy `Always`, defaulted.
pub fn happy_pod_spec() -> PodSpec {
    let mut spec = PodSpec {
        containers: vec![Container::new("foo", "debian")],
        restart_policy: Some("Always".to_string()),
        ..PodSpec::default()
    };
    set_pod_spec_defaults(&mut spec);
    spec
}

pub fn unsupported_restart_pod_spec() -> PodSpec {
    PodSpec {
        containers: vec![Container::new("c", "x")],
        restart_policy: Some("Sometimes".to_string()),
        ..PodSpec::default()
    }
}

/// Not defaulted, so native validation reports everything it lacks.
pub fn invalid_restart_pod_spec() -> PodSpec {
    PodSpec {
        restart_policy: Some("+invalid".to_string()),
        ..PodSpec::default()
    }
}

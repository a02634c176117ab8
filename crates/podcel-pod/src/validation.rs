//! Native pod validation.
//!
//! Checks a typed [`PodSpec`] directly, without schemas or rules. Paths are
//! rooted at `spec`.

use std::collections::HashSet;
use std::sync::LazyLock;

use podcel_schema::{FieldPath, Violation, ViolationKind};
use regex::Regex;

use crate::model::{Container, ContainerPort, EnvVar, PodSpec, Volume};

pub const RESTART_POLICIES: &[&str] = &["Always", "OnFailure", "Never"];
pub const DNS_POLICIES: &[&str] = &["ClusterFirstWithHostNet", "ClusterFirst", "Default", "None"];
pub const PULL_POLICIES: &[&str] = &["Always", "Never", "IfNotPresent"];
pub const TERMINATION_MESSAGE_POLICIES: &[&str] = &["File", "FallbackToLogsOnError"];
pub const PORT_PROTOCOLS: &[&str] = &["TCP", "UDP", "SCTP"];

const DNS_LABEL_MAX_LENGTH: usize = 63;

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label regex is valid")
});

static ENV_VAR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[-._a-zA-Z][-._a-zA-Z0-9]*$").expect("env var name regex is valid")
});

/// Validate a pod spec, returning every violation found.
pub fn validate_pod_spec(spec: &PodSpec) -> Vec<Violation> {
    let root = FieldPath::new("spec");
    let mut errs = Errors::default();

    let volumes = root.child("volumes");
    let mut volume_names = HashSet::new();
    for (index, volume) in spec.volumes.iter().enumerate() {
        validate_volume(volume, &volumes.index(index), &mut volume_names, &mut errs);
    }

    let mut container_names = HashSet::new();
    let init_containers = root.child("initContainers");
    for (index, container) in spec.init_containers.iter().enumerate() {
        validate_container(
            container,
            &init_containers.index(index),
            &mut container_names,
            &mut errs,
        );
    }
    let containers = root.child("containers");
    if spec.containers.is_empty() {
        errs.required(containers.clone());
    }
    for (index, container) in spec.containers.iter().enumerate() {
        validate_container(
            container,
            &containers.index(index),
            &mut container_names,
            &mut errs,
        );
    }

    errs.supported(
        root.child("restartPolicy"),
        spec.restart_policy.as_deref(),
        RESTART_POLICIES,
    );
    errs.supported(
        root.child("dnsPolicy"),
        spec.dns_policy.as_deref(),
        DNS_POLICIES,
    );

    if let Some(seconds) = spec.active_deadline_seconds {
        if seconds <= 0 {
            errs.invalid(
                root.child("activeDeadlineSeconds"),
                &seconds.to_string(),
                "must be greater than zero",
            );
        }
    }
    if let Some(seconds) = spec.termination_grace_period_seconds {
        if seconds < 0 {
            errs.invalid(
                root.child("terminationGracePeriodSeconds"),
                &seconds.to_string(),
                "must be greater than or equal to 0",
            );
        }
    }
    if let Some(hostname) = spec.hostname.as_deref() {
        errs.dns_label(root.child("hostname"), hostname);
    }

    tracing::trace!(violations = errs.list.len(), "validated pod spec natively");
    errs.list
}

fn validate_volume(
    volume: &Volume,
    path: &FieldPath,
    names: &mut HashSet<String>,
    errs: &mut Errors,
) {
    let name_path = path.child("name");
    if volume.name.is_empty() {
        errs.required(name_path);
        return;
    }
    errs.dns_label(name_path.clone(), &volume.name);
    if !names.insert(volume.name.clone()) {
        errs.duplicate(name_path, &volume.name);
    }
}

fn validate_container(
    container: &Container,
    path: &FieldPath,
    names: &mut HashSet<String>,
    errs: &mut Errors,
) {
    let name_path = path.child("name");
    if container.name.is_empty() {
        errs.required(name_path);
    } else {
        errs.dns_label(name_path.clone(), &container.name);
        if !names.insert(container.name.clone()) {
            errs.duplicate(name_path, &container.name);
        }
    }

    if container.image.as_deref().is_none_or(|image| image.trim().is_empty()) {
        errs.required(path.child("image"));
    }

    errs.supported(
        path.child("imagePullPolicy"),
        container.image_pull_policy.as_deref(),
        PULL_POLICIES,
    );
    errs.supported(
        path.child("terminationMessagePolicy"),
        container.termination_message_policy.as_deref(),
        TERMINATION_MESSAGE_POLICIES,
    );

    let ports = path.child("ports");
    for (index, port) in container.ports.iter().enumerate() {
        validate_port(port, &ports.index(index), errs);
    }

    let env = path.child("env");
    for (index, var) in container.env.iter().enumerate() {
        validate_env_var(var, &env.index(index), errs);
    }
}

fn validate_port(port: &ContainerPort, path: &FieldPath, errs: &mut Errors) {
    errs.port_number(path.child("containerPort"), port.container_port);
    if let Some(host_port) = port.host_port.filter(|&host_port| host_port != 0) {
        errs.port_number(path.child("hostPort"), host_port);
    }
    errs.supported(
        path.child("protocol"),
        port.protocol.as_deref(),
        PORT_PROTOCOLS,
    );
}

fn validate_env_var(var: &EnvVar, path: &FieldPath, errs: &mut Errors) {
    let name_path = path.child("name");
    if var.name.is_empty() {
        errs.required(name_path);
    } else if !ENV_VAR_NAME.is_match(&var.name) {
        errs.invalid(
            name_path,
            &var.name,
            "a valid environment variable name must consist of alphabetic characters, digits, '_', '-', or '.', and must not start with a digit",
        );
    }
}

#[derive(Default)]
struct Errors {
    list: Vec<Violation>,
}

impl Errors {
    fn required(&mut self, path: FieldPath) {
        self.list
            .push(Violation::new(path, ViolationKind::Required, "Required value"));
    }

    fn invalid(&mut self, path: FieldPath, value: &str, detail: &str) {
        self.list.push(Violation::new(
            path,
            ViolationKind::Invalid,
            format!("Invalid value: {value:?}: {detail}"),
        ));
    }

    fn duplicate(&mut self, path: FieldPath, value: &str) {
        self.list.push(Violation::new(
            path,
            ViolationKind::Duplicate,
            format!("Duplicate value: {value:?}"),
        ));
    }

    /// Required, and one of `supported`.
    fn supported(&mut self, path: FieldPath, value: Option<&str>, supported: &[&str]) {
        match value {
            None | Some("") => self.required(path),
            Some(value) if supported.contains(&value) => {}
            Some(value) => {
                let listed: Vec<String> = supported.iter().map(|s| format!("{s:?}")).collect();
                self.list.push(Violation::new(
                    path,
                    ViolationKind::NotSupported,
                    format!(
                        "Unsupported value: {value:?}: supported values: {}",
                        listed.join(", ")
                    ),
                ));
            }
        }
    }

    fn dns_label(&mut self, path: FieldPath, value: &str) {
        if value.len() > DNS_LABEL_MAX_LENGTH {
            self.invalid(path, value, "must be no more than 63 characters");
        } else if !DNS_LABEL.is_match(value) {
            self.invalid(
                path,
                value,
                "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character",
            );
        }
    }

    fn port_number(&mut self, path: FieldPath, port: i32) {
        if !(1..=65535).contains(&port) {
            self.invalid(
                path,
                &port.to_string(),
                "must be between 1 and 65535, inclusive",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::set_pod_spec_defaults;
    use crate::model::{ContainerPort, EnvVar};

    fn happy() -> PodSpec {
        let mut spec = PodSpec {
            containers: vec![Container::new("foo", "debian")],
            restart_policy: Some("Always".to_string()),
            ..PodSpec::default()
        };
        set_pod_spec_defaults(&mut spec);
        spec
    }

    fn rendered(violations: &[Violation]) -> Vec<String> {
        violations.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaulted_happy_case_is_valid() {
        assert!(validate_pod_spec(&happy()).is_empty());
    }

    #[test]
    fn invalid_restart_policy_reports_everything_missing() {
        let spec = PodSpec {
            restart_policy: Some("+invalid".to_string()),
            ..PodSpec::default()
        };
        let violations = validate_pod_spec(&spec);
        assert_eq!(
            rendered(&violations),
            vec![
                "spec.containers: required: Required value".to_string(),
                "spec.restartPolicy: not_supported: Unsupported value: \"+invalid\": supported values: \"Always\", \"OnFailure\", \"Never\"".to_string(),
                "spec.dnsPolicy: required: Required value".to_string(),
            ]
        );
    }

    #[test]
    fn container_names_are_unique_across_init_containers() {
        let mut spec = happy();
        spec.init_containers.push(Container::new("foo", "busybox"));
        set_pod_spec_defaults(&mut spec);

        let violations = validate_pod_spec(&spec);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Duplicate);
        assert_eq!(violations[0].path.to_string(), "spec.containers[0].name");
    }

    #[test]
    fn container_fields_are_checked() {
        let mut spec = happy();
        let container = &mut spec.containers[0];
        container.name = "Not_A_Label".to_string();
        container.image = Some(" ".to_string());
        container.image_pull_policy = Some("Sometimes".to_string());
        container.ports = vec![ContainerPort {
            container_port: 70000,
            protocol: Some("ICMP".to_string()),
            ..ContainerPort::default()
        }];
        container.env = vec![
            EnvVar {
                name: "1BAD".to_string(),
                ..EnvVar::default()
            },
            EnvVar {
                name: "GOOD_NAME".to_string(),
                value: Some("x".to_string()),
                ..EnvVar::default()
            },
        ];

        let violations = validate_pod_spec(&spec);
        let paths: Vec<String> = violations.iter().map(|v| v.path.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "spec.containers[0].name",
                "spec.containers[0].image",
                "spec.containers[0].imagePullPolicy",
                "spec.containers[0].ports[0].containerPort",
                "spec.containers[0].ports[0].protocol",
                "spec.containers[0].env[0].name",
            ]
        );
        assert_eq!(violations[1].kind, ViolationKind::Required);
        assert_eq!(violations[2].kind, ViolationKind::NotSupported);
    }

    #[test]
    fn pod_level_numbers_and_hostname() {
        let mut spec = happy();
        spec.active_deadline_seconds = Some(0);
        spec.termination_grace_period_seconds = Some(-1);
        spec.hostname = Some("a".repeat(64));
        let kinds: Vec<ViolationKind> = validate_pod_spec(&spec).iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::Invalid; 3]);
    }

    #[test]
    fn volume_names_are_unique_labels() {
        let mut spec = happy();
        spec.volumes = vec![
            Volume {
                name: "data".to_string(),
                ..Volume::default()
            },
            Volume {
                name: "data".to_string(),
                ..Volume::default()
            },
            Volume::default(),
        ];
        let violations = validate_pod_spec(&spec);
        assert_eq!(
            rendered(&violations),
            vec![
                "spec.volumes[1].name: duplicate: Duplicate value: \"data\"".to_string(),
                "spec.volumes[2].name: required: Required value".to_string(),
            ]
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let spec = PodSpec {
            restart_policy: Some("+invalid".to_string()),
            ..PodSpec::default()
        };
        assert_eq!(validate_pod_spec(&spec), validate_pod_spec(&spec));
    }
}

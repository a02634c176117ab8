//! Defaulting applied before validation.

use crate::model::{Container, PodSecurityContext, PodSpec};

pub const DEFAULT_RESTART_POLICY: &str = "Always";
pub const DEFAULT_DNS_POLICY: &str = "ClusterFirst";
pub const DEFAULT_SCHEDULER_NAME: &str = "default-scheduler";
pub const DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
pub const DEFAULT_TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
pub const DEFAULT_TERMINATION_MESSAGE_POLICY: &str = "File";
pub const DEFAULT_PORT_PROTOCOL: &str = "TCP";

/// Fill unset pod fields with their defaults. Set fields are left alone,
/// so applying this twice is the same as applying it once.
pub fn set_pod_spec_defaults(spec: &mut PodSpec) {
    default_str(&mut spec.restart_policy, DEFAULT_RESTART_POLICY);
    default_str(&mut spec.dns_policy, DEFAULT_DNS_POLICY);
    default_str(&mut spec.scheduler_name, DEFAULT_SCHEDULER_NAME);
    if spec.termination_grace_period_seconds.is_none() {
        spec.termination_grace_period_seconds = Some(DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS);
    }
    if spec.security_context.is_none() {
        spec.security_context = Some(PodSecurityContext::default());
    }

    for container in spec
        .init_containers
        .iter_mut()
        .chain(spec.containers.iter_mut())
    {
        set_container_defaults(container);
    }
}

pub fn set_container_defaults(container: &mut Container) {
    default_str(
        &mut container.termination_message_path,
        DEFAULT_TERMINATION_MESSAGE_PATH,
    );
    default_str(
        &mut container.termination_message_policy,
        DEFAULT_TERMINATION_MESSAGE_POLICY,
    );
    if container.image_pull_policy.is_none() {
        let policy = image_pull_policy(container.image.as_deref().unwrap_or_default());
        container.image_pull_policy = Some(policy.to_string());
    }
    for port in &mut container.ports {
        default_str(&mut port.protocol, DEFAULT_PORT_PROTOCOL);
    }
}

/// `Always` for untagged or `:latest` images, `IfNotPresent` otherwise.
/// Digest references count as tagged.
pub fn image_pull_policy(image: &str) -> &'static str {
    if image.contains('@') {
        return "IfNotPresent";
    }
    // A colon before the last slash belongs to a registry port.
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.rsplit_once(':') {
        Some((_, "latest")) | None => "Always",
        Some(_) => "IfNotPresent",
    }
}

fn default_str(field: &mut Option<String>, value: &str) {
    if field.is_none() {
        *field = Some(value.to_string());
    }
}

//! Conversion between typed objects and schemaless instances.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PodError, Result};

/// Encode a typed value as a schemaless instance tree.
///
/// Fields a type skips when unset are absent from the instance; explicit
/// zero values are kept.
pub trait ToInstance {
    fn to_instance(&self) -> Result<Value>;
}

impl<T: Serialize + ?Sized> ToInstance for T {
    fn to_instance(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(PodError::Encode)
    }
}

/// Decode an instance back into its typed form.
pub fn from_instance<T: DeserializeOwned>(instance: &Value) -> Result<T> {
    T::deserialize(instance).map_err(PodError::Decode)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::defaults::set_pod_spec_defaults;
    use crate::model::{Container, PodSpec};

    #[test]
    fn absent_fields_are_omitted() {
        let spec = PodSpec {
            restart_policy: Some("+invalid".to_string()),
            ..PodSpec::default()
        };
        assert_eq!(
            spec.to_instance().unwrap(),
            json!({"containers": [], "restartPolicy": "+invalid"})
        );
    }

    #[test]
    fn defaulted_happy_case() {
        let mut spec = PodSpec {
            containers: vec![Container::new("foo", "debian")],
            restart_policy: Some("Always".to_string()),
            ..PodSpec::default()
        };
        set_pod_spec_defaults(&mut spec);

        assert_eq!(
            spec.to_instance().unwrap(),
            json!({
                "containers": [{
                    "name": "foo",
                    "image": "debian",
                    "terminationMessagePath": "/dev/termination-log",
                    "terminationMessagePolicy": "File",
                    "imagePullPolicy": "Always"
                }],
                "restartPolicy": "Always",
                "terminationGracePeriodSeconds": 30,
                "dnsPolicy": "ClusterFirst",
                "securityContext": {},
                "schedulerName": "default-scheduler"
            })
        );
    }

    #[test]
    fn acronym_fields_keep_their_names() {
        let spec = PodSpec {
            host_pid: true,
            host_ipc: true,
            host_network: true,
            ..PodSpec::default()
        };
        let instance = spec.to_instance().unwrap();
        assert_eq!(instance["hostPID"], json!(true));
        assert_eq!(instance["hostIPC"], json!(true));
        assert_eq!(instance["hostNetwork"], json!(true));
    }

    #[test]
    fn decode_rejects_mismatched_types() {
        let err = from_instance::<PodSpec>(&json!({"containers": "nope"})).unwrap_err();
        assert!(matches!(err, PodError::Decode(_)));
    }
}

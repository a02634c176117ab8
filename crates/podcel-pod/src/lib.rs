//! Typed pod objects and the native side of the validation comparison.
//!
//! [`model`] holds the typed API objects, [`defaults`] fills unset fields,
//! [`instance`] bridges typed values to schemaless instance trees and
//! [`validation`] checks a pod spec directly in Rust.

pub mod defaults;
pub mod error;
pub mod instance;
pub mod model;
pub mod validation;

pub use defaults::set_pod_spec_defaults;
pub use error::{PodError, Result};
pub use instance::{from_instance, ToInstance};
pub use model::{Container, ContainerPort, EnvVar, IntOrString, PodSpec, Volume};
pub use validation::validate_pod_spec;

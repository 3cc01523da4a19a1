//! Structured plan errors, each carrying the offending path (§4.1 "Failure").

use warden_types::{CheckName, LayerLabel, ServiceName};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("layer {label}: malformed YAML: {source}")]
    MalformedYaml {
        label: LayerLabel,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("layer {label}: service {service}: unknown override mode {value:?}")]
    UnknownOverride {
        label: LayerLabel,
        service: String,
        value: String,
    },

    #[error("service {service}: missing required field `command`")]
    MissingCommand { service: ServiceName },

    #[error("check {check}: no probe specified (expected exactly one of http, tcp, exec)")]
    MissingProbe { check: CheckName },

    #[error("check {check}: more than one probe specified (expected exactly one of http, tcp, exec)")]
    AmbiguousProbe { check: CheckName },

    #[error("service {from}: {field} references unknown service {to}")]
    UnknownServiceRef {
        from: ServiceName,
        field: &'static str,
        to: ServiceName,
    },

    #[error("service {service}: on-check-failure references unknown check {check}")]
    UnknownCheckRef {
        service: ServiceName,
        check: CheckName,
    },

    #[error("dependency cycle detected among services: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    DependencyCycle(Vec<ServiceName>),

    #[error("service {service}: backoff factor must be >= 1, got {factor}")]
    InvalidBackoffFactor { service: ServiceName, factor: f64 },

    #[error("service {service}: backoff initial delay must be > 0")]
    InvalidBackoffInitialDelay { service: ServiceName },

    #[error("duplicate layer label on append: {0}")]
    DuplicateLabel(LayerLabel),

    #[error("unknown layer label: {0}")]
    UnknownLabel(LayerLabel),
}

pub type PlanResult<T> = Result<T, PlanError>;

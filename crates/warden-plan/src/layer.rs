//! The as-parsed shape of a single configuration layer (§4.1): one YAML
//! document plus the bookkeeping (`label`, `order`) the combiner needs to
//! fold it into the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_types::{CheckName, LayerLabel, ServiceName};

use crate::spec::{CheckSpecPartial, ServiceSpecPartial};

/// A named entry's raw `override:` field, kept as a string until the
/// combiner validates it — an unrecognized value is a structured error
/// (§4.1 "neither replace nor merge"), not a deserialization failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceEntry {
    #[serde(rename = "override")]
    pub override_mode: String,
    #[serde(flatten)]
    pub spec: ServiceSpecPartial,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckEntry {
    #[serde(rename = "override")]
    pub override_mode: String,
    #[serde(flatten)]
    pub spec: CheckSpecPartial,
}

/// One layer file's contents (`layers/NNN-label.yaml`), before the label
/// and order index are attached.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LayerYaml {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<ServiceName, ServiceEntry>,
    #[serde(default)]
    pub checks: BTreeMap<CheckName, CheckEntry>,
}

/// A layer positioned within a plan's stack.
#[derive(Debug, Clone)]
pub struct Layer {
    pub label: LayerLabel,
    pub order: u64,
    pub summary: Option<String>,
    pub services: BTreeMap<ServiceName, ServiceEntry>,
    pub checks: BTreeMap<CheckName, CheckEntry>,
}

impl Layer {
    pub fn parse(label: LayerLabel, order: u64, yaml: &str) -> Result<Self, crate::PlanError> {
        let parsed: LayerYaml = serde_yaml::from_str(yaml).map_err(|source| crate::PlanError::MalformedYaml {
            label: label.clone(),
            source,
        })?;
        Ok(Self {
            label,
            order,
            summary: parsed.summary,
            services: parsed.services,
            checks: parsed.checks,
        })
    }
}

//! Layered plan parsing, merging, and validation (§4.1, C1).
//!
//! A [`Plan`] is the flattened, validated result of folding an ordered
//! stack of [`Layer`]s together by the replace/merge rules in §4.1. This
//! crate does no I/O: callers (the state store, the CLI) own reading layer
//! files from disk and persisting the combined result.

mod combine;
mod duration;
mod error;
mod layer;
mod spec;
mod validate;

pub use combine::{add_layer, combine, flatten, AddMode, LayerMeta, Plan};
pub use error::{PlanError, PlanResult};
pub use layer::{CheckEntry, Layer, LayerYaml, ServiceEntry};
pub use spec::{
    BackoffSpec, CheckSpec, CheckSpecPartial, ExecProbePartial, HttpProbePartial, ProbeSpec, ServiceSpec,
    ServiceSpecPartial, TcpProbePartial,
};

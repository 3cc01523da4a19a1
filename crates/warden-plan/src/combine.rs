//! Field-level replace/merge combination (§4.1) and the public `combine`,
//! `add_layer`, `flatten` operations.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use warden_types::{CheckName, LayerLabel, OverrideMode, ServiceName};

use crate::layer::Layer;
use crate::spec::{CheckSpec, CheckSpecPartial, ServiceSpec, ServiceSpecPartial};
use crate::{PlanError, PlanResult};

/// `append` starts a fresh labeled layer at the top of the stack; `combine`
/// merges the given YAML into an existing label's layer in place (§4.1
/// `addLayer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    Append,
    Combine,
}

/// The flattened, validated result of combining a layer stack. Frozen and
/// identified by a content hash (§3 "Plan ... frozen; identified by
/// content hash"): callers atomically swap in a newly combined `Plan`
/// rather than mutating one in place.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub layers: Vec<LayerMeta>,
    pub services: BTreeMap<ServiceName, ServiceSpec>,
    pub checks: BTreeMap<CheckName, CheckSpec>,
    pub hash: String,
}

fn content_hash(services: &BTreeMap<ServiceName, ServiceSpec>, checks: &BTreeMap<CheckName, CheckSpec>) -> String {
    let mut hasher = Sha256::new();
    for (name, spec) in services {
        hasher.update(name.as_str().as_bytes());
        hasher.update(format!("{spec:?}").as_bytes());
    }
    for (name, spec) in checks {
        hasher.update(name.as_str().as_bytes());
        hasher.update(format!("{spec:?}").as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[derive(Debug, Clone)]
pub struct LayerMeta {
    pub label: LayerLabel,
    pub order: u64,
    pub summary: Option<String>,
}

fn parse_override(label: &LayerLabel, service_or_check: &str, raw: &str) -> PlanResult<OverrideMode> {
    match raw {
        "replace" => Ok(OverrideMode::Replace),
        "merge" => Ok(OverrideMode::Merge),
        other => Err(PlanError::UnknownOverride {
            label: label.clone(),
            service: service_or_check.to_string(),
            value: other.to_string(),
        }),
    }
}

fn merge_scalar<T>(base: Option<T>, next: Option<T>) -> Option<T> {
    next.or(base)
}

fn merge_map<K: Ord, V>(base: Option<BTreeMap<K, V>>, next: Option<BTreeMap<K, V>>) -> Option<BTreeMap<K, V>> {
    match (base, next) {
        (Some(mut base), Some(next)) => {
            base.extend(next);
            Some(base)
        }
        (base, None) => base,
        (None, Some(next)) => Some(next),
    }
}

fn merge_ordered_list<T: PartialEq + Clone>(base: Option<Vec<T>>, next: Option<Vec<T>>) -> Option<Vec<T>> {
    match (base, next) {
        (Some(mut base), Some(next)) => {
            for item in next {
                if !base.contains(&item) {
                    base.push(item);
                }
            }
            Some(base)
        }
        (base, None) => base,
        (None, Some(next)) => Some(next),
    }
}

fn merge_service_partial(base: ServiceSpecPartial, next: ServiceSpecPartial) -> ServiceSpecPartial {
    ServiceSpecPartial {
        command: merge_scalar(base.command, next.command),
        environment: merge_map(base.environment, next.environment),
        working_dir: merge_scalar(base.working_dir, next.working_dir),
        user: merge_scalar(base.user, next.user),
        group: merge_scalar(base.group, next.group),
        startup: merge_scalar(base.startup, next.startup),
        restart: merge_scalar(base.restart, next.restart),
        backoff: merge_scalar(base.backoff, next.backoff),
        requires: merge_ordered_list(base.requires, next.requires),
        before: merge_ordered_list(base.before, next.before),
        after: merge_ordered_list(base.after, next.after),
        kill_delay: merge_scalar(base.kill_delay, next.kill_delay),
        okay_delay: merge_scalar(base.okay_delay, next.okay_delay),
        on_check_failure: merge_map(base.on_check_failure, next.on_check_failure),
        log_targets: merge_scalar(base.log_targets, next.log_targets),
        on_start: merge_scalar(base.on_start, next.on_start),
        on_stop: merge_scalar(base.on_stop, next.on_stop),
    }
}

fn merge_check_partial(base: CheckSpecPartial, next: CheckSpecPartial) -> CheckSpecPartial {
    CheckSpecPartial {
        level: merge_scalar(base.level, next.level),
        period: merge_scalar(base.period, next.period),
        timeout: merge_scalar(base.timeout, next.timeout),
        threshold: merge_scalar(base.threshold, next.threshold),
        startup: merge_scalar(base.startup, next.startup),
        http: merge_scalar(base.http, next.http),
        tcp: merge_scalar(base.tcp, next.tcp),
        exec: merge_scalar(base.exec, next.exec),
    }
}

/// Fold a named entry's per-layer contributions (in layer order) down to a
/// single partial, per the §4.1 rule: take the latest `replace`, discard
/// anything before it, then fold `merge` entries forward.
fn fold_entries<P: Clone + Default>(
    name: &str,
    entries: Vec<(LayerLabel, &str, P)>,
    merge_fn: impl Fn(P, P) -> P,
) -> PlanResult<P> {
    let mut modes = Vec::with_capacity(entries.len());
    for (label, raw, _) in &entries {
        modes.push(parse_override(label, name, raw)?);
    }

    let last_replace = modes.iter().rposition(|m| *m == OverrideMode::Replace);
    let start = last_replace.unwrap_or(0);
    let mut acc = if last_replace.is_some() {
        entries[start].2.clone()
    } else {
        P::default()
    };

    let fold_start = if last_replace.is_some() { start + 1 } else { start };
    for idx in fold_start..entries.len() {
        acc = merge_fn(acc, entries[idx].2.clone());
    }
    Ok(acc)
}

/// Flatten an ordered layer stack into a validated `Plan` (§4.1 `combine`).
pub fn combine(layers: &[Layer]) -> PlanResult<Plan> {
    let mut service_entries: BTreeMap<ServiceName, Vec<(LayerLabel, &str, ServiceSpecPartial)>> = BTreeMap::new();
    let mut check_entries: BTreeMap<CheckName, Vec<(LayerLabel, &str, CheckSpecPartial)>> = BTreeMap::new();

    let mut sorted_layers: Vec<&Layer> = layers.iter().collect();
    sorted_layers.sort_by_key(|l| l.order);

    for layer in &sorted_layers {
        for (name, entry) in &layer.services {
            service_entries.entry(name.clone()).or_default().push((
                layer.label.clone(),
                entry.override_mode.as_str(),
                entry.spec.clone(),
            ));
        }
        for (name, entry) in &layer.checks {
            check_entries.entry(name.clone()).or_default().push((
                layer.label.clone(),
                entry.override_mode.as_str(),
                entry.spec.clone(),
            ));
        }
    }

    let mut services = BTreeMap::new();
    for (name, entries) in service_entries {
        let folded = fold_entries(name.as_str(), entries, merge_service_partial)?;
        services.insert(name.clone(), ServiceSpec::from_partial(&name, folded)?);
    }

    let mut checks = BTreeMap::new();
    for (name, entries) in check_entries {
        let folded = fold_entries(name.as_str(), entries, merge_check_partial)?;
        checks.insert(name.clone(), CheckSpec::from_partial(&name, folded)?);
    }

    let hash = content_hash(&services, &checks);
    let plan = Plan {
        layers: sorted_layers
            .iter()
            .map(|l| LayerMeta {
                label: l.label.clone(),
                order: l.order,
                summary: l.summary.clone(),
            })
            .collect(),
        services,
        checks,
        hash,
    };

    crate::validate::validate(&plan)?;
    Ok(plan)
}

/// `addLayer(plan, label, layerYAML, mode)` (§4.1): applies a single new
/// layer to an existing set of raw layers and recombines. Callers own the
/// raw `Layer` list (e.g. the state store keeps it for persistence); this
/// function is the pure transformation over that list plus the new input.
pub fn add_layer(
    mut layers: Vec<Layer>,
    label: LayerLabel,
    layer_yaml: &str,
    mode: AddMode,
) -> PlanResult<(Vec<Layer>, Plan)> {
    match mode {
        AddMode::Append => {
            if layers.iter().any(|l| l.label == label) {
                return Err(PlanError::DuplicateLabel(label));
            }
            let next_order = layers.iter().map(|l| l.order).max().map_or(0, |m| m + 1);
            let new_layer = Layer::parse(label, next_order, layer_yaml)?;
            layers.push(new_layer);
        }
        AddMode::Combine => {
            let existing = layers
                .iter()
                .find(|l| l.label == label)
                .ok_or_else(|| PlanError::UnknownLabel(label.clone()))?;
            let order = existing.order;
            let parsed = Layer::parse(label.clone(), order, layer_yaml)?;
            let target = layers.iter_mut().find(|l| l.label == label).expect("checked above");
            target.services.extend(parsed.services);
            target.checks.extend(parsed.checks);
            if parsed.summary.is_some() {
                target.summary = parsed.summary;
            }
        }
    }

    let plan = combine(&layers)?;
    Ok((layers, plan))
}

/// `flatten(plan) -> yaml` (§4.1): a single merged layer with stable key
/// order (`BTreeMap` gives us that for free), tagged `override: replace`
/// since it already represents the fully-resolved state.
pub fn flatten(plan: &Plan) -> Result<String, serde_yaml::Error> {
    #[derive(serde::Serialize)]
    struct FlatEntry<'a, S> {
        #[serde(rename = "override")]
        override_mode: &'static str,
        #[serde(flatten)]
        spec: &'a S,
    }

    #[derive(serde::Serialize)]
    struct FlatPlan<'a> {
        services: BTreeMap<&'a ServiceName, FlatEntry<'a, ServiceSpec>>,
        checks: BTreeMap<&'a CheckName, FlatEntry<'a, CheckSpec>>,
    }

    let flat = FlatPlan {
        services: plan
            .services
            .iter()
            .map(|(k, v)| (k, FlatEntry { override_mode: "replace", spec: v }))
            .collect(),
        checks: plan
            .checks
            .iter()
            .map(|(k, v)| (k, FlatEntry { override_mode: "replace", spec: v }))
            .collect(),
    };

    serde_yaml::to_string(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(label: &str, order: u64, yaml: &str) -> Layer {
        Layer::parse(LayerLabel::new(label), order, yaml).unwrap()
    }

    #[test]
    fn replace_then_merge_env_unions_with_later_winning() {
        let base = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/a"]
    environment: {X: "1", Y: "2"}
"#,
        );
        let overlay = layer(
            "01-overlay",
            1,
            r#"
services:
  a:
    override: merge
    environment: {Y: "9", Z: "3"}
"#,
        );

        let plan = combine(&[base, overlay]).unwrap();
        let svc = &plan.services[&ServiceName::new("a")];
        assert_eq!(svc.environment[&"Y".to_string()], "9");
        assert_eq!(svc.environment[&"Z".to_string()], "3");
        assert_eq!(svc.environment[&"X".to_string()], "1");
    }

    #[test]
    fn later_replace_discards_earlier_layers_entirely() {
        let base = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/old"]
    environment: {X: "1"}
"#,
        );
        let replace_again = layer(
            "01-again",
            1,
            r#"
services:
  a:
    override: replace
    command: ["/bin/new"]
"#,
        );

        let plan = combine(&[base, replace_again]).unwrap();
        let svc = &plan.services[&ServiceName::new("a")];
        assert_eq!(svc.command, vec!["/bin/new".to_string()]);
        assert!(svc.environment.is_empty());
    }

    #[test]
    fn ordered_lists_append_and_dedupe() {
        let base = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/a"]
    requires: ["b"]
  b:
    override: replace
    command: ["/bin/b"]
"#,
        );
        let overlay = layer(
            "01-overlay",
            1,
            r#"
services:
  a:
    override: merge
    requires: ["b", "c"]
  c:
    override: replace
    command: ["/bin/c"]
"#,
        );

        let plan = combine(&[base, overlay]).unwrap();
        let svc = &plan.services[&ServiceName::new("a")];
        assert_eq!(svc.requires, vec![ServiceName::new("b"), ServiceName::new("c")]);
    }

    #[test]
    fn unknown_override_mode_is_rejected() {
        let base = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: delete
    command: ["/bin/a"]
"#,
        );
        let err = combine(&[base]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownOverride { .. }));
    }

    #[test]
    fn append_rejects_duplicate_label() {
        let layers = vec![layer("00-base", 0, "services: {}\n")];
        let err = add_layer(layers, LayerLabel::new("00-base"), "services: {}\n", AddMode::Append).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateLabel(_)));
    }

    #[test]
    fn combine_mode_requires_existing_label() {
        let layers = vec![layer("00-base", 0, "services: {}\n")];
        let err = add_layer(layers, LayerLabel::new("missing"), "services: {}\n", AddMode::Combine).unwrap_err();
        assert!(matches!(err, PlanError::UnknownLabel(_)));
    }
}

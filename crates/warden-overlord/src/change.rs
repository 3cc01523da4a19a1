//! Translates a planner order into a `Change`'s tasks, wiring `wait_for`
//! edges by position the way §4.7 describes: "the planner produces tasks
//! with wait-for edges matching the order; the work loop then enforces
//! ordering implicitly."

use std::collections::{BTreeSet, HashMap};

use warden_plan::Plan;
use warden_planner::OrderedTask;
use warden_store::{DataMap, Scope, Store};
use warden_types::{ChangeKind, ServiceName, TaskKind};

use crate::OverlordResult;

pub fn ordered_change(
    store: &Store,
    plan: &Plan,
    kind: ChangeKind,
    task_kind: TaskKind,
    targets: Vec<ServiceName>,
    order: impl FnOnce(&Plan, &BTreeSet<ServiceName>) -> warden_planner::PlannerResult<Vec<OrderedTask>>,
) -> OverlordResult<warden_store::Change> {
    let targets: BTreeSet<ServiceName> = targets.into_iter().collect();
    let scope = single_service_scope(&targets);
    let ordered = order(plan, &targets)?;

    let position: HashMap<&ServiceName, usize> = ordered.iter().enumerate().map(|(i, t)| (&t.service, i)).collect();

    let task_specs = ordered
        .iter()
        .map(|task| {
            let wait_for = task.wait_for.iter().filter_map(|dep| position.get(dep).copied()).collect();
            let mut data = DataMap::new();
            data.insert("service".to_string(), serde_json::Value::String(task.service.as_str().to_string()));
            (task_kind.clone(), wait_for, data)
        })
        .collect();

    Ok(store.create_change(kind, scope, task_specs)?)
}

/// A Change scoped to a service only makes sense when exactly one is
/// targeted; multi-service operations (e.g. autostart) are left unscoped.
fn single_service_scope(targets: &BTreeSet<ServiceName>) -> Option<Scope> {
    let mut iter = targets.iter();
    match (iter.next(), iter.next()) {
        (Some(only), None) => Some(Scope::Service(only.clone())),
        _ => None,
    }
}

/// A flat Change (no ordering) of one `run-check` task per check, used for
/// check autostart (§4.6, ChangeKind::PerformCheck).
pub fn flat_check_change(store: &Store, names: Vec<warden_types::CheckName>) -> OverlordResult<warden_store::Change> {
    let task_specs = names
        .into_iter()
        .map(|name| {
            let mut data = DataMap::new();
            data.insert("check".to_string(), serde_json::Value::String(name.as_str().to_string()));
            (TaskKind::RunCheck, Vec::new(), data)
        })
        .collect();
    Ok(store.create_change(ChangeKind::PerformCheck, None, task_specs)?)
}

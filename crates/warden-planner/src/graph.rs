//! Ordering graph over a flattened [`Plan`]'s `requires`/`before`/`after`
//! edges (§4.7), plus a deterministic topological sort. `warden_plan`'s own
//! `validate::detect_cycle` only needs *a* consistent edge direction to spot
//! cycles; the planner needs the *correct* precedence direction to produce a
//! real start/stop order, so the graph here is built independently of it.

use std::collections::{BTreeMap, BTreeSet};

use warden_plan::Plan;
use warden_types::ServiceName;

use crate::{PlannerError, PlannerResult};

/// `predecessors[x]` is the set of services that must reach their terminal
/// state (running, for start; stopped, for stop) before `x` may proceed.
///
/// - `x requires y` => `y` precedes `x`.
/// - `x before y` => `x` precedes `y`.
/// - `x after y` => `y` precedes `x`.
pub fn predecessors(plan: &Plan) -> BTreeMap<ServiceName, BTreeSet<ServiceName>> {
    let mut predecessors: BTreeMap<ServiceName, BTreeSet<ServiceName>> =
        plan.services.keys().map(|name| (name.clone(), BTreeSet::new())).collect();

    for (name, svc) in &plan.services {
        for req in &svc.requires {
            predecessors.entry(name.clone()).or_default().insert(req.clone());
        }
        for before in &svc.before {
            predecessors.entry(before.clone()).or_default().insert(name.clone());
        }
        for after in &svc.after {
            predecessors.entry(name.clone()).or_default().insert(after.clone());
        }
    }
    predecessors
}

/// `successors[x]` is the reverse of `predecessors`: services that wait on
/// `x`.
pub fn successors(predecessors: &BTreeMap<ServiceName, BTreeSet<ServiceName>>) -> BTreeMap<ServiceName, BTreeSet<ServiceName>> {
    let mut successors: BTreeMap<ServiceName, BTreeSet<ServiceName>> = predecessors.keys().map(|name| (name.clone(), BTreeSet::new())).collect();
    for (node, preds) in predecessors {
        for pred in preds {
            successors.entry(pred.clone()).or_default().insert(node.clone());
        }
    }
    successors
}

/// Kahn's algorithm, always picking the lexicographically smallest
/// ready node so the order is deterministic and tie-broken by name
/// (§4.7 "Tie-break deterministically by name").
pub fn topological_order(predecessors: &BTreeMap<ServiceName, BTreeSet<ServiceName>>) -> PlannerResult<Vec<ServiceName>> {
    let successors = successors(predecessors);
    let mut remaining: BTreeMap<ServiceName, BTreeSet<ServiceName>> = predecessors.clone();
    let mut ready: BTreeSet<ServiceName> = remaining.iter().filter(|(_, preds)| preds.is_empty()).map(|(name, _)| name.clone()).collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(next) = ready.iter().next().cloned() {
        ready.remove(&next);
        remaining.remove(&next);
        order.push(next.clone());

        if let Some(waiting) = successors.get(&next) {
            for succ in waiting {
                if let Some(preds) = remaining.get_mut(succ) {
                    preds.remove(&next);
                    if preds.is_empty() {
                        ready.insert(succ.clone());
                    }
                }
            }
        }
    }

    if order.len() != predecessors.len() {
        return Err(PlannerError::Cycle);
    }
    Ok(order)
}

/// Transitive `requires` closure reachable forward from `targets` (§4.7
/// "include each transitive requires closure").
pub fn requires_closure(plan: &Plan, targets: &BTreeSet<ServiceName>) -> BTreeSet<ServiceName> {
    let mut closure = targets.clone();
    let mut stack: Vec<ServiceName> = targets.iter().cloned().collect();
    while let Some(name) = stack.pop() {
        let Some(svc) = plan.services.get(&name) else { continue };
        for req in &svc.requires {
            if closure.insert(req.clone()) {
                stack.push(req.clone());
            }
        }
    }
    closure
}

/// Reverse dependency closure: every service that, directly or
/// transitively, `requires` something in `targets` (§4.7 "include every
/// service that currently requires a service in the set").
pub fn dependents_closure(plan: &Plan, targets: &BTreeSet<ServiceName>) -> BTreeSet<ServiceName> {
    let mut closure = targets.clone();
    loop {
        let mut grown = false;
        for (name, svc) in &plan.services {
            if closure.contains(name) {
                continue;
            }
            if svc.requires.iter().any(|req| closure.contains(req)) {
                closure.insert(name.clone());
                grown = true;
            }
        }
        if !grown {
            return closure;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn names(n: usize) -> Vec<ServiceName> {
        (0..n).map(|i| ServiceName::new(format!("svc-{i}"))).collect()
    }

    /// Builds a `predecessors` map over `names` where edges only ever point
    /// from a later index to an earlier one, which guarantees the graph is
    /// acyclic regardless of which edges the strategy picks.
    fn acyclic_predecessors(n: usize, edge_bits: &[bool]) -> BTreeMap<ServiceName, BTreeSet<ServiceName>> {
        let names = names(n);
        let mut preds: BTreeMap<ServiceName, BTreeSet<ServiceName>> = names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();
        let mut bit = 0;
        for i in 0..n {
            for j in 0..i {
                if edge_bits.get(bit).copied().unwrap_or(false) {
                    preds.get_mut(&names[i]).unwrap().insert(names[j].clone());
                }
                bit += 1;
            }
        }
        preds
    }

    proptest! {
        #[test]
        fn topological_order_always_respects_every_predecessor(edge_bits in prop::collection::vec(any::<bool>(), 0..21)) {
            let preds = acyclic_predecessors(6, &edge_bits);
            let order = topological_order(&preds).unwrap();

            prop_assert_eq!(order.len(), preds.len());

            let position: BTreeMap<&ServiceName, usize> = order.iter().enumerate().map(|(i, n)| (n, i)).collect();
            for (node, node_preds) in &preds {
                for pred in node_preds {
                    prop_assert!(position[pred] < position[node]);
                }
            }
        }
    }

    #[test]
    fn a_direct_two_cycle_is_reported_rather_than_silently_truncated() {
        let names = names(2);
        let mut preds: BTreeMap<ServiceName, BTreeSet<ServiceName>> = BTreeMap::new();
        preds.entry(names[0].clone()).or_default().insert(names[1].clone());
        preds.entry(names[1].clone()).or_default().insert(names[0].clone());

        assert!(matches!(topological_order(&preds), Err(PlannerError::Cycle)));
    }
}

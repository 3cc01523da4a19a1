//! Cross-reference validation over a flattened plan (§4.1 "Cross-reference
//! validation runs after flattening"): referenced names must exist, the
//! dependency graph must be acyclic, and `on-check-failure` keys must name
//! real checks.

use std::collections::HashMap;

use warden_types::ServiceName;

use crate::combine::Plan;
use crate::{PlanError, PlanResult};

pub fn validate(plan: &Plan) -> PlanResult<()> {
    for (name, svc) in &plan.services {
        for (field, refs) in [("requires", &svc.requires), ("before", &svc.before), ("after", &svc.after)] {
            for to in refs {
                if !plan.services.contains_key(to) {
                    return Err(PlanError::UnknownServiceRef {
                        from: name.clone(),
                        field,
                        to: to.clone(),
                    });
                }
            }
        }
        for check in svc.on_check_failure.keys() {
            if !plan.checks.contains_key(check) {
                return Err(PlanError::UnknownCheckRef {
                    service: name.clone(),
                    check: check.clone(),
                });
            }
        }
    }

    detect_cycle(plan)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// `requires`, `before`, and `after` all induce ordering edges (§4.7's
/// planner uses the same graph); a cycle among any of them is rejected
/// here rather than deferred to the planner, per §4.1.
fn detect_cycle(plan: &Plan) -> PlanResult<()> {
    let mut edges: HashMap<&ServiceName, Vec<&ServiceName>> = HashMap::new();
    for name in plan.services.keys() {
        edges.entry(name).or_default();
    }
    for (name, svc) in &plan.services {
        edges.entry(name).or_default().extend(svc.requires.iter());
        edges.entry(name).or_default().extend(svc.before.iter());
        for after in &svc.after {
            edges.entry(after).or_default().push(name);
        }
    }

    let mut marks: HashMap<&ServiceName, Mark> = HashMap::new();
    let mut stack = Vec::new();

    for start in plan.services.keys() {
        if marks.contains_key(start) {
            continue;
        }
        if let Some(cycle) = visit(start, &edges, &mut marks, &mut stack) {
            return Err(PlanError::DependencyCycle(cycle));
        }
    }
    Ok(())
}

fn visit<'a>(
    node: &'a ServiceName,
    edges: &HashMap<&'a ServiceName, Vec<&'a ServiceName>>,
    marks: &mut HashMap<&'a ServiceName, Mark>,
    stack: &mut Vec<&'a ServiceName>,
) -> Option<Vec<ServiceName>> {
    marks.insert(node, Mark::Active);
    stack.push(node);

    if let Some(children) = edges.get(node) {
        for &child in children {
            match marks.get(child) {
                Some(Mark::Active) => {
                    let start = stack.iter().position(|&n| n == child).unwrap_or(0);
                    let mut cycle: Vec<ServiceName> = stack[start..].iter().map(|&n| n.clone()).collect();
                    cycle.push(child.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => continue,
                None => {
                    if let Some(cycle) = visit(child, edges, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

#[cfg(test)]
mod tests {
    use warden_types::LayerLabel;

    use crate::combine::combine;
    use crate::layer::Layer;
    use crate::PlanError;

    fn layer(label: &str, order: u64, yaml: &str) -> Layer {
        Layer::parse(LayerLabel::new(label), order, yaml).unwrap()
    }

    #[test]
    fn unknown_requires_reference_is_rejected() {
        let l = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/a"]
    requires: ["missing"]
"#,
        );
        let err = combine(&[l]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownServiceRef { .. }));
    }

    #[test]
    fn unknown_on_check_failure_reference_is_rejected() {
        let l = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/a"]
    on_check_failure: {missing-check: restart}
"#,
        );
        let err = combine(&[l]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownCheckRef { .. }));
    }

    #[test]
    fn direct_requires_cycle_is_rejected() {
        let l = layer(
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
    requires: ["a"]
"#,
        );
        let err = combine(&[l]).unwrap_err();
        assert!(matches!(err, PlanError::DependencyCycle(_)));
    }

    #[test]
    fn acyclic_chain_is_accepted() {
        let l = layer(
            "00-base",
            0,
            r#"
services:
  a:
    override: replace
    command: ["/bin/a"]
  b:
    override: replace
    command: ["/bin/b"]
    requires: ["a"]
  c:
    override: replace
    command: ["/bin/c"]
    requires: ["b"]
"#,
        );
        assert!(combine(&[l]).is_ok());
    }
}

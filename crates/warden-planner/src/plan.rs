//! Public entry points: `start`/`stop` ordering over a [`Plan`] (§4.7, C7).

use std::collections::BTreeSet;

use warden_plan::Plan;
use warden_types::ServiceName;

use crate::graph;
use crate::PlannerResult;

/// One service's position in a computed start or stop order, plus the
/// other services in the same order it must wait on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedTask {
    pub service: ServiceName,
    pub wait_for: Vec<ServiceName>,
}

/// `start S`: the transitive `requires` closure of `targets`, topologically
/// sorted so each service only starts once its predecessors are `running`
/// (§4.4, §4.7).
pub fn plan_start(plan: &Plan, targets: &BTreeSet<ServiceName>) -> PlannerResult<Vec<OrderedTask>> {
    let closure = graph::requires_closure(plan, targets);
    let predecessors = graph::predecessors(plan);
    let order = graph::topological_order(&predecessors)?;

    Ok(order
        .into_iter()
        .filter(|name| closure.contains(name))
        .map(|name| {
            let wait_for = predecessors
                .get(&name)
                .into_iter()
                .flatten()
                .filter(|p| closure.contains(*p))
                .cloned()
                .collect();
            OrderedTask { service: name, wait_for }
        })
        .collect())
}

/// `stop S`: the reverse dependency closure of `targets` (every service that
/// requires one of them, transitively), reverse-topologically sorted so
/// dependents stop before what they depend on (§4.4, §4.7).
pub fn plan_stop(plan: &Plan, targets: &BTreeSet<ServiceName>) -> PlannerResult<Vec<OrderedTask>> {
    let closure = graph::dependents_closure(plan, targets);
    let predecessors = graph::predecessors(plan);
    let successors = graph::successors(&predecessors);
    let mut order = graph::topological_order(&predecessors)?;
    order.reverse();

    Ok(order
        .into_iter()
        .filter(|name| closure.contains(name))
        .map(|name| {
            let wait_for = successors
                .get(&name)
                .into_iter()
                .flatten()
                .filter(|s| closure.contains(*s))
                .cloned()
                .collect();
            OrderedTask { service: name, wait_for }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use warden_types::LayerLabel;

    use super::*;
    use warden_plan::{combine, Layer};

    fn plan_from(yaml: &str) -> Plan {
        let layer = Layer::parse(LayerLabel::new("00-base"), 0, yaml).unwrap();
        combine(&[layer]).unwrap()
    }

    fn names(tasks: &[OrderedTask]) -> Vec<String> {
        tasks.iter().map(|t| t.service.as_str().to_string()).collect()
    }

    fn svc(name: &str) -> ServiceName {
        ServiceName::new(name)
    }

    fn set(names: &[&str]) -> BTreeSet<ServiceName> {
        names.iter().map(|n| svc(n)).collect()
    }

    #[test]
    fn start_orders_a_requires_chain_dependencies_first() {
        let plan = plan_from(
            r#"
services:
  c:
    override: replace
    command: ["/bin/c"]
    requires: ["b"]
  b:
    override: replace
    command: ["/bin/b"]
    requires: ["a"]
  a:
    override: replace
    command: ["/bin/a"]
"#,
        );

        let order = plan_start(&plan, &set(&["c"])).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn start_pulls_in_the_full_requires_closure_even_when_unrequested() {
        let plan = plan_from(
            r#"
services:
  web:
    override: replace
    command: ["/bin/web"]
    requires: ["db"]
  db:
    override: replace
    command: ["/bin/db"]
  unrelated:
    override: replace
    command: ["/bin/unrelated"]
"#,
        );

        let order = plan_start(&plan, &set(&["web"])).unwrap();
        assert_eq!(names(&order), vec!["db", "web"]);
    }

    #[test]
    fn start_ties_are_broken_alphabetically() {
        let plan = plan_from(
            r#"
services:
  zeta:
    override: replace
    command: ["/bin/zeta"]
  alpha:
    override: replace
    command: ["/bin/alpha"]
"#,
        );

        let order = plan_start(&plan, &set(&["zeta", "alpha"])).unwrap();
        assert_eq!(names(&order), vec!["alpha", "zeta"]);
    }

    #[test]
    fn before_and_after_hints_influence_order_without_expanding_the_closure() {
        let plan = plan_from(
            r#"
services:
  first:
    override: replace
    command: ["/bin/first"]
    before: ["second"]
  second:
    override: replace
    command: ["/bin/second"]
"#,
        );

        let order = plan_start(&plan, &set(&["first", "second"])).unwrap();
        assert_eq!(names(&order), vec!["first", "second"]);
    }

    #[test]
    fn stop_orders_dependents_before_their_dependency() {
        let plan = plan_from(
            r#"
services:
  web:
    override: replace
    command: ["/bin/web"]
    requires: ["db"]
  db:
    override: replace
    command: ["/bin/db"]
"#,
        );

        let order = plan_stop(&plan, &set(&["db"])).unwrap();
        assert_eq!(names(&order), vec!["web", "db"]);
    }

    #[test]
    fn stop_pulls_in_transitive_dependents() {
        let plan = plan_from(
            r#"
services:
  api:
    override: replace
    command: ["/bin/api"]
    requires: ["web"]
  web:
    override: replace
    command: ["/bin/web"]
    requires: ["db"]
  db:
    override: replace
    command: ["/bin/db"]
"#,
        );

        let order = plan_stop(&plan, &set(&["db"])).unwrap();
        assert_eq!(names(&order), vec!["api", "web", "db"]);
    }

    #[test]
    fn stop_of_an_unrequired_leaf_only_includes_itself() {
        let plan = plan_from(
            r#"
services:
  standalone:
    override: replace
    command: ["/bin/standalone"]
  other:
    override: replace
    command: ["/bin/other"]
"#,
        );

        let order = plan_stop(&plan, &set(&["standalone"])).unwrap();
        assert_eq!(names(&order), vec!["standalone"]);
    }
}

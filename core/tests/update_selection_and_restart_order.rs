//! Combines the policy parser, version selector, and dependency graph -
//! three modules the discovery pipeline drives together at runtime - into
//! one flow: a stack's `restart-after` labels build the graph that orders
//! restarts once an update is selected for the container they depend on.

use std::collections::HashMap;

use docksmith_core::depgraph::DependencyGraph;
use docksmith_core::model::Policy;
use docksmith_core::version::{parse_image_tag, select_candidate};

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn selected_update_drives_dependent_restart_order() {
  // `api` and `worker` both declare `restart-after: db` via labels.
  let db_policy = Policy::from_labels(&labels(&[]));
  let api_policy =
    Policy::from_labels(&labels(&[("docksmith.restart-after", "db")]));
  let worker_policy =
    Policy::from_labels(&labels(&[("docksmith.restart-after", "db")]));
  assert_eq!(api_policy.restart_after, vec!["db".to_string()]);
  assert_eq!(worker_policy.restart_after, vec!["db".to_string()]);

  let mut graph = DependencyGraph::new();
  graph.add_node("db");
  for (name, policy) in [("api", &api_policy), ("worker", &worker_policy)] {
    for dep in &policy.restart_after {
      graph.add_edge(name, dep);
    }
  }

  assert!(!graph.has_cycles());
  let mut dependents = graph.dependents_of("db");
  dependents.sort();
  assert_eq!(dependents, vec!["api".to_string(), "worker".to_string()]);

  let order = graph.topological_order().unwrap();
  let db_pos = order.iter().position(|n| n == "db").unwrap();
  let api_pos = order.iter().position(|n| n == "api").unwrap();
  let worker_pos = order.iter().position(|n| n == "worker").unwrap();
  assert!(db_pos < api_pos);
  assert!(db_pos < worker_pos);

  let current = parse_image_tag("14.2");
  let available = [
    parse_image_tag("14.2"),
    parse_image_tag("14.3"),
    parse_image_tag("15.0"),
  ];
  let picked = select_candidate(&current, &available, &db_policy).unwrap();
  assert_eq!(picked.tag, "15.0");
}

#[test]
fn restart_after_cycle_is_reported_not_silently_broken() {
  let a = Policy::from_labels(&labels(&[("docksmith.restart-after", "b")]));
  let b = Policy::from_labels(&labels(&[("docksmith.restart-after", "a")]));

  let mut graph = DependencyGraph::new();
  for dep in &a.restart_after {
    graph.add_edge("a", dep);
  }
  for dep in &b.restart_after {
    graph.add_edge("b", dep);
  }

  assert!(graph.has_cycles());
  assert!(graph.topological_order().is_err());
}

#[test]
fn pinned_major_version_excludes_next_major_candidate() {
  let policy = Policy::from_labels(&labels(&[(
    "docksmith.version-pin-major",
    "true",
  )]));
  let current = parse_image_tag("1.9.3");
  let available = [
    parse_image_tag("1.9.4"),
    parse_image_tag("1.10.0"),
    parse_image_tag("2.0.0"),
  ];
  let picked = select_candidate(&current, &available, &policy).unwrap();
  assert_eq!(picked.tag, "1.10.0");
}

//! Dependency Graph (spec §4.5): `restart-after` relations between
//! containers, with cycle detection and topological ordering.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cycle detected: {0:?}")]
pub struct CycleError(pub Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Gray,
  Black,
}

/// Nodes are container names; an edge `A -> B` means "A depends on B" -
/// i.e. A's `restart-after` names B, so B restarting should restart A.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
  /// node -> the nodes it depends on (its `restart-after` list).
  edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, name: &str) {
    self.edges.entry(name.to_string()).or_default();
  }

  /// `dependent` depends on `dependency` (restarted after it updates).
  pub fn add_edge(&mut self, dependent: &str, dependency: &str) {
    self.add_node(dependency);
    let deps = self.edges.entry(dependent.to_string()).or_default();
    if !deps.iter().any(|d| d == dependency) {
      deps.push(dependency.to_string());
    }
  }

  /// Nodes that depend on `name` - i.e. should be restarted after it.
  pub fn dependents_of(&self, name: &str) -> Vec<String> {
    self
      .edges
      .iter()
      .filter(|(_, deps)| deps.iter().any(|d| d == name))
      .map(|(node, _)| node.clone())
      .collect()
  }

  pub fn has_cycles(&self) -> bool {
    self.find_cycle().is_some()
  }

  /// Tri-color DFS; reconstructs the offending path when a cycle exists.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    let mut colors: HashMap<&str, Color> = self
      .edges
      .keys()
      .map(|k| (k.as_str(), Color::White))
      .collect();
    let mut stack: Vec<String> = Vec::new();

    for node in self.edges.keys() {
      if colors.get(node.as_str()) == Some(&Color::White) {
        if let Some(cycle) =
          self.visit(node, &mut colors, &mut stack)
        {
          return Some(cycle);
        }
      }
    }
    None
  }

  fn visit<'a>(
    &'a self,
    node: &'a str,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<String>,
  ) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    stack.push(node.to_string());

    if let Some(deps) = self.edges.get(node) {
      for dep in deps {
        match colors.get(dep.as_str()) {
          Some(Color::Gray) => {
            let start = stack.iter().position(|n| n == dep).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(dep.clone());
            return Some(cycle);
          }
          Some(Color::Black) => continue,
          _ => {
            if let Some(cycle) = self.visit(dep, colors, stack) {
              return Some(cycle);
            }
          }
        }
      }
    }

    stack.pop();
    colors.insert(node, Color::Black);
    None
  }

  /// Topological order (dependencies before dependents), driving
  /// post-update restart sequencing. `Err` when the graph is cyclic -
  /// cycles must never be silently broken (spec §9).
  pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
    if let Some(cycle) = self.find_cycle() {
      return Err(CycleError(cycle));
    }

    let mut visited: HashMap<&str, bool> = HashMap::new();
    let mut order = Vec::new();

    fn visit<'a>(
      graph: &'a DependencyGraph,
      node: &'a str,
      visited: &mut HashMap<&'a str, bool>,
      order: &mut Vec<String>,
    ) {
      if visited.contains_key(node) {
        return;
      }
      visited.insert(node, true);
      if let Some(deps) = graph.edges.get(node) {
        for dep in deps {
          visit(graph, dep, visited, order);
        }
      }
      order.push(node.to_string());
    }

    for node in self.edges.keys() {
      visit(self, node, &mut visited, &mut order);
    }
    Ok(order)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_simple_cycle() {
    let mut g = DependencyGraph::new();
    g.add_edge("a", "b");
    g.add_edge("b", "a");
    assert!(g.has_cycles());
    let cycle = g.find_cycle().unwrap();
    assert!(cycle.contains(&"a".to_string()));
    assert!(cycle.contains(&"b".to_string()));
  }

  #[test]
  fn acyclic_graph_topo_sorts_dependencies_first() {
    let mut g = DependencyGraph::new();
    g.add_edge("b", "a");
    let order = g.topological_order().unwrap();
    assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn dependents_of_finds_restart_targets() {
    let mut g = DependencyGraph::new();
    g.add_edge("b", "a");
    g.add_edge("c", "a");
    let mut dependents = g.dependents_of("a");
    dependents.sort();
    assert_eq!(dependents, vec!["b".to_string(), "c".to_string()]);
  }
}

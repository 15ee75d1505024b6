//! The resolved dependency graph.
//!
//! Nodes are [`Package`]s, edges point from a dependency to its dependent.
//! The graph is immutable once built and guaranteed acyclic.

mod package;

pub use package::*;

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("package '{0}' appears more than once in the graph")]
  DuplicatePackage(String),

  #[error("package '{package}' depends on '{dependency}', which is not in the graph")]
  MissingDependency { package: String, dependency: String },

  #[error("root package '{0}' is not in the graph")]
  MissingRoot(String),

  #[error("dependency cycle detected involving '{0}'")]
  Cycle(String),
}

#[derive(Debug)]
pub struct DependencyGraph {
  graph: DiGraph<Package, ()>,
  by_name: HashMap<String, NodeIndex>,
  /// Direct dependencies of each node, in declaration order.
  declared: HashMap<NodeIndex, Vec<NodeIndex>>,
  root: NodeIndex,
}

impl DependencyGraph {
  /// Build a graph from resolved packages.
  ///
  /// Every dependency name must refer to a package in `packages`, and names
  /// must be unique.
  pub fn new(packages: Vec<Package>, root: &str) -> Result<Self, GraphError> {
    let mut graph = DiGraph::with_capacity(packages.len(), packages.len());
    let mut by_name = HashMap::with_capacity(packages.len());

    for package in packages {
      let name = package.name().to_string();
      if by_name.contains_key(&name) {
        return Err(GraphError::DuplicatePackage(name));
      }
      let idx = graph.add_node(package);
      by_name.insert(name, idx);
    }

    let mut declared = HashMap::with_capacity(by_name.len());
    for idx in graph.node_indices() {
      let package = &graph[idx];
      let deps = package
        .dependencies
        .iter()
        .map(|dep| {
          by_name.get(dep).copied().ok_or_else(|| GraphError::MissingDependency {
            package: package.name().to_string(),
            dependency: dep.clone(),
          })
        })
        .collect::<Result<Vec<_>, _>>()?;
      declared.insert(idx, deps);
    }

    for (&dependent, deps) in &declared {
      for &dep in deps {
        graph.add_edge(dep, dependent, ());
      }
    }

    let root = by_name
      .get(root)
      .copied()
      .ok_or_else(|| GraphError::MissingRoot(root.to_string()))?;

    let dag = Self {
      graph,
      by_name,
      declared,
      root,
    };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None)
      .map(|_| ())
      .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].name().to_string()))
  }

  pub fn root(&self) -> &Package {
    &self.graph[self.root]
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn get(&self, id: &PackageId) -> Option<&Package> {
    self.by_name(&id.name).filter(|p| p.id == *id)
  }

  pub fn by_name(&self, name: &str) -> Option<&Package> {
    self.by_name.get(name).map(|&idx| &self.graph[idx])
  }

  pub fn packages(&self) -> impl Iterator<Item = &Package> {
    self.graph.node_weights()
  }

  /// Direct dependencies of `id`, in declaration order.
  pub fn dependencies(&self, id: &PackageId) -> Vec<&Package> {
    self
      .index_of(id)
      .map(|idx| self.declared[&idx].iter().map(|&d| &self.graph[d]).collect())
      .unwrap_or_default()
  }

  /// Packages that declare `id` as a direct dependency, sorted by id.
  pub fn dependents(&self, id: &PackageId) -> Vec<&Package> {
    let Some(idx) = self.index_of(id) else {
      return Vec::new();
    };
    let mut dependents: Vec<&Package> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|d| &self.graph[d])
      .collect();
    dependents.sort_by(|a, b| a.id.cmp(&b.id));
    dependents
  }

  /// Every direct and transitive dependency of `id`, dependencies first.
  ///
  /// Depth-first post-order: siblings are visited in declaration order and
  /// each package appears once, at its first completion. `id` itself is not
  /// included.
  pub fn transitive_dependencies(&self, id: &PackageId) -> Vec<&Package> {
    let Some(start) = self.index_of(id) else {
      return Vec::new();
    };

    let mut order = Vec::new();
    let mut visited = HashSet::from([start]);
    let mut stack = vec![(start, 0usize)];

    while let Some(top) = stack.last_mut() {
      let (node, cursor) = *top;
      match self.declared[&node].get(cursor) {
        Some(&dep) => {
          top.1 += 1;
          if visited.insert(dep) {
            stack.push((dep, 0));
          }
        }
        None => {
          stack.pop();
          if node != start {
            order.push(&self.graph[node]);
          }
        }
      }
    }

    order
  }

  /// Every package that depends on `id` directly or transitively, in
  /// topological order.
  pub fn transitive_dependents(&self, id: &PackageId) -> Vec<&Package> {
    let Some(start) = self.index_of(id) else {
      return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
      for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
        if seen.insert(dependent) {
          stack.push(dependent);
        }
      }
    }

    self
      .topological_order()
      .into_iter()
      .filter(|p| self.by_name.get(p.name()).is_some_and(|idx| seen.contains(idx)))
      .collect()
  }

  /// All packages, dependencies before dependents, ending with the root.
  pub fn topological_order(&self) -> Vec<&Package> {
    let mut order = self.transitive_dependencies(&self.root().id);
    order.push(self.root());
    order
  }

  /// Packages grouped into levels that can build in parallel.
  ///
  /// Level 0 holds packages without dependencies; every other package is one
  /// level above its deepest dependency. Each level is sorted by id.
  pub fn waves(&self) -> Vec<Vec<&Package>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BTreeSet<&PackageId> = in_degree
      .iter()
      .filter(|(_, deg)| **deg == 0)
      .map(|(&idx, _)| &self.graph[idx].id)
      .collect();

    let mut waves = Vec::new();
    while !ready.is_empty() {
      let level: Vec<&Package> = ready.iter().filter_map(|id| self.by_name(&id.name)).collect();
      let mut next = BTreeSet::new();

      for package in &level {
        let idx = self.by_name[package.name()];
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
            if *deg == 0 {
              next.insert(&self.graph[dependent].id);
            }
          }
        }
      }

      waves.push(level);
      ready = next;
    }

    waves
  }

  fn index_of(&self, id: &PackageId) -> Option<NodeIndex> {
    self
      .by_name
      .get(&id.name)
      .copied()
      .filter(|&idx| self.graph[idx].id == *id)
  }
}

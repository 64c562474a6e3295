mod cycles;
mod resolve;

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use strata_core::{Snapshot, UnitId};

pub use cycles::{CycleAnalysis, enumerate_cycles};
pub use resolve::{extract_references, resolve_reference};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<UnitId, ()>,
    index_by_path: BTreeMap<UnitId, NodeIndex>,
    reference_count: u32,
    unresolved_reference_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GraphStats {
    pub node_count: u32,
    pub edge_count: u32,
    pub reference_count: u32,
    pub unresolved_reference_count: u32,
}

impl DependencyGraph {
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.graph.node_count() as u32,
            edge_count: self.graph.edge_count() as u32,
            reference_count: self.reference_count,
            unresolved_reference_count: self.unresolved_reference_count,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index_by_path.contains_key(path)
    }

    pub fn dependencies_of(&self, path: &str) -> Vec<&str> {
        let Some(&index) = self.index_by_path.get(path) else {
            return Vec::new();
        };
        let mut targets = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .map(|neighbor| self.graph[neighbor].as_str())
            .collect::<Vec<_>>();
        targets.sort_unstable();
        targets
    }

    pub fn dependents_of(&self, path: &str) -> Vec<&str> {
        let Some(&index) = self.index_by_path.get(path) else {
            return Vec::new();
        };
        let mut sources = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|neighbor| self.graph[neighbor].as_str())
            .collect::<Vec<_>>();
        sources.sort_unstable();
        sources
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.index_by_path.keys().map(String::as_str)
    }

    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = self
            .graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(source, target)| (self.graph[source].as_str(), self.graph[target].as_str()))
            .collect::<Vec<_>>();
        edges.sort_unstable();
        edges
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<UnitId, ()> {
        &self.graph
    }
}

pub fn build_graph(snapshot: &Snapshot) -> DependencyGraph {
    let mut graph = DiGraph::new();
    let mut index_by_path = BTreeMap::new();
    let mut path_set = BTreeSet::new();
    for record in &snapshot.files {
        let index = graph.add_node(record.path.clone());
        index_by_path.insert(record.path.clone(), index);
        path_set.insert(record.path.clone());
    }

    let mut reference_count = 0u32;
    let mut unresolved_reference_count = 0u32;
    for record in &snapshot.files {
        let source = index_by_path[&record.path];
        let mut targets = Vec::new();
        for spec in extract_references(record) {
            reference_count += 1;
            match resolve_reference(&record.path, &spec, &path_set) {
                // A unit referencing itself is not a dependency edge.
                Some(resolved) if resolved == record.path => {}
                Some(resolved) => targets.push(resolved),
                None => unresolved_reference_count += 1,
            }
        }
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            graph.add_edge(source, index_by_path[&target], ());
        }
    }

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        unresolved = unresolved_reference_count,
        "dependency graph built"
    );

    DependencyGraph {
        graph,
        index_by_path,
        reference_count,
        unresolved_reference_count,
    }
}

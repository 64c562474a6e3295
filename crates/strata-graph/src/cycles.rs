use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use serde::{Deserialize, Serialize};
use strata_core::UnitId;

use crate::DependencyGraph;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CycleAnalysis {
    pub cycles: Vec<Vec<UnitId>>,
    pub total_found: u32,
    pub truncated: bool,
    pub budget_exhausted: bool,
}

struct StepBudget {
    remaining: u64,
    exhausted: bool,
}

impl StepBudget {
    fn new(budget: u64) -> Self {
        Self {
            remaining: budget,
            exhausted: false,
        }
    }

    fn step(&mut self) -> bool {
        if self.remaining == 0 {
            self.exhausted = true;
            return false;
        }
        self.remaining -= 1;
        true
    }
}

pub fn enumerate_cycles(
    graph: &DependencyGraph,
    max_cycles: u32,
    step_budget: u64,
) -> CycleAnalysis {
    let petgraph = graph.petgraph();
    let mut budget = StepBudget::new(step_budget);
    let mut found: BTreeSet<Vec<UnitId>> = BTreeSet::new();

    let mut components = tarjan_scc(petgraph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut nodes = component
                .into_iter()
                .map(|index| petgraph[index].clone())
                .collect::<Vec<_>>();
            nodes.sort_unstable();
            nodes
        })
        .collect::<Vec<_>>();
    components.sort();

    'components: for nodes in components {
        let members: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in &nodes {
            let targets = graph
                .dependencies_of(node)
                .into_iter()
                .filter(|target| members.contains(target))
                .collect::<Vec<_>>();
            adjacency.insert(node.as_str(), targets);
        }

        // Roots ascend and processed roots are removed, so every cycle
        // is found exactly once, rooted at its smallest node.
        let mut removed: BTreeSet<&str> = BTreeSet::new();
        for root in nodes.iter().map(String::as_str) {
            let mut search = CircuitSearch {
                root,
                adjacency: &adjacency,
                removed: &removed,
                blocked: BTreeSet::new(),
                block_map: BTreeMap::new(),
                stack: Vec::new(),
                found: &mut found,
            };
            search.circuit(root, &mut budget);
            if budget.exhausted {
                break 'components;
            }
            removed.insert(root);
        }
    }

    let total_found = found.len() as u32;
    let mut cycles = found.into_iter().collect::<Vec<_>>();
    cycles.sort_by(|left, right| left.len().cmp(&right.len()).then_with(|| left.cmp(right)));

    let truncated = cycles.len() as u32 > max_cycles;
    if truncated {
        cycles.truncate(max_cycles as usize);
    }

    CycleAnalysis {
        cycles,
        total_found,
        truncated,
        budget_exhausted: budget.exhausted,
    }
}

pub fn canonical_rotation(mut cycle: Vec<UnitId>) -> Vec<UnitId> {
    let Some(min_position) = cycle
        .iter()
        .enumerate()
        .min_by(|left, right| left.1.cmp(right.1))
        .map(|(position, _)| position)
    else {
        return cycle;
    };
    cycle.rotate_left(min_position);
    cycle
}

struct CircuitSearch<'a> {
    root: &'a str,
    adjacency: &'a BTreeMap<&'a str, Vec<&'a str>>,
    removed: &'a BTreeSet<&'a str>,
    blocked: BTreeSet<&'a str>,
    block_map: BTreeMap<&'a str, BTreeSet<&'a str>>,
    stack: Vec<&'a str>,
    found: &'a mut BTreeSet<Vec<UnitId>>,
}

impl<'a> CircuitSearch<'a> {
    fn circuit(&mut self, vertex: &'a str, budget: &mut StepBudget) -> bool {
        let mut found_here = false;
        self.stack.push(vertex);
        self.blocked.insert(vertex);

        let neighbors = self
            .adjacency
            .get(vertex)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for &next in neighbors {
            if !budget.step() {
                break;
            }
            if self.removed.contains(next) {
                continue;
            }
            if next == self.root {
                let cycle = self
                    .stack
                    .iter()
                    .map(|node| (*node).to_owned())
                    .collect::<Vec<_>>();
                self.found.insert(canonical_rotation(cycle));
                found_here = true;
            } else if !self.blocked.contains(next) && self.circuit(next, budget) {
                found_here = true;
            }
            if budget.exhausted {
                break;
            }
        }

        if found_here {
            self.unblock(vertex);
        } else {
            for &next in neighbors {
                if !self.removed.contains(next) {
                    self.block_map.entry(next).or_default().insert(vertex);
                }
            }
        }
        self.stack.pop();
        found_here
    }

    fn unblock(&mut self, vertex: &'a str) {
        self.blocked.remove(vertex);
        let dependents = self
            .block_map
            .remove(vertex)
            .unwrap_or_default()
            .into_iter()
            .collect::<Vec<_>>();
        for dependent in dependents {
            if self.blocked.contains(dependent) {
                self.unblock(dependent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_graph;
    use strata_core::{FileRecord, SNAPSHOT_FORMAT_VERSION, Snapshot, content_hash};

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_owned(),
            content: Some(content.to_owned()),
            content_hash: content_hash(content),
            is_binary: false,
        }
    }

    fn snapshot(mut files: Vec<FileRecord>) -> Snapshot {
        files.sort_by(|left, right| left.path.cmp(&right.path));
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            fingerprint: String::new(),
            file_count: files.len() as u32,
            total_bytes: 0,
            files,
        }
    }

    fn ts_graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let files = edges
            .iter()
            .map(|(path, targets)| {
                let imports = targets
                    .iter()
                    .map(|target| {
                        let stem = target.trim_end_matches(".ts");
                        format!("import \"./{stem}\";\n")
                    })
                    .collect::<String>();
                record(path, &imports)
            })
            .collect();
        build_graph(&snapshot(files))
    }

    #[test]
    fn mutual_imports_yield_one_cycle_rooted_at_smallest() {
        let graph = ts_graph(&[("a.ts", &["b.ts"]), ("b.ts", &["a.ts"])]);
        let analysis = enumerate_cycles(&graph, 16, 10_000);

        assert_eq!(analysis.cycles, vec![vec!["a.ts".to_owned(), "b.ts".to_owned()]]);
        assert!(!analysis.truncated);
        assert!(!analysis.budget_exhausted);
    }

    #[test]
    fn acyclic_chain_yields_empty_cycle_list() {
        let graph = ts_graph(&[("a.ts", &["b.ts"]), ("b.ts", &["c.ts"]), ("c.ts", &[])]);
        let analysis = enumerate_cycles(&graph, 16, 10_000);
        assert!(analysis.cycles.is_empty());
        assert_eq!(analysis.total_found, 0);
    }

    #[test]
    fn nested_cycles_are_all_enumerated() {
        let graph = ts_graph(&[
            ("a.ts", &["b.ts"]),
            ("b.ts", &["a.ts", "c.ts"]),
            ("c.ts", &["a.ts"]),
        ]);
        let analysis = enumerate_cycles(&graph, 16, 10_000);
        assert_eq!(
            analysis.cycles,
            vec![
                vec!["a.ts".to_owned(), "b.ts".to_owned()],
                vec!["a.ts".to_owned(), "b.ts".to_owned(), "c.ts".to_owned()],
            ]
        );
    }

    #[test]
    fn truncation_takes_prefix_of_fully_sorted_list() {
        let graph = ts_graph(&[
            ("a.ts", &["b.ts"]),
            ("b.ts", &["a.ts"]),
            ("c.ts", &["d.ts"]),
            ("d.ts", &["c.ts"]),
            ("x.ts", &["y.ts"]),
            ("y.ts", &["z.ts"]),
            ("z.ts", &["x.ts"]),
        ]);
        let analysis = enumerate_cycles(&graph, 2, 10_000);

        assert!(analysis.truncated);
        assert_eq!(analysis.total_found, 3);
        assert_eq!(
            analysis.cycles,
            vec![
                vec!["a.ts".to_owned(), "b.ts".to_owned()],
                vec!["c.ts".to_owned(), "d.ts".to_owned()],
            ]
        );
    }

    #[test]
    fn exhausted_budget_aborts_deterministically() {
        let graph = ts_graph(&[
            ("a.ts", &["b.ts"]),
            ("b.ts", &["a.ts"]),
            ("c.ts", &["d.ts"]),
            ("d.ts", &["c.ts"]),
        ]);

        let first = enumerate_cycles(&graph, 16, 2);
        let second = enumerate_cycles(&graph, 16, 2);
        assert!(first.budget_exhausted);
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_rotation_puts_smallest_node_first() {
        let rotated = canonical_rotation(vec![
            "m.ts".to_owned(),
            "a.ts".to_owned(),
            "k.ts".to_owned(),
        ]);
        assert_eq!(rotated, vec!["a.ts", "k.ts", "m.ts"]);
    }
}

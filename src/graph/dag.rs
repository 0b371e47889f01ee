//! dag.rs
//! Wraps the low-level UnitRegistry with graph algorithms and the final
//! integrity checks run before a graph is handed off.

use super::edge::Edge;
use super::storage::{UnitId, UnitRegistry};
use super::unit::AnalysisUnit;
use crate::error::GraphIntegrityError;
use crate::layout::EntityKey;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};

/// The compiled analysis graph: every unit of every level plus the edges
/// feeding lower-level outputs into higher-level aggregations.
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    pub(crate) store: UnitRegistry,
    levels: Vec<&'static str>,
}

impl CompiledGraph {
    /// `levels` is the compiled level chain, lowest first.
    pub fn new(levels: Vec<&'static str>) -> Self {
        Self { store: UnitRegistry::new(), levels }
    }

    pub(crate) fn add_unit(&mut self, unit: AnalysisUnit, parents: &[UnitId]) -> UnitId {
        self.store.push_unit(unit, parents)
    }

    pub fn levels(&self) -> &[&'static str] { &self.levels }

    pub fn unit_count(&self) -> usize { self.store.count() }

    pub fn edge_count(&self) -> usize { self.store.parents_flat.len() }

    pub fn is_empty(&self) -> bool { self.store.count() == 0 }

    // --- Accessors ---
    pub fn unit(&self, id: UnitId) -> &AnalysisUnit { &self.store.units[id.index()] }

    /// The units this unit aggregates, in first-observation order.
    pub fn parents(&self, id: UnitId) -> &[UnitId] { self.store.get_parents(id) }

    /// The units that aggregate this unit.
    pub fn children(&self, id: UnitId) -> Vec<UnitId> { self.store.get_children(id) }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &AnalysisUnit)> {
        self.store.units.iter().enumerate().map(|(i, u)| (UnitId::new(i), u))
    }

    pub fn units_at(&self, level_index: usize) -> impl Iterator<Item = (UnitId, &AnalysisUnit)> {
        self.units().filter(move |(_, u)| u.level_index == level_index)
    }

    pub fn find(&self, level: &str, key: &EntityKey) -> Option<UnitId> {
        self.units().find(|(_, u)| u.level == level && &u.key == key).map(|(id, _)| id)
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.units()
            .flat_map(|(to, _)| self.parents(to).iter().map(move |&from| Edge { from, to }))
            .collect()
    }

    // --- Graph Algorithms ---

    /// Returns a topological order using Kahn's Algorithm.
    ///
    /// Ready units are taken smallest id first. Units are registered level by
    /// level in first-observation order, so the result is lowest level first
    /// and identical for identical inputs.
    pub fn topological_order(&self) -> Result<Vec<UnitId>, GraphIntegrityError> {
        let count = self.store.count();
        let mut in_degree = vec![0usize; count];
        let mut ready = BinaryHeap::with_capacity(count);
        let mut order = Vec::with_capacity(count);

        // 1. Initialize In-Degrees O(N)
        for (i, &(_, parents)) in self.store.parents_ranges.iter().enumerate() {
            in_degree[i] = parents as usize;
            if parents == 0 {
                ready.push(Reverse(UnitId::new(i)));
            }
        }

        // 2. Process Queue
        while let Some(Reverse(unit)) = ready.pop() {
            order.push(unit);

            let mut edge_idx = self.store.first_child[unit.index()];
            while edge_idx != u32::MAX {
                let child = self.store.child_targets[edge_idx as usize];
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    ready.push(Reverse(child));
                }
                edge_idx = self.store.next_child[edge_idx as usize];
            }
        }

        if order.len() != count {
            return Err(GraphIntegrityError::Cycle { ordered: order.len(), total: count });
        }

        Ok(order)
    }

    /// Final consistency check: acyclic, every edge spans exactly one level,
    /// and every unit above the lowest level has at least one input.
    ///
    /// A failure here is a defect in the compiler, not a problem with the input.
    pub fn verify(&self) -> Result<(), GraphIntegrityError> {
        self.topological_order()?;

        for (id, unit) in self.units() {
            let parents = self.parents(id);
            if unit.level_index > 0 && parents.is_empty() {
                return Err(GraphIntegrityError::Orphan { unit: unit.label() });
            }
            for &parent in parents {
                let below = self.unit(parent);
                if below.level_index + 1 != unit.level_index {
                    return Err(GraphIntegrityError::LevelSkip {
                        unit: unit.label(),
                        parent: below.label(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every unit whose result depends on any of `start_units`, including themselves.
    pub fn downstream_from(&self, start_units: &[UnitId]) -> HashSet<UnitId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from(start_units.to_vec());

        while let Some(unit) = queue.pop_front() {
            if visited.insert(unit) {
                let mut edge_idx = self.store.first_child[unit.index()];
                while edge_idx != u32::MAX {
                    queue.push_back(self.store.child_targets[edge_idx as usize]);
                    edge_idx = self.store.next_child[edge_idx as usize];
                }
            }
        }
        visited
    }

    /// Every unit feeding into any of `start_units`, including themselves.
    pub fn upstream_from(&self, start_units: &[UnitId]) -> HashSet<UnitId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from(start_units.to_vec());

        while let Some(unit) = queue.pop_front() {
            if visited.insert(unit) {
                for &parent in self.store.get_parents(unit) {
                    queue.push_back(parent);
                }
            }
        }
        visited
    }

    /// Mirrors the graph as a `petgraph::DiGraph` for engines that schedule
    /// with petgraph. Node weights are unit ids; node indices equal unit ids.
    pub fn to_petgraph(&self) -> DiGraph<UnitId, ()> {
        let mut graph = DiGraph::with_capacity(self.unit_count(), self.edge_count());
        for (id, _) in self.units() {
            graph.add_node(id);
        }
        for edge in self.edges() {
            graph.add_edge(NodeIndex::new(edge.from.index()), NodeIndex::new(edge.to.index()), ());
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::unit::ResolvedModel;
    use crate::layout::Dimension;
    use petgraph::algo::is_cyclic_directed;

    fn make_unit(level_index: usize, subject: &str) -> AnalysisUnit {
        AnalysisUnit {
            level: ["run", "subject", "dataset"][level_index],
            level_index,
            key: EntityKey::new().with(Dimension::Subject, subject),
            model: ResolvedModel::default(),
            contrasts: Vec::new(),
            aggregation: None,
            smoothing: None,
        }
    }

    fn diamond() -> (CompiledGraph, [UnitId; 4]) {
        // Shape: r1, r2 -> s1; r1 -> s2 (unusual but legal); s1 + s2 -> d
        let mut graph = CompiledGraph::new(vec!["run", "subject", "dataset"]);
        let r1 = graph.add_unit(make_unit(0, "01"), &[]);
        let r2 = graph.add_unit(make_unit(0, "02"), &[]);
        let s1 = graph.add_unit(make_unit(1, "01"), &[r1, r2]);
        let s2 = graph.add_unit(make_unit(1, "02"), &[r1]);
        let d = graph.add_unit(make_unit(2, "all"), &[s1, s2]);
        (graph, [r1, s1, s2, d])
    }

    #[test]
    fn test_order_is_lowest_level_first() {
        let (graph, [r1, s1, s2, d]) = diamond();
        let order = graph.topological_order().expect("Sort failed");
        assert_eq!(order.len(), 5);
        let pos = |id: UnitId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(r1) < pos(s1));
        assert!(pos(s1) < pos(s2));
        assert!(pos(s2) < pos(d));
        assert_eq!(order, (0..5).map(UnitId::new).collect::<Vec<_>>());
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_children_and_edges() {
        let (graph, [r1, s1, s2, _]) = diamond();
        assert_eq!(graph.children(r1), vec![s1, s2]);
        assert_eq!(graph.edge_count(), 5);
        assert!(graph.edges().contains(&Edge { from: r1, to: s2 }));
    }

    #[test]
    fn test_upstream_and_downstream() {
        let (graph, [r1, s1, s2, d]) = diamond();
        assert_eq!(graph.upstream_from(&[d]).len(), 5);
        let downstream = graph.downstream_from(&[r1]);
        assert!(downstream.contains(&s1) && downstream.contains(&s2) && downstream.contains(&d));
        assert_eq!(graph.downstream_from(&[s2]).len(), 2);
    }

    #[test]
    fn test_cycle_detection_explicit() {
        let mut graph = CompiledGraph::new(vec!["run", "subject"]);
        let a = graph.add_unit(make_unit(0, "01"), &[]);
        let b = graph.add_unit(make_unit(1, "01"), &[a]);

        // HACK: Manually inject the cycle a depends on b.
        assert_eq!(graph.store.parents_ranges[0].1, 0);
        graph.store.parents_flat.push(b);
        let new_start = (graph.store.parents_flat.len() - 1) as u32;
        graph.store.parents_ranges[0] = (new_start, 1);
        graph.store.child_targets.push(a);
        graph.store.next_child.push(graph.store.first_child[b.index()]);
        graph.store.first_child[b.index()] = (graph.store.child_targets.len() - 1) as u32;

        let err = graph.verify().unwrap_err();
        assert_eq!(err, GraphIntegrityError::Cycle { ordered: 0, total: 2 });
        assert!(is_cyclic_directed(&graph.to_petgraph()));
    }

    #[test]
    fn test_level_skip_and_orphan_are_rejected() {
        let mut graph = CompiledGraph::new(vec!["run", "subject", "dataset"]);
        let r = graph.add_unit(make_unit(0, "01"), &[]);
        graph.add_unit(make_unit(2, "all"), &[r]);
        assert!(matches!(graph.verify(), Err(GraphIntegrityError::LevelSkip { .. })));

        let mut graph = CompiledGraph::new(vec!["run", "subject"]);
        graph.add_unit(make_unit(0, "01"), &[]);
        graph.add_unit(make_unit(1, "01"), &[]);
        assert!(matches!(graph.verify(), Err(GraphIntegrityError::Orphan { .. })));
    }

    #[test]
    fn test_petgraph_mirror() {
        let (graph, _) = diamond();
        let mirror = graph.to_petgraph();
        assert_eq!(mirror.node_count(), 5);
        assert_eq!(mirror.edge_count(), 5);
        assert!(!is_cyclic_directed(&mirror));
    }
}

//! storage.rs
//! Dense unit storage: CSR parent lists plus a linked list of children per unit.

use super::unit::AnalysisUnit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

const NO_CHILD: u32 = u32::MAX;

#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    pub units: Vec<AnalysisUnit>,

    // Dense Topology: the units each unit aggregates
    pub parents_flat: Vec<UnitId>,
    pub parents_ranges: Vec<(u32, u32)>,

    // Adjacency List (Children): the units that aggregate each unit
    pub first_child: Vec<u32>,
    pub child_targets: Vec<UnitId>,
    pub next_child: Vec<u32>,
}

impl UnitRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.units.len() }

    /// Appends a unit. Every parent must already be registered.
    pub fn push_unit(&mut self, unit: AnalysisUnit, parents: &[UnitId]) -> UnitId {
        let id = UnitId::new(self.units.len());

        // 1. Children (Adjacency List append)
        for &parent in parents {
            let p_idx = parent.index();
            let head = self.first_child[p_idx];
            let new_edge = self.child_targets.len() as u32;
            self.child_targets.push(id);
            self.next_child.push(head);
            self.first_child[p_idx] = new_edge;
        }

        // 2. Parents (CSR append)
        let start = self.parents_flat.len() as u32;
        let count = parents.len() as u32;
        self.parents_flat.extend_from_slice(parents);
        self.parents_ranges.push((start, count));

        // 3. Payload
        self.units.push(unit);
        self.first_child.push(NO_CHILD);

        id
    }

    #[inline(always)]
    pub fn get_parents(&self, id: UnitId) -> &[UnitId] {
        let (start, count) = self.parents_ranges[id.index()];
        &self.parents_flat[start as usize..(start + count) as usize]
    }

    /// Children in registration order.
    pub fn get_children(&self, id: UnitId) -> Vec<UnitId> {
        let mut children = Vec::new();
        let mut edge_idx = self.first_child[id.index()];
        while edge_idx != NO_CHILD {
            children.push(self.child_targets[edge_idx as usize]);
            edge_idx = self.next_child[edge_idx as usize];
        }
        // The list is built by head insertion.
        children.reverse();
        children
    }
}

//! The pointer flow graph (PFG).
//!
//! A monotonically growing directed multigraph over [`PointerId`] nodes with
//! two independent edge kinds:
//! * **object edges** propagate all abstract objects (heap and taint),
//! * **taint-transfer edges** propagate only taint objects.
//!
//! The two successor maps are kept separate on purpose:
//! the hot path iterating object-edge successors must not touch taint edges
//! and vice versa.

use std::collections::BTreeSet;

use super::elements::PointerId;

/// The pointer flow graph with its taint-transfer overlay.
#[derive(Debug, Default)]
pub struct PointerFlowGraph {
    succs: Vec<BTreeSet<PointerId>>,
    taint_succs: Vec<BTreeSet<PointerId>>,
}

impl PointerFlowGraph {
    /// Create an empty graph.
    pub fn new() -> PointerFlowGraph {
        PointerFlowGraph::default()
    }

    /// Add an object edge. Returns whether the edge was new.
    pub fn add_edge(&mut self, source: PointerId, target: PointerId) -> bool {
        Self::grow(&mut self.succs, source);
        self.succs[source.0].insert(target)
    }

    /// Add a taint-transfer edge. Returns whether the edge was new.
    pub fn add_taint_edge(&mut self, source: PointerId, target: PointerId) -> bool {
        Self::grow(&mut self.taint_succs, source);
        self.taint_succs[source.0].insert(target)
    }

    /// Iterate over the object-edge successors of a pointer.
    pub fn succs_of(&self, source: PointerId) -> impl Iterator<Item = PointerId> + '_ {
        self.succs
            .get(source.0)
            .into_iter()
            .flat_map(|succs| succs.iter().copied())
    }

    /// Iterate over the taint-transfer successors of a pointer.
    pub fn taint_succs_of(&self, source: PointerId) -> impl Iterator<Item = PointerId> + '_ {
        self.taint_succs
            .get(source.0)
            .into_iter()
            .flat_map(|succs| succs.iter().copied())
    }

    fn grow(succs: &mut Vec<BTreeSet<PointerId>>, source: PointerId) {
        if succs.len() <= source.0 {
            succs.resize_with(source.0 + 1, BTreeSet::new);
        }
    }
}

//! Context-sensitive pointer (points-to) analysis with a taint overlay.
//!
//! The solver propagates points-to sets through a pointer flow graph whose
//! nodes are context-sensitive variables, instance fields, static fields and
//! array cells, building the call graph on the fly as receiver objects are
//! discovered. See [`solver`] for the algorithm, [`context`] for the context
//! abstractions and [`taint`] for the taint overlay.
//!
//! The analysis produces a [`PointerAnalysisResult`] with both the
//! context-sensitive view (per-pointer points-to sets, the context-sensitive
//! call graph) and the collapsed context-insensitive view used by
//! client analyses.

pub mod context;
pub mod elements;
pub mod heap;
pub mod pfg;
pub mod pts;
pub mod solver;
pub mod taint;

use std::collections::BTreeSet;

use elements::{CsCallGraph, CsManager, PointerId};
use heap::{HeapModel, ObjId};
use taint::TaintFlow;

use crate::intermediate_representation::VarId;

pub use solver::run;

/// The result of a pointer analysis run.
pub struct PointerAnalysisResult {
    csm: CsManager,
    call_graph: CsCallGraph,
    heap: HeapModel,
    taint_flows: BTreeSet<TaintFlow>,
}

impl PointerAnalysisResult {
    pub(crate) fn new(
        csm: CsManager,
        call_graph: CsCallGraph,
        heap: HeapModel,
        taint_flows: BTreeSet<TaintFlow>,
    ) -> PointerAnalysisResult {
        PointerAnalysisResult {
            csm,
            call_graph,
            heap,
            taint_flows,
        }
    }

    /// The interning manager with all pointers and their points-to sets.
    pub fn cs_manager(&self) -> &CsManager {
        &self.csm
    }

    /// The context-sensitive call graph.
    pub fn call_graph(&self) -> &CsCallGraph {
        &self.call_graph
    }

    /// The heap model with all abstract objects.
    pub fn heap(&self) -> &HeapModel {
        &self.heap
    }

    /// The detected taint flows, ordered by
    /// (source call, sink call, argument index).
    pub fn taint_flows(&self) -> &BTreeSet<TaintFlow> {
        &self.taint_flows
    }

    /// All variables the analysis has seen, in ascending id order.
    pub fn vars(&self) -> BTreeSet<VarId> {
        self.csm.cs_vars().map(|((_, var), _)| var).collect()
    }

    /// The context-insensitive points-to set of a variable:
    /// the union of the points-to sets of the variable under every context.
    pub fn points_to(&self, var: VarId) -> BTreeSet<ObjId> {
        let mut objs = BTreeSet::new();
        for ((_, pointer_var), pointer) in self.csm.cs_vars() {
            if pointer_var != var {
                continue;
            }
            for cs_obj in self.csm.pts(pointer).iter() {
                let (_, obj) = self.csm.cs_obj_parts(cs_obj);
                objs.insert(obj);
            }
        }
        objs
    }

    /// The points-to set of a single pointer.
    pub fn pts(&self, pointer: PointerId) -> &pts::PointsToSet {
        self.csm.pts(pointer)
    }
}

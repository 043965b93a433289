//! Live-variable analysis.
//!
//! A backward may-analysis computing for every program point the set of
//! variables whose current value may still be read before being overwritten.
//! The result feeds the dead-assignment part of
//! [`dead_code`](super::dead_code) detection.

use petgraph::graph::NodeIndex;

use super::dataflow::{DataflowAnalysis, SetFact};
use super::graph::{Cfg, CfgNode};
use crate::intermediate_representation::{Program, VarId};

/// The live-variable analysis.
/// A backward dataflow problem to be solved with
/// [`dataflow::solve`](super::dataflow::solve).
pub struct LiveVariableAnalysis<'a> {
    program: &'a Program,
}

impl<'a> LiveVariableAnalysis<'a> {
    /// Create the analysis for the given program.
    pub fn new(program: &'a Program) -> LiveVariableAnalysis<'a> {
        LiveVariableAnalysis { program }
    }
}

impl DataflowAnalysis for LiveVariableAnalysis<'_> {
    type Fact = SetFact<VarId>;

    fn is_forward(&self) -> bool {
        false
    }

    /// No variable is live at the method exit.
    fn boundary_fact(&self, _cfg: &Cfg) -> SetFact<VarId> {
        SetFact::new()
    }

    fn initial_fact(&self) -> SetFact<VarId> {
        SetFact::new()
    }

    fn meet_into(&self, fact: &SetFact<VarId>, target: &mut SetFact<VarId>) -> bool {
        target.union_with(fact)
    }

    /// `live-in = (live-out \ def) ∪ uses`.
    /// For a backward analysis `source` is the out-fact
    /// and `target` the in-fact of the node.
    fn transfer_node(
        &self,
        cfg: &Cfg,
        node: NodeIndex,
        source: &SetFact<VarId>,
        target: &mut SetFact<VarId>,
    ) -> bool {
        let mut live = source.clone();
        if let CfgNode::Stmt(index) = cfg.graph()[node] {
            let stmt = &self.program.ir(cfg.method()).unwrap().stmts[index];
            if let Some(def) = stmt.def() {
                live.remove(&def);
            }
            for used in stmt.uses() {
                live.insert(used);
            }
        }
        let changed = live != *target;
        *target = live;
        changed
    }
}

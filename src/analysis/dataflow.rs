//! A generic work-list solver for intraprocedural dataflow problems.
//!
//! A dataflow problem is described by a [`DataflowAnalysis`] implementation:
//! the analysis direction, the boundary fact of a method, the initial fact of
//! interior nodes, the meet operator and the node transfer function.
//! [`solve`] runs the work-list algorithm over a [`Cfg`] and returns a
//! [`DataflowResult`] with the in- and out-fact of every node.
//!
//! The facts at each node form a lattice of finite height and the transfer
//! functions are monotone, so the work-list empties after finitely many
//! steps. The processing order is not observable in the result.

use std::collections::BTreeSet;
use std::collections::VecDeque;

use petgraph::graph::NodeIndex;
use petgraph::Direction;

use super::graph::Cfg;

/// The description of a dataflow problem.
pub trait DataflowAnalysis {
    /// The fact attached to each program point.
    type Fact: Clone + PartialEq;

    /// True for forward problems, false for backward problems.
    fn is_forward(&self) -> bool;

    /// The fact at the boundary of the method,
    /// i.e. at the entry node for forward problems
    /// and at the exit node for backward problems.
    fn boundary_fact(&self, cfg: &Cfg) -> Self::Fact;

    /// The initial fact of all interior nodes.
    fn initial_fact(&self) -> Self::Fact;

    /// Meet `fact` into `target`. Returns whether `target` changed.
    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact) -> bool;

    /// The transfer function of a node.
    ///
    /// For forward problems `source` is the in-fact and `target` the
    /// out-fact of the node; for backward problems the roles are swapped.
    /// Returns whether `target` changed.
    fn transfer_node(
        &self,
        cfg: &Cfg,
        node: NodeIndex,
        source: &Self::Fact,
        target: &mut Self::Fact,
    ) -> bool;
}

/// The result of a dataflow analysis:
/// an in-fact and an out-fact for every node of the analyzed graph.
#[derive(Debug, Clone)]
pub struct DataflowResult<F> {
    in_facts: Vec<F>,
    out_facts: Vec<F>,
}

impl<F> DataflowResult<F> {
    /// The fact holding before execution of the node.
    pub fn in_fact(&self, node: NodeIndex) -> &F {
        &self.in_facts[node.index()]
    }

    /// The fact holding after execution of the node.
    pub fn out_fact(&self, node: NodeIndex) -> &F {
        &self.out_facts[node.index()]
    }
}

/// Solve a dataflow problem over the given control flow graph
/// with the work-list algorithm.
pub fn solve<A: DataflowAnalysis>(analysis: &A, cfg: &Cfg) -> DataflowResult<A::Fact> {
    let node_count = cfg.graph().node_count();
    let mut result = DataflowResult {
        in_facts: vec![analysis.initial_fact(); node_count],
        out_facts: vec![analysis.initial_fact(); node_count],
    };
    let boundary_node = if analysis.is_forward() {
        cfg.entry()
    } else {
        cfg.exit()
    };
    if analysis.is_forward() {
        result.out_facts[boundary_node.index()] = analysis.boundary_fact(cfg);
    } else {
        result.in_facts[boundary_node.index()] = analysis.boundary_fact(cfg);
    }

    let mut worklist: VecDeque<NodeIndex> = cfg
        .graph()
        .node_indices()
        .filter(|node| *node != boundary_node)
        .collect();
    let mut on_list = vec![true; node_count];
    on_list[boundary_node.index()] = false;

    while let Some(node) = worklist.pop_front() {
        on_list[node.index()] = false;
        let changed = if analysis.is_forward() {
            for pred in cfg.graph().neighbors_directed(node, Direction::Incoming) {
                let (pred_out, node_in) =
                    fact_pair(&mut result.out_facts, &mut result.in_facts, pred, node);
                analysis.meet_into(pred_out, node_in);
            }
            let source = &result.in_facts[node.index()];
            let target = &mut result.out_facts[node.index()];
            analysis.transfer_node(cfg, node, source, target)
        } else {
            for succ in cfg.graph().neighbors_directed(node, Direction::Outgoing) {
                let (succ_in, node_out) =
                    fact_pair(&mut result.in_facts, &mut result.out_facts, succ, node);
                analysis.meet_into(succ_in, node_out);
            }
            let source = &result.out_facts[node.index()];
            let target = &mut result.in_facts[node.index()];
            analysis.transfer_node(cfg, node, source, target)
        };
        if changed {
            let direction = if analysis.is_forward() {
                Direction::Outgoing
            } else {
                Direction::Incoming
            };
            for next in cfg.graph().neighbors_directed(node, direction) {
                if !on_list[next.index()] {
                    on_list[next.index()] = true;
                    worklist.push_back(next);
                }
            }
        }
    }
    result
}

/// Borrow one fact from `sources` and one from `targets` at the same time.
fn fact_pair<'a, F>(
    sources: &'a mut [F],
    targets: &'a mut [F],
    source: NodeIndex,
    target: NodeIndex,
) -> (&'a F, &'a mut F) {
    (&sources[source.index()], &mut targets[target.index()])
}

/// A set-valued dataflow fact, e.g. the live variables at a program point.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SetFact<T: Ord>(BTreeSet<T>);

impl<T: Ord + Clone> SetFact<T> {
    /// Create an empty set fact.
    pub fn new() -> SetFact<T> {
        SetFact(BTreeSet::new())
    }

    /// Returns whether the element is in the set.
    pub fn contains(&self, element: &T) -> bool {
        self.0.contains(element)
    }

    /// Add an element. Returns whether the set changed.
    pub fn insert(&mut self, element: T) -> bool {
        self.0.insert(element)
    }

    /// Remove an element. Returns whether the set changed.
    pub fn remove(&mut self, element: &T) -> bool {
        self.0.remove(element)
    }

    /// Add all elements of `other`. Returns whether the set changed.
    pub fn union_with(&mut self, other: &SetFact<T>) -> bool {
        let mut changed = false;
        for element in &other.0 {
            changed |= self.0.insert(element.clone());
        }
        changed
    }

    /// Iterate over the elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    /// The number of elements in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_fact_union() {
        let mut left: SetFact<u32> = SetFact::new();
        left.insert(1);
        let mut right = SetFact::new();
        right.insert(2);
        assert!(left.union_with(&right));
        assert!(!left.union_with(&right));
        assert_eq!(left.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }
}

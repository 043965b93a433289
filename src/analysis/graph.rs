//! Generate control flow graphs out of method bodies.
//!
//! Two graph types are provided:
//! * [`Cfg`] — the intraprocedural control flow graph of a single method,
//!   with distinguished entry and exit nodes and labeled branch edges.
//! * [`Icfg`] — the interprocedural control flow graph,
//!   which splices the per-method graphs together along a call graph
//!   with *Call*, *Return* and *CallToReturn* edges.
//!
//! Nodes represent statements (plus one artificial entry and exit node per
//! method); edges represent control flow or, for the interprocedural stub
//! edges, information flow between caller and callee.

use fnv::FnvHashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::analysis::callgraph::CallGraph;
use crate::intermediate_representation::{MethodId, Program, Stmt, StmtRef};
use crate::prelude::*;

/// The node type of an intraprocedural control flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CfgNode {
    /// The artificial entry node of the method.
    Entry,
    /// The artificial exit node of the method.
    Exit,
    /// The statement with the given index in the method body.
    Stmt(usize),
}

/// The edge type of an intraprocedural control flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CfgEdge {
    /// Sequential flow to the next statement (or to the exit node).
    FallThrough,
    /// An unconditional jump.
    Goto,
    /// The branch taken when an `If` condition holds.
    IfTrue,
    /// The branch taken when an `If` condition does not hold.
    IfFalse,
    /// The branch taken when a `Switch` selector equals the case value.
    SwitchCase(i32),
    /// The branch taken when no `Switch` case matches.
    SwitchDefault,
}

/// The intraprocedural control flow graph of one method body.
pub struct Cfg {
    method: MethodId,
    graph: DiGraph<CfgNode, CfgEdge>,
    entry: NodeIndex,
    exit: NodeIndex,
    stmt_nodes: Vec<NodeIndex>,
}

impl Cfg {
    /// Build the control flow graph of the given method.
    /// The method must have a body.
    pub fn new(program: &Program, method: MethodId) -> Cfg {
        let ir = program.ir(method).expect("method without body");
        let mut graph = DiGraph::new();
        let entry = graph.add_node(CfgNode::Entry);
        let exit = graph.add_node(CfgNode::Exit);
        let stmt_nodes: Vec<NodeIndex> = (0..ir.stmts.len())
            .map(|index| graph.add_node(CfgNode::Stmt(index)))
            .collect();

        let next_node =
            |index: usize| -> NodeIndex { *stmt_nodes.get(index + 1).unwrap_or(&exit) };
        if let Some(first) = stmt_nodes.first() {
            graph.add_edge(entry, *first, CfgEdge::FallThrough);
        } else {
            graph.add_edge(entry, exit, CfgEdge::FallThrough);
        }
        for (index, stmt) in ir.stmts.iter().enumerate() {
            let node = stmt_nodes[index];
            match stmt {
                Stmt::Goto { target } => {
                    graph.add_edge(node, stmt_nodes[*target], CfgEdge::Goto);
                }
                Stmt::If { target, .. } => {
                    graph.add_edge(node, stmt_nodes[*target], CfgEdge::IfTrue);
                    graph.add_edge(node, next_node(index), CfgEdge::IfFalse);
                }
                Stmt::Switch { cases, default, .. } => {
                    for (value, target) in cases {
                        graph.add_edge(node, stmt_nodes[*target], CfgEdge::SwitchCase(*value));
                    }
                    graph.add_edge(node, stmt_nodes[*default], CfgEdge::SwitchDefault);
                }
                Stmt::Return { .. } => {
                    graph.add_edge(node, exit, CfgEdge::FallThrough);
                }
                _ => {
                    graph.add_edge(node, next_node(index), CfgEdge::FallThrough);
                }
            }
        }
        Cfg {
            method,
            graph,
            entry,
            exit,
            stmt_nodes,
        }
    }

    /// The method this graph belongs to.
    pub fn method(&self) -> MethodId {
        self.method
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<CfgNode, CfgEdge> {
        &self.graph
    }

    /// The artificial entry node.
    pub fn entry(&self) -> NodeIndex {
        self.entry
    }

    /// The artificial exit node.
    pub fn exit(&self) -> NodeIndex {
        self.exit
    }

    /// The node of the statement with the given index.
    pub fn stmt_node(&self, index: usize) -> NodeIndex {
        self.stmt_nodes[index]
    }

    /// The statement index of a node, or `None` for the entry and exit nodes.
    pub fn stmt_index(&self, node: NodeIndex) -> Option<usize> {
        match self.graph[node] {
            CfgNode::Stmt(index) => Some(index),
            _ => None,
        }
    }

    /// Iterate over the successor nodes of a node.
    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(node)
    }

    /// Iterate over the outgoing edges of a node as `(label, target)` pairs.
    pub fn out_edges(&self, node: NodeIndex) -> impl Iterator<Item = (CfgEdge, NodeIndex)> + '_ {
        self.graph
            .edges(node)
            .map(|edge| (*edge.weight(), edge.target()))
    }
}

/// The node type of the interprocedural control flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum IcfgNode {
    /// The artificial entry node of a method.
    Entry(MethodId),
    /// The artificial exit node of a method.
    Exit(MethodId),
    /// A statement.
    Stmt(StmtRef),
}

/// The edge type of the interprocedural control flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum IcfgEdge {
    /// An intraprocedural edge.
    /// Branch labels are irrelevant interprocedurally and not preserved.
    Normal,
    /// The intraprocedural edge skipping over a call site
    /// to the point where the call returns to.
    CallToReturn,
    /// An edge from a call site to the entry node of a callee.
    Call {
        /// The called method.
        callee: MethodId,
    },
    /// An edge from the exit node of a callee back to the return site.
    Return {
        /// The called method.
        callee: MethodId,
        /// The call site the callee was entered from.
        call_site: StmtRef,
    },
}

/// The interprocedural control flow graph of a program.
///
/// Contains the statements of all methods reachable in the given call graph,
/// plus one artificial entry and exit node per method.
pub struct Icfg {
    graph: DiGraph<IcfgNode, IcfgEdge>,
    nodes: FnvHashMap<IcfgNode, NodeIndex>,
    entry_method: MethodId,
}

impl Icfg {
    /// Build the interprocedural control flow graph
    /// for all methods reachable in the given call graph.
    pub fn new(program: &Program, call_graph: &CallGraph) -> Icfg {
        let mut graph = DiGraph::new();
        let mut nodes: FnvHashMap<IcfgNode, NodeIndex> = FnvHashMap::default();
        let methods: Vec<MethodId> = call_graph
            .reachable_methods()
            .filter(|method| program.ir(*method).is_some())
            .collect();

        for &method in &methods {
            let ir = program.ir(method).unwrap();
            for label in [IcfgNode::Entry(method), IcfgNode::Exit(method)] {
                nodes.insert(label, graph.add_node(label));
            }
            for index in 0..ir.stmts.len() {
                let label = IcfgNode::Stmt(StmtRef { method, index });
                nodes.insert(label, graph.add_node(label));
            }
        }

        for &method in &methods {
            let ir = program.ir(method).unwrap();
            let stmt_node = |nodes: &FnvHashMap<IcfgNode, NodeIndex>, index: usize| {
                if index < ir.stmts.len() {
                    nodes[&IcfgNode::Stmt(StmtRef { method, index })]
                } else {
                    nodes[&IcfgNode::Exit(method)]
                }
            };
            let first = stmt_node(&nodes, 0);
            graph.add_edge(nodes[&IcfgNode::Entry(method)], first, IcfgEdge::Normal);
            for (index, stmt) in ir.stmts.iter().enumerate() {
                let node = stmt_node(&nodes, index);
                match stmt {
                    Stmt::Goto { target } => {
                        graph.add_edge(node, stmt_node(&nodes, *target), IcfgEdge::Normal);
                    }
                    Stmt::If { target, .. } => {
                        graph.add_edge(node, stmt_node(&nodes, *target), IcfgEdge::Normal);
                        graph.add_edge(node, stmt_node(&nodes, index + 1), IcfgEdge::Normal);
                    }
                    Stmt::Switch { cases, default, .. } => {
                        for (_, target) in cases {
                            graph.add_edge(node, stmt_node(&nodes, *target), IcfgEdge::Normal);
                        }
                        graph.add_edge(node, stmt_node(&nodes, *default), IcfgEdge::Normal);
                    }
                    Stmt::Return { .. } => {
                        graph.add_edge(node, nodes[&IcfgNode::Exit(method)], IcfgEdge::Normal);
                    }
                    Stmt::Invoke(_) => {
                        let call_site = StmtRef { method, index };
                        let return_site = stmt_node(&nodes, index + 1);
                        let callees: Vec<MethodId> = call_graph
                            .callees_of(call_site)
                            .iter()
                            .copied()
                            .filter(|callee| program.ir(*callee).is_some())
                            .collect();
                        if callees.is_empty() {
                            graph.add_edge(node, return_site, IcfgEdge::Normal);
                        } else {
                            graph.add_edge(node, return_site, IcfgEdge::CallToReturn);
                            for callee in callees {
                                graph.add_edge(
                                    node,
                                    nodes[&IcfgNode::Entry(callee)],
                                    IcfgEdge::Call { callee },
                                );
                                graph.add_edge(
                                    nodes[&IcfgNode::Exit(callee)],
                                    return_site,
                                    IcfgEdge::Return { callee, call_site },
                                );
                            }
                        }
                    }
                    _ => {
                        graph.add_edge(node, stmt_node(&nodes, index + 1), IcfgEdge::Normal);
                    }
                }
            }
        }

        Icfg {
            graph,
            nodes,
            entry_method: call_graph.entry(),
        }
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<IcfgNode, IcfgEdge> {
        &self.graph
    }

    /// The node index of the given node label, if the label is in the graph.
    pub fn node(&self, label: IcfgNode) -> Option<NodeIndex> {
        self.nodes.get(&label).copied()
    }

    /// The node of a statement.
    /// Panics for statements of methods that are not part of the graph.
    pub fn stmt_node(&self, stmt: StmtRef) -> NodeIndex {
        self.nodes[&IcfgNode::Stmt(stmt)]
    }

    /// The entry node of the whole graph,
    /// i.e. the entry node of the call graph's entry method.
    pub fn entry_node(&self) -> NodeIndex {
        self.nodes[&IcfgNode::Entry(self.entry_method)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate_representation::{BinaryOp, Exp, ProgramBuilder, Type};

    #[test]
    fn cfg_branch_edges() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    // 0: x = 1
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(1),
                    },
                    // 1: if (x == x) goto 3
                    Stmt::If {
                        cond: Exp::Binary {
                            op: BinaryOp::Eq,
                            lhs: x,
                            rhs: x,
                        },
                        target: 3,
                    },
                    // 2: x = 2
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(2),
                    },
                    // 3: return
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let cfg = Cfg::new(&program, method);

        let branch_edges: Vec<(CfgEdge, usize)> = cfg
            .out_edges(cfg.stmt_node(1))
            .map(|(label, target)| (label, cfg.stmt_index(target).unwrap()))
            .collect();
        assert!(branch_edges.contains(&(CfgEdge::IfTrue, 3)));
        assert!(branch_edges.contains(&(CfgEdge::IfFalse, 2)));
        // The return statement flows into the exit node.
        assert!(cfg.successors(cfg.stmt_node(3)).any(|n| n == cfg.exit()));
    }
}

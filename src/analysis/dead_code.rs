//! Dead-code detection.
//!
//! A statement is reported as dead if it is either
//! * **unreachable**: no execution reaches it, taking constant-folded
//!   branch conditions into account, or
//! * a **dead assignment**: an assignment without side effects
//!   whose left-hand side is not live afterwards.
//!
//! Unreachability is determined by three graph traversals from the entry
//! node: plain control flow, control flow with folded `If` branches and
//! control flow with folded `Switch` branches. Each traversal
//! over-approximates reachability along one dimension; a statement counts as
//! reachable only if all three traversals visit it.

use std::collections::BTreeSet;

use petgraph::graph::NodeIndex;

use super::constant_propagation::{evaluate, CpFact};
use super::dataflow::{DataflowResult, SetFact};
use super::graph::{Cfg, CfgEdge};
use crate::intermediate_representation::{BinaryOp, Exp, Program, Stmt, StmtRef, VarId};

/// Detect the dead statements of one method.
///
/// `constants` and `live` are the constant-propagation and live-variable
/// results of the same control flow graph.
/// The returned set is ordered by statement index.
pub fn find_dead_code(
    program: &Program,
    cfg: &Cfg,
    constants: &DataflowResult<CpFact>,
    live: &DataflowResult<SetFact<VarId>>,
) -> BTreeSet<StmtRef> {
    let method = cfg.method();
    let stmts = &program.ir(method).expect("method without body").stmts;
    let stmt_at = |node: NodeIndex| cfg.stmt_index(node).map(|index| &stmts[index]);

    let plain = visit(cfg, |node| cfg.successors(node).collect());
    let if_folded = visit(cfg, |node| match stmt_at(node) {
        Some(Stmt::If { cond, .. }) => {
            match evaluate(program, cond, constants.in_fact(node)).const_value() {
                Some(constant) => {
                    let taken = if constant != 0 {
                        CfgEdge::IfTrue
                    } else {
                        CfgEdge::IfFalse
                    };
                    cfg.out_edges(node)
                        .filter(|(label, _)| *label == taken)
                        .map(|(_, target)| target)
                        .collect()
                }
                None => cfg.successors(node).collect(),
            }
        }
        _ => cfg.successors(node).collect(),
    });
    let switch_folded = visit(cfg, |node| match stmt_at(node) {
        Some(Stmt::Switch { var, .. }) => {
            match evaluate(program, &Exp::Var(*var), constants.in_fact(node)).const_value() {
                Some(constant) => {
                    let case_target = cfg
                        .out_edges(node)
                        .find(|(label, _)| *label == CfgEdge::SwitchCase(constant));
                    let taken = case_target.or_else(|| {
                        cfg.out_edges(node)
                            .find(|(label, _)| *label == CfgEdge::SwitchDefault)
                    });
                    taken.map(|(_, target)| target).into_iter().collect()
                }
                None => cfg.successors(node).collect(),
            }
        }
        _ => cfg.successors(node).collect(),
    });

    let mut dead = BTreeSet::new();
    for node in cfg.graph().node_indices() {
        let Some(index) = cfg.stmt_index(node) else {
            continue;
        };
        let reachable =
            plain[node.index()] && if_folded[node.index()] && switch_folded[node.index()];
        if !reachable {
            dead.insert(StmtRef { method, index });
        }
    }

    // Dead assignments among the statements reachable by plain control flow.
    for node in cfg.graph().node_indices() {
        if !plain[node.index()] {
            continue;
        }
        if let Some(Stmt::Assign { lhs, rhs }) = stmt_at(node) {
            if has_no_side_effect(rhs) && !live.out_fact(node).contains(lhs) {
                dead.insert(StmtRef {
                    method,
                    index: cfg.stmt_index(node).unwrap(),
                });
            }
        }
    }
    dead
}

/// Traverse the graph from the entry node with an explicit stack,
/// following the successors chosen by `succs_of`.
/// Returns the visited-flag per node index.
fn visit(cfg: &Cfg, succs_of: impl Fn(NodeIndex) -> Vec<NodeIndex>) -> Vec<bool> {
    let mut visited = vec![false; cfg.graph().node_count()];
    let mut stack = vec![cfg.entry()];
    while let Some(node) = stack.pop() {
        if visited[node.index()] {
            continue;
        }
        visited[node.index()] = true;
        for succ in succs_of(node) {
            if !visited[succ.index()] {
                stack.push(succ);
            }
        }
    }
    visited
}

/// Whether evaluating the expression can have an observable side effect.
///
/// Allocations, casts and field/array accesses are separate statement kinds
/// and never qualify as dead assignments; within [`Exp`] only DIV and REM
/// can throw.
fn has_no_side_effect(exp: &Exp) -> bool {
    match exp {
        Exp::Binary { op, .. } => !matches!(op, BinaryOp::Div | BinaryOp::Rem),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::constant_propagation::ConstantPropagation;
    use crate::analysis::dataflow;
    use crate::analysis::liveness::LiveVariableAnalysis;
    use crate::intermediate_representation::{MethodId, ProgramBuilder, Type};

    fn analyze(program: &Program, method: MethodId) -> BTreeSet<usize> {
        let cfg = Cfg::new(program, method);
        let constants = dataflow::solve(&ConstantPropagation::new(program), &cfg);
        let live = dataflow::solve(&LiveVariableAnalysis::new(program), &cfg);
        find_dead_code(program, &cfg, &constants, &live)
            .into_iter()
            .map(|stmt| stmt.index)
            .collect()
    }

    #[test]
    fn folded_if_branch_is_dead() {
        // t = 1; if (t == t) goto 4; x = 2; goto 5; x = 1; return
        // The false branch (statement 2 and its goto) is dead.
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let t = builder.add_var(method, "t", Type::Int).unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        let y = builder.add_var(method, "y", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    // 0
                    Stmt::Assign {
                        lhs: t,
                        rhs: Exp::IntLiteral(1),
                    },
                    // 1: if (t == t) goto 4
                    Stmt::If {
                        cond: Exp::Binary {
                            op: BinaryOp::Eq,
                            lhs: t,
                            rhs: t,
                        },
                        target: 4,
                    },
                    // 2: x = 2   (dead: only on the false branch)
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(2),
                    },
                    // 3: goto 5
                    Stmt::Goto { target: 5 },
                    // 4: x = 1
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(1),
                    },
                    // 5: y = x  (y is never read, a dead assignment)
                    Stmt::Assign {
                        lhs: y,
                        rhs: Exp::Var(x),
                    },
                    // 6: return
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let dead = analyze(&program, method);
        assert!(dead.contains(&2));
        assert!(dead.contains(&3));
        assert!(!dead.contains(&4));
        // y is never read afterwards, so statement 5 is a dead assignment.
        assert!(dead.contains(&5));
    }

    #[test]
    fn division_by_zero_is_not_a_dead_assignment() {
        // x = 0; z = 10 / x; return  —  z is never read,
        // but the division can throw and must be kept.
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        let ten = builder.add_var(method, "ten", Type::Int).unwrap();
        let z = builder.add_var(method, "z", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(0),
                    },
                    Stmt::Assign {
                        lhs: ten,
                        rhs: Exp::IntLiteral(10),
                    },
                    Stmt::Assign {
                        lhs: z,
                        rhs: Exp::Binary {
                            op: BinaryOp::Div,
                            lhs: ten,
                            rhs: x,
                        },
                    },
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let dead = analyze(&program, method);
        assert!(!dead.contains(&2));
        // The helper constants are read by the division, hence not dead either.
        assert!(!dead.contains(&0));
        assert!(!dead.contains(&1));
    }

    #[test]
    fn folded_switch_keeps_matching_case() {
        // s = 2; switch (s) { case 1: ..; case 2: ..; default: .. }
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Int, true, false)
            .unwrap();
        let s = builder.add_var(method, "s", Type::Int).unwrap();
        let r = builder.add_var(method, "r", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    // 0: s = 2
                    Stmt::Assign {
                        lhs: s,
                        rhs: Exp::IntLiteral(2),
                    },
                    // 1: switch
                    Stmt::Switch {
                        var: s,
                        cases: vec![(1, 2), (2, 4)],
                        default: 6,
                    },
                    // 2: r = 10 (case 1, dead)
                    Stmt::Assign {
                        lhs: r,
                        rhs: Exp::IntLiteral(10),
                    },
                    // 3: goto 7
                    Stmt::Goto { target: 7 },
                    // 4: r = 20 (case 2, taken)
                    Stmt::Assign {
                        lhs: r,
                        rhs: Exp::IntLiteral(20),
                    },
                    // 5: goto 7
                    Stmt::Goto { target: 7 },
                    // 6: r = 30 (default, dead)
                    Stmt::Assign {
                        lhs: r,
                        rhs: Exp::IntLiteral(30),
                    },
                    // 7: return r
                    Stmt::Return { value: Some(r) },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let dead = analyze(&program, method);
        assert!(dead.contains(&2));
        assert!(dead.contains(&3));
        assert!(dead.contains(&6));
        assert!(!dead.contains(&4));
        assert!(!dead.contains(&5));
        assert!(!dead.contains(&7));
    }
}

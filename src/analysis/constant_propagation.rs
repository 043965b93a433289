//! Intraprocedural constant propagation for integer-holding variables.
//!
//! The abstract domain per variable is the three-point lattice
//! `UNDEF ⊑ CONST(n) ⊑ NAC`:
//! * `UNDEF` — no value has been observed yet (the bottom element),
//! * `CONST(n)` — the variable always holds the 32-bit integer `n`,
//! * `NAC` — "not a constant" (the top element).
//!
//! Only variables whose type can hold an `int`
//! (byte, short, int, char, boolean) are tracked;
//! see [`Type::can_hold_int`](crate::intermediate_representation::Type::can_hold_int).
//! Arithmetic wraps around like 32-bit arithmetic of the source language.
//! Division or remainder by a constant zero evaluates to `UNDEF`:
//! the statement always throws at runtime,
//! so no value would be produced that could reach a later program point.

use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;

use super::dataflow::DataflowAnalysis;
use super::graph::{Cfg, CfgNode};
use crate::intermediate_representation::{BinaryOp, Exp, Program, Stmt, VarId};
use crate::prelude::*;

/// An abstract integer value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Value {
    /// No value observed yet. The bottom element of the lattice.
    Undef,
    /// Exactly this integer.
    Const(i32),
    /// Not a constant. The top element of the lattice.
    Nac,
}

impl Value {
    /// Returns true iff the value is `Undef`.
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Returns true iff the value is a constant.
    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    /// Returns true iff the value is `Nac`.
    pub fn is_nac(&self) -> bool {
        matches!(self, Value::Nac)
    }

    /// The contained constant, if the value is one.
    pub fn const_value(&self) -> Option<i32> {
        match self {
            Value::Const(constant) => Some(*constant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undef => write!(formatter, "UNDEF"),
            Value::Const(constant) => write!(formatter, "{constant}"),
            Value::Nac => write!(formatter, "NAC"),
        }
    }
}

/// The meet of two abstract values.
///
/// Commutative, associative and idempotent:
/// `NAC ⊓ v = NAC`, `UNDEF ⊓ v = v`,
/// and two distinct constants meet to `NAC`.
pub fn meet_value(v1: Value, v2: Value) -> Value {
    match (v1, v2) {
        (Value::Nac, _) | (_, Value::Nac) => Value::Nac,
        (Value::Undef, v) | (v, Value::Undef) => v,
        (Value::Const(c1), Value::Const(c2)) => {
            if c1 == c2 {
                v1
            } else {
                Value::Nac
            }
        }
    }
}

/// A constant-propagation fact: a mapping from variables to abstract values.
///
/// Variables without an entry are implicitly `Undef`;
/// the map never stores explicit `Undef` entries,
/// so two facts are equal iff they agree on every variable they mention.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct CpFact(BTreeMap<VarId, Value>);

impl CpFact {
    /// Create an all-`Undef` fact.
    pub fn new() -> CpFact {
        CpFact::default()
    }

    /// The value of the given variable.
    pub fn get(&self, var: VarId) -> Value {
        self.0.get(&var).copied().unwrap_or(Value::Undef)
    }

    /// Set the value of the given variable.
    /// Returns whether the fact changed.
    pub fn update(&mut self, var: VarId, value: Value) -> bool {
        if value.is_undef() {
            self.0.remove(&var).is_some()
        } else {
            self.0.insert(var, value) != Some(value)
        }
    }

    /// Remove the entry of the given variable, resetting it to `Undef`.
    pub fn remove(&mut self, var: VarId) -> bool {
        self.0.remove(&var).is_some()
    }

    /// Copy all entries of `other` into this fact.
    /// Returns whether the fact changed.
    pub fn copy_from(&mut self, other: &CpFact) -> bool {
        let mut changed = false;
        for (var, value) in &other.0 {
            changed |= self.update(*var, *value);
        }
        changed
    }

    /// Iterate over the variables with a non-`Undef` value.
    pub fn keys(&self) -> impl Iterator<Item = VarId> + '_ {
        self.0.keys().copied()
    }
}

/// Evaluate an expression to an abstract value under the given fact.
///
/// The function is pure: the same expression and fact always produce the
/// same value.
pub fn evaluate(program: &Program, exp: &Exp, fact: &CpFact) -> Value {
    match exp {
        Exp::Var(var) => {
            if program.can_hold_int(*var) {
                fact.get(*var)
            } else {
                Value::Nac
            }
        }
        Exp::IntLiteral(literal) => Value::Const(*literal),
        Exp::Binary { op, lhs, rhs } => {
            let v1 = fact.get(*lhs);
            let v2 = fact.get(*rhs);
            if op.is_arithmetic() && !(program.can_hold_int(*lhs) && program.can_hold_int(*rhs)) {
                return Value::Undef;
            }
            match (v1, v2) {
                (Value::Const(c1), Value::Const(c2)) => evaluate_const(*op, c1, c2),
                _ if v1.is_nac() || v2.is_nac() => {
                    // A division by constant zero throws even if the dividend
                    // is unknown, so no value reaches the next program point.
                    if op.may_throw() && v2 == Value::Const(0) {
                        Value::Undef
                    } else {
                        Value::Nac
                    }
                }
                _ => Value::Undef,
            }
        }
    }
}

/// Apply a binary operator to two known constants with 32-bit semantics.
fn evaluate_const(op: BinaryOp, c1: i32, c2: i32) -> Value {
    use BinaryOp::*;
    let result = match op {
        Add => c1.wrapping_add(c2),
        Sub => c1.wrapping_sub(c2),
        Mul => c1.wrapping_mul(c2),
        Div | Rem if c2 == 0 => return Value::Undef,
        Div => c1.wrapping_div(c2),
        Rem => c1.wrapping_rem(c2),
        Eq => (c1 == c2) as i32,
        Ne => (c1 != c2) as i32,
        Lt => (c1 < c2) as i32,
        Le => (c1 <= c2) as i32,
        Gt => (c1 > c2) as i32,
        Ge => (c1 >= c2) as i32,
        // The shift amount is reduced mod 32, like in the source language.
        Shl => c1.wrapping_shl(c2 as u32),
        Shr => c1.wrapping_shr(c2 as u32),
        Ushr => ((c1 as u32).wrapping_shr(c2 as u32)) as i32,
        And => c1 & c2,
        Or => c1 | c2,
        Xor => c1 ^ c2,
    };
    Value::Const(result)
}

/// The intraprocedural constant-propagation analysis.
///
/// A forward dataflow problem to be solved with
/// [`dataflow::solve`](super::dataflow::solve).
pub struct ConstantPropagation<'a> {
    program: &'a Program,
}

impl<'a> ConstantPropagation<'a> {
    /// Create the analysis for the given program.
    pub fn new(program: &'a Program) -> ConstantPropagation<'a> {
        ConstantPropagation { program }
    }

    /// The transfer function of a single statement.
    /// Also used by the interprocedural variant for all statement kinds
    /// it does not overrule.
    pub fn transfer_stmt(&self, stmt: &Stmt, in_fact: &CpFact, out_fact: &mut CpFact) -> bool {
        match (stmt.def(), stmt) {
            (Some(lhs), _) => {
                let mut changed = out_fact.copy_from(in_fact);
                let value = match stmt {
                    Stmt::Assign { rhs, .. } => evaluate(self.program, rhs, in_fact),
                    // Loads, allocations, casts and call results
                    // are not evaluable and go straight to NAC.
                    _ => Value::Nac,
                };
                let value = if self.program.can_hold_int(lhs) {
                    value
                } else {
                    Value::Undef
                };
                changed |= out_fact.update(lhs, value);
                changed
            }
            _ => out_fact.copy_from(in_fact),
        }
    }
}

impl DataflowAnalysis for ConstantPropagation<'_> {
    type Fact = CpFact;

    fn is_forward(&self) -> bool {
        true
    }

    /// Formal parameters that can hold an `int` are `NAC` at method entry;
    /// everything else starts out as `Undef`.
    fn boundary_fact(&self, cfg: &Cfg) -> CpFact {
        let mut fact = CpFact::new();
        let ir = self.program.ir(cfg.method()).expect("method without body");
        for param in &ir.params {
            if self.program.can_hold_int(*param) {
                fact.update(*param, Value::Nac);
            }
        }
        fact
    }

    fn initial_fact(&self) -> CpFact {
        CpFact::new()
    }

    /// Meet per variable. Variables only mentioned in `target` keep their
    /// value, since `v ⊓ UNDEF = v`.
    fn meet_into(&self, fact: &CpFact, target: &mut CpFact) -> bool {
        let mut changed = false;
        for var in fact.keys() {
            let met = meet_value(fact.get(var), target.get(var));
            changed |= target.update(var, met);
        }
        changed
    }

    fn transfer_node(
        &self,
        cfg: &Cfg,
        node: NodeIndex,
        source: &CpFact,
        target: &mut CpFact,
    ) -> bool {
        match cfg.graph()[node] {
            CfgNode::Stmt(index) => {
                let stmt = &self.program.ir(cfg.method()).unwrap().stmts[index];
                self.transfer_stmt(stmt, source, target)
            }
            _ => target.copy_from(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dataflow;
    use crate::intermediate_representation::{ProgramBuilder, Type};

    fn value_lattice_points() -> Vec<Value> {
        vec![Value::Undef, Value::Const(0), Value::Const(17), Value::Nac]
    }

    #[test]
    fn meet_is_commutative_and_idempotent() {
        for v1 in value_lattice_points() {
            assert_eq!(meet_value(v1, v1), v1);
            for v2 in value_lattice_points() {
                assert_eq!(meet_value(v1, v2), meet_value(v2, v1));
            }
        }
    }

    #[test]
    fn meet_table() {
        assert_eq!(meet_value(Value::Nac, Value::Const(1)), Value::Nac);
        assert_eq!(meet_value(Value::Undef, Value::Const(1)), Value::Const(1));
        assert_eq!(meet_value(Value::Const(2), Value::Const(2)), Value::Const(2));
        assert_eq!(meet_value(Value::Const(2), Value::Const(3)), Value::Nac);
    }

    #[test]
    fn fact_absent_is_undef() {
        let mut fact = CpFact::new();
        assert_eq!(fact.get(VarId(0)), Value::Undef);
        assert!(fact.update(VarId(0), Value::Const(1)));
        assert!(!fact.update(VarId(0), Value::Const(1)));
        // Storing Undef is the same as removing the entry.
        assert!(fact.update(VarId(0), Value::Undef));
        assert_eq!(fact, CpFact::new());
    }

    /// Build `int main() { x = <lhs>; y = <rhs>; z = x <op> y; return z; }`
    /// and return the fact after the last assignment.
    fn eval_binary(op: BinaryOp, lhs: i32, rhs: i32) -> Value {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Int, true, false)
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        let y = builder.add_var(method, "y", Type::Int).unwrap();
        let z = builder.add_var(method, "z", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(lhs),
                    },
                    Stmt::Assign {
                        lhs: y,
                        rhs: Exp::IntLiteral(rhs),
                    },
                    Stmt::Assign {
                        lhs: z,
                        rhs: Exp::Binary { op, lhs: x, rhs: y },
                    },
                    Stmt::Return { value: Some(z) },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let cfg = Cfg::new(&program, method);
        let analysis = ConstantPropagation::new(&program);
        let result = dataflow::solve(&analysis, &cfg);
        result.out_fact(cfg.stmt_node(2)).get(z)
    }

    #[test]
    fn constant_arithmetic() {
        assert_eq!(eval_binary(BinaryOp::Add, 1, 2), Value::Const(3));
        assert_eq!(eval_binary(BinaryOp::Mul, 6, 7), Value::Const(42));
        assert_eq!(eval_binary(BinaryOp::Add, i32::MAX, 1), Value::Const(i32::MIN));
        assert_eq!(eval_binary(BinaryOp::Rem, 7, 3), Value::Const(1));
    }

    #[test]
    fn division_by_constant_zero_is_undef() {
        assert_eq!(eval_binary(BinaryOp::Div, 10, 0), Value::Undef);
        assert_eq!(eval_binary(BinaryOp::Rem, 10, 0), Value::Undef);
    }

    #[test]
    fn comparisons_yield_zero_or_one() {
        assert_eq!(eval_binary(BinaryOp::Lt, 1, 2), Value::Const(1));
        assert_eq!(eval_binary(BinaryOp::Ge, 1, 2), Value::Const(0));
    }

    #[test]
    fn shifts_use_low_five_bits() {
        assert_eq!(eval_binary(BinaryOp::Shl, 1, 33), Value::Const(2));
        assert_eq!(eval_binary(BinaryOp::Ushr, -1, 28), Value::Const(15));
        assert_eq!(eval_binary(BinaryOp::Shr, -8, 1), Value::Const(-4));
    }

    #[test]
    fn nac_divided_by_constant_zero_is_undef() {
        // z = p / y with p a parameter (NAC) and y = 0.
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "f", &[Type::Int], Type::Int, true, false)
            .unwrap();
        let p = builder.add_var(method, "p", Type::Int).unwrap();
        let y = builder.add_var(method, "y", Type::Int).unwrap();
        let z = builder.add_var(method, "z", Type::Int).unwrap();
        builder.set_params(method, &[p]).unwrap();
        builder
            .set_body(
                method,
                vec![
                    Stmt::Assign {
                        lhs: y,
                        rhs: Exp::IntLiteral(0),
                    },
                    Stmt::Assign {
                        lhs: z,
                        rhs: Exp::Binary {
                            op: BinaryOp::Div,
                            lhs: p,
                            rhs: y,
                        },
                    },
                    Stmt::Return { value: Some(z) },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let cfg = Cfg::new(&program, method);
        let result = dataflow::solve(&ConstantPropagation::new(&program), &cfg);
        assert_eq!(result.out_fact(cfg.stmt_node(1)).get(z), Value::Undef);
        // The parameter itself stays NAC.
        assert_eq!(result.out_fact(cfg.stmt_node(1)).get(p), Value::Nac);
    }

    #[test]
    fn branch_join_meets_values() {
        // x = p ? 1 : 2; z = x + 1  =>  z is NAC at the join.
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "f", &[Type::Boolean], Type::Int, true, false)
            .unwrap();
        let p = builder.add_var(method, "p", Type::Boolean).unwrap();
        let zero = builder.add_var(method, "zero", Type::Int).unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        let one = builder.add_var(method, "one", Type::Int).unwrap();
        let z = builder.add_var(method, "z", Type::Int).unwrap();
        builder.set_params(method, &[p]).unwrap();
        builder
            .set_body(
                method,
                vec![
                    // 0: zero = 0
                    Stmt::Assign {
                        lhs: zero,
                        rhs: Exp::IntLiteral(0),
                    },
                    // 1: if (p != zero) goto 4
                    Stmt::If {
                        cond: Exp::Binary {
                            op: BinaryOp::Ne,
                            lhs: p,
                            rhs: zero,
                        },
                        target: 4,
                    },
                    // 2: x = 2
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
                    // 5: one = 1
                    Stmt::Assign {
                        lhs: one,
                        rhs: Exp::IntLiteral(1),
                    },
                    // 6: z = x + one
                    Stmt::Assign {
                        lhs: z,
                        rhs: Exp::Binary {
                            op: BinaryOp::Add,
                            lhs: x,
                            rhs: one,
                        },
                    },
                    // 7: return z
                    Stmt::Return { value: Some(z) },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let cfg = Cfg::new(&program, method);
        let result = dataflow::solve(&ConstantPropagation::new(&program), &cfg);
        assert_eq!(result.in_fact(cfg.stmt_node(6)).get(x), Value::Nac);
        assert_eq!(result.out_fact(cfg.stmt_node(6)).get(z), Value::Nac);
    }

    #[test]
    fn straight_line_constants() {
        // x = 1; y = 2; z = x + y  =>  z = 3 at exit.
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Int, true, false)
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        let y = builder.add_var(method, "y", Type::Int).unwrap();
        let z = builder.add_var(method, "z", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(1),
                    },
                    Stmt::Assign {
                        lhs: y,
                        rhs: Exp::IntLiteral(2),
                    },
                    Stmt::Assign {
                        lhs: z,
                        rhs: Exp::Binary {
                            op: BinaryOp::Add,
                            lhs: x,
                            rhs: y,
                        },
                    },
                    Stmt::Return { value: Some(z) },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let cfg = Cfg::new(&program, method);
        let analysis = ConstantPropagation::new(&program);
        let result = dataflow::solve(&analysis, &cfg);
        assert_eq!(result.in_fact(cfg.exit()).get(z), Value::Const(3));

        // Running the analysis twice yields the same result.
        let again = dataflow::solve(&analysis, &cfg);
        for node in cfg.graph().node_indices() {
            assert_eq!(again.in_fact(node), result.in_fact(node));
            assert_eq!(again.out_fact(node), result.out_fact(node));
        }
    }
}

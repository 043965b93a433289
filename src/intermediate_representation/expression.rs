use super::VarId;
use crate::prelude::*;

/// A binary operator of the source language.
///
/// All operators work on 32-bit signed integers;
/// comparison operators yield `1` for true and `0` for false.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BinaryOp {
    /// Addition with 32-bit wrap-around.
    Add,
    /// Subtraction with 32-bit wrap-around.
    Sub,
    /// Multiplication with 32-bit wrap-around.
    Mul,
    /// Signed division. Division by zero throws at runtime.
    Div,
    /// Signed remainder. Division by zero throws at runtime.
    Rem,
    /// Equality comparison.
    Eq,
    /// Inequality comparison.
    Ne,
    /// Signed less-than comparison.
    Lt,
    /// Signed less-than-or-equal comparison.
    Le,
    /// Signed greater-than comparison.
    Gt,
    /// Signed greater-than-or-equal comparison.
    Ge,
    /// Left shift. Only the low 5 bits of the shift amount are used.
    Shl,
    /// Arithmetic (sign-extending) right shift.
    Shr,
    /// Logical (zero-extending) right shift.
    Ushr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

impl BinaryOp {
    /// Returns true for the arithmetic operators ADD/SUB/MUL/DIV/REM.
    pub fn is_arithmetic(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Add | Sub | Mul | Div | Rem)
    }

    /// Returns true for the comparison operators.
    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    /// Returns true iff evaluating the operator can throw at runtime,
    /// i.e. for DIV and REM.
    pub fn may_throw(&self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }
}

/// The right-hand side of an [`Assign`](super::Stmt::Assign) statement.
///
/// The representation is three-address code:
/// operands of binary expressions are always variables, never nested
/// expressions.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Exp {
    /// A variable read, i.e. the statement is a copy.
    Var(VarId),
    /// A 32-bit integer literal.
    IntLiteral(i32),
    /// A binary expression over two variables.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// The left operand.
        lhs: VarId,
        /// The right operand.
        rhs: VarId,
    },
}

impl Exp {
    /// The variables read by the expression.
    pub fn input_vars(&self) -> Vec<VarId> {
        match self {
            Exp::Var(var) => vec![*var],
            Exp::IntLiteral(_) => Vec::new(),
            Exp::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}

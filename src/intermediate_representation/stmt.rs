use super::{ClassId, Exp, FieldId, Subsignature, Type, VarId};
use crate::prelude::*;

/// The kind of a call site.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum CallKind {
    /// A call to a static method. Resolves to a single target.
    Static,
    /// A call to a constructor, private method or superclass method.
    /// Resolves by dispatch on the declared class.
    Special,
    /// A call dispatched on the dynamic type of the receiver object.
    Virtual,
    /// Like [`CallKind::Virtual`], but the declared class is an interface.
    Interface,
}

/// An unresolved reference to a method, as it occurs at call sites.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct MethodRef {
    /// The class declared at the call site.
    pub class: ClassId,
    /// The subsignature used for dispatch.
    pub subsignature: Subsignature,
}

/// A method call.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Invoke {
    /// The kind of the call site.
    pub kind: CallKind,
    /// The variable receiving the return value, if any.
    pub result: Option<VarId>,
    /// The receiver variable. `None` iff the call is static.
    pub base: Option<VarId>,
    /// The declared target of the call.
    pub method_ref: MethodRef,
    /// The argument variables.
    pub args: Vec<VarId>,
}

/// A statement of a method body.
///
/// Statements are classified into the kinds that the analyses distinguish;
/// each analysis dispatches with a single `match` over this type.
/// Branch targets are statement indices into the containing method body.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Stmt {
    /// `x = literal`, `x = y` or `x = y op z`.
    Assign {
        /// The assigned variable.
        lhs: VarId,
        /// The right-hand side.
        rhs: Exp,
    },
    /// `x = new C()`. An allocation site of the heap model.
    New {
        /// The variable receiving the fresh object.
        lhs: VarId,
        /// The instantiated class.
        class: ClassId,
    },
    /// `x = new T[..]`. An allocation site producing an array object.
    NewArray {
        /// The variable receiving the fresh array.
        lhs: VarId,
        /// The element type of the array.
        elem: Type,
    },
    /// `x = (T) y`.
    Cast {
        /// The assigned variable.
        lhs: VarId,
        /// The cast variable.
        rhs: VarId,
        /// The target type of the cast.
        target: Type,
    },
    /// `x = y.f` (instance load, `base` is `Some`) or `x = T.f` (static load).
    LoadField {
        /// The assigned variable.
        lhs: VarId,
        /// The base variable, or `None` for static loads.
        base: Option<VarId>,
        /// The accessed field.
        field: FieldId,
    },
    /// `y.f = x` (instance store, `base` is `Some`) or `T.f = x`.
    StoreField {
        /// The base variable, or `None` for static stores.
        base: Option<VarId>,
        /// The written field.
        field: FieldId,
        /// The stored variable.
        rhs: VarId,
    },
    /// `x = a[i]`.
    LoadArray {
        /// The assigned variable.
        lhs: VarId,
        /// The array base variable.
        base: VarId,
        /// The index variable.
        index: VarId,
    },
    /// `a[i] = x`.
    StoreArray {
        /// The array base variable.
        base: VarId,
        /// The index variable.
        index: VarId,
        /// The stored variable.
        rhs: VarId,
    },
    /// A method call, with or without a result variable.
    Invoke(Invoke),
    /// A conditional branch. Falls through when the condition is false.
    ///
    /// The condition is restricted to comparison expressions by the builder.
    If {
        /// The branch condition.
        cond: Exp,
        /// The statement index jumped to when the condition holds.
        target: usize,
    },
    /// An unconditional jump.
    Goto {
        /// The statement index jumped to.
        target: usize,
    },
    /// A multi-way branch on an integer selector.
    Switch {
        /// The selector variable.
        var: VarId,
        /// Pairs of case value and branch target.
        cases: Vec<(i32, usize)>,
        /// The branch target when no case matches.
        default: usize,
    },
    /// A method return, with or without a returned variable.
    Return {
        /// The returned variable, if any.
        value: Option<VarId>,
    },
    /// A statement without any effect.
    Nop,
}

impl Stmt {
    /// The variable defined (written) by the statement, if any.
    pub fn def(&self) -> Option<VarId> {
        match self {
            Stmt::Assign { lhs, .. }
            | Stmt::New { lhs, .. }
            | Stmt::NewArray { lhs, .. }
            | Stmt::Cast { lhs, .. }
            | Stmt::LoadField { lhs, .. }
            | Stmt::LoadArray { lhs, .. } => Some(*lhs),
            Stmt::Invoke(invoke) => invoke.result,
            _ => None,
        }
    }

    /// The variables read by the statement.
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Stmt::Assign { rhs, .. } => rhs.input_vars(),
            Stmt::New { .. } | Stmt::NewArray { .. } | Stmt::Goto { .. } | Stmt::Nop => Vec::new(),
            Stmt::Cast { rhs, .. } => vec![*rhs],
            Stmt::LoadField { base, .. } => base.iter().copied().collect(),
            Stmt::StoreField { base, rhs, .. } => {
                base.iter().copied().chain(std::iter::once(*rhs)).collect()
            }
            Stmt::LoadArray { base, index, .. } => vec![*base, *index],
            Stmt::StoreArray { base, index, rhs } => vec![*base, *index, *rhs],
            Stmt::Invoke(invoke) => invoke
                .base
                .iter()
                .copied()
                .chain(invoke.args.iter().copied())
                .collect(),
            Stmt::If { cond, .. } => cond.input_vars(),
            Stmt::Switch { var, .. } => vec![*var],
            Stmt::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Returns the contained call if the statement is a call site.
    pub fn as_invoke(&self) -> Option<&Invoke> {
        match self {
            Stmt::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }
}

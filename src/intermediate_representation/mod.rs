//! The intermediate representation of the programs under analysis.
//!
//! The analyses in this crate operate on a three-address representation of a
//! class-based object-oriented language with virtual dispatch, arrays,
//! instance and static fields and primitive integer arithmetic.
//! The representation is produced by an external front end through the
//! checked [`ProgramBuilder`] API and is immutable afterwards:
//! all analyses consume a [`Program`] as a read-only oracle.
//!
//! Classes, methods, fields and variables are stored in arenas inside the
//! [`Program`] and referenced through small copyable ids.
//! Statements are referenced through [`StmtRef`],
//! i.e. a method id plus the index of the statement in the method body.

use crate::prelude::*;

mod builder;
mod expression;
mod ir;
mod program;
mod stmt;
mod types;
mod variable;

pub use builder::ProgramBuilder;
pub use expression::{BinaryOp, Exp};
pub use ir::{Ir, Method, Subsignature};
pub use program::{Class, Field, Program, VarAccess};
pub use stmt::{CallKind, Invoke, MethodRef, Stmt};
pub use types::Type;
pub use variable::Variable;

/// The id of a class (or interface) of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct ClassId(pub usize);

/// The id of a method of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct MethodId(pub usize);

/// The id of a field of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct FieldId(pub usize);

/// The id of a variable of the analyzed program.
///
/// Variable ids are unique across the whole program,
/// i.e. two methods never share a variable id.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct VarId(pub usize);

/// A reference to a statement of the analyzed program.
///
/// The derived ordering (method first, then statement index) is the order
/// used for all observable statement sets.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct StmtRef {
    /// The method containing the statement.
    pub method: MethodId,
    /// The index of the statement in the statement sequence of the method.
    pub index: usize,
}

impl std::fmt::Display for StmtRef {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "m{}:{}", self.method.0, self.index)
    }
}

use super::Type;
use crate::prelude::*;

/// A local variable of a method.
///
/// Variables are owned by the [`Program`](super::Program) arena and referenced
/// through [`VarId`](super::VarId) handles; the handle carries no information
/// besides identity, the attached data lives here.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Variable {
    /// The name of the variable as reported by the front end.
    pub name: String,
    /// The declared type of the variable.
    pub ty: Type,
}

impl Variable {
    /// Returns true iff the variable is tracked by constant propagation.
    /// See [`Type::can_hold_int`].
    pub fn can_hold_int(&self) -> bool {
        self.ty.can_hold_int()
    }
}

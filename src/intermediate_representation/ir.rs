use super::{ClassId, Stmt, Type, VarId};
use crate::prelude::*;

/// A method subsignature: return type, name and parameter types,
/// excluding the declaring class. Used as the key for virtual dispatch.
///
/// The textual form is `<return type> <name>(<param>,<param>,..)`,
/// e.g. `int compare(java.lang.Object,java.lang.Object)`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Subsignature(String);

impl Subsignature {
    /// Create a subsignature from its textual form.
    pub fn new(text: impl Into<String>) -> Subsignature {
        Subsignature(text.into())
    }

    /// The number of parameters encoded in the subsignature.
    pub fn param_count(&self) -> usize {
        let inner = self
            .0
            .rsplit_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
            .unwrap_or("");
        if inner.is_empty() {
            0
        } else {
            inner.split(',').count()
        }
    }
}

impl std::fmt::Display for Subsignature {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A method of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Method {
    /// The declaring class.
    pub class: ClassId,
    /// The method name.
    pub name: String,
    /// The subsignature used for dispatch.
    pub subsignature: Subsignature,
    /// The declared parameter types.
    pub param_types: Vec<Type>,
    /// The declared return type.
    pub return_type: Type,
    /// Whether the method is static.
    pub is_static: bool,
    /// Whether the method is abstract. Abstract methods have no body.
    pub is_abstract: bool,
    /// The method body, or `None` for abstract methods.
    pub ir: Option<Ir>,
}

/// The body of a method in three-address form.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct Ir {
    /// The variable holding the receiver object. `None` for static methods.
    pub this_var: Option<VarId>,
    /// The formal parameter variables in declaration order.
    pub params: Vec<VarId>,
    /// The variables appearing in `return` statements of the body.
    pub return_vars: Vec<VarId>,
    /// All variables of the method, including `this` and the parameters.
    pub vars: Vec<VarId>,
    /// The statement sequence of the body.
    pub stmts: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsignature_param_count() {
        assert_eq!(Subsignature::new("void main()").param_count(), 0);
        assert_eq!(Subsignature::new("int f(int)").param_count(), 1);
        assert_eq!(
            Subsignature::new("int compare(java.lang.Object,java.lang.Object)").param_count(),
            2
        );
    }
}

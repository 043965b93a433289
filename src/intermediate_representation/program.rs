use std::collections::HashMap;

use super::{ClassId, FieldId, Ir, Method, MethodId, StmtRef, Subsignature, Type, VarId, Variable};
use crate::prelude::*;

/// A class or interface of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Class {
    /// The fully qualified name of the class.
    pub name: String,
    /// The superclass, or `None` for the hierarchy root and for interfaces
    /// without an explicit superinterface chain root.
    pub superclass: Option<ClassId>,
    /// The interfaces directly implemented (for classes)
    /// or directly extended (for interfaces).
    pub interfaces: Vec<ClassId>,
    /// Whether this entry is an interface.
    pub is_interface: bool,
    /// The methods declared in this class, keyed by subsignature.
    pub declared_methods: HashMap<Subsignature, MethodId>,
}

/// A field of the analyzed program.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Field {
    /// The declaring class.
    pub class: ClassId,
    /// The field name.
    pub name: String,
    /// The declared type of the field.
    pub ty: Type,
    /// Whether the field is static.
    pub is_static: bool,
}

/// Per-variable indexes of the statements a variable is the base of.
///
/// The pointer analysis work-list loop materializes field and array edges
/// lazily when the points-to set of a base variable grows; these indexes
/// make that lookup O(1) per variable.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct VarAccess {
    /// Instance loads `x = v.f` with this variable as base `v`.
    pub load_fields: Vec<StmtRef>,
    /// Instance stores `v.f = y` with this variable as base `v`.
    pub store_fields: Vec<StmtRef>,
    /// Array loads `x = v[i]` with this variable as base `v`.
    pub load_arrays: Vec<StmtRef>,
    /// Array stores `v[i] = y` with this variable as base `v`.
    pub store_arrays: Vec<StmtRef>,
    /// Call sites `v.m(..)` with this variable as receiver `v`.
    pub invokes: Vec<StmtRef>,
}

/// An immutable program: class hierarchy, methods with their bodies,
/// fields and variables.
///
/// Built once through [`ProgramBuilder`](super::ProgramBuilder);
/// all derived indexes (hierarchy queries, per-variable statement lists)
/// are computed at build time.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Program {
    pub(super) classes: Vec<Class>,
    pub(super) methods: Vec<Method>,
    pub(super) fields: Vec<Field>,
    pub(super) vars: Vec<Variable>,
    pub(super) main: Option<MethodId>,
    pub(super) direct_subclasses: Vec<Vec<ClassId>>,
    pub(super) direct_subinterfaces: Vec<Vec<ClassId>>,
    pub(super) direct_implementors: Vec<Vec<ClassId>>,
    pub(super) var_access: Vec<VarAccess>,
}

impl Program {
    /// Get a class by id.
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    /// Get a method by id.
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0]
    }

    /// Get a field by id.
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    /// Get a variable by id.
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    /// Iterate over all classes with their ids.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes.iter().enumerate().map(|(i, c)| (ClassId(i), c))
    }

    /// Iterate over all methods with their ids.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(i), m))
    }

    /// The entry method of the program, if one was declared.
    pub fn main_method(&self) -> Option<MethodId> {
        self.main
    }

    /// The body of the given method, or `None` if the method is abstract.
    pub fn ir(&self, method: MethodId) -> Option<&Ir> {
        self.method(method).ir.as_ref()
    }

    /// Get a statement by reference.
    /// Panics if the method is abstract or the index is out of range;
    /// the builder guarantees that references produced by this crate resolve.
    pub fn stmt(&self, stmt: StmtRef) -> &super::Stmt {
        &self.ir(stmt.method).expect("statement in abstract method").stmts[stmt.index]
    }

    /// Returns true iff the given variable is tracked by constant propagation.
    pub fn can_hold_int(&self, var: VarId) -> bool {
        self.var(var).can_hold_int()
    }

    /// The method with the given subsignature declared directly in `class`,
    /// i.e. without walking the superclass chain.
    pub fn declared_method(&self, class: ClassId, subsig: &Subsignature) -> Option<MethodId> {
        self.class(class).declared_methods.get(subsig).copied()
    }

    /// The superclass of the given class, if any.
    pub fn superclass(&self, class: ClassId) -> Option<ClassId> {
        self.class(class).superclass
    }

    /// The classes whose direct superclass is the given class.
    pub fn direct_subclasses(&self, class: ClassId) -> &[ClassId] {
        &self.direct_subclasses[class.0]
    }

    /// The interfaces directly extending the given interface.
    pub fn direct_subinterfaces(&self, class: ClassId) -> &[ClassId] {
        &self.direct_subinterfaces[class.0]
    }

    /// The classes directly implementing the given interface.
    pub fn direct_implementors(&self, class: ClassId) -> &[ClassId] {
        &self.direct_implementors[class.0]
    }

    /// The statement index of the given variable.
    pub fn var_access(&self, var: VarId) -> &VarAccess {
        &self.var_access[var.0]
    }

    /// Look up a class by its fully qualified name.
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.classes()
            .find(|(_, class)| class.name == name)
            .map(|(id, _)| id)
    }

    /// Look up a method declared in the named class by its subsignature text.
    pub fn method_by_signature(&self, class_name: &str, subsig: &str) -> Option<MethodId> {
        let class = self.class_by_name(class_name)?;
        self.declared_method(class, &Subsignature::new(subsig))
    }

    /// Parse a type from its textual name,
    /// e.g. `int`, `java.lang.String` or `java.lang.String[]`.
    pub fn type_by_name(&self, name: &str) -> Option<Type> {
        if let Some(elem) = name.strip_suffix("[]") {
            return Some(Type::Array(Box::new(self.type_by_name(elem)?)));
        }
        match name {
            "byte" => Some(Type::Byte),
            "short" => Some(Type::Short),
            "int" => Some(Type::Int),
            "char" => Some(Type::Char),
            "boolean" => Some(Type::Boolean),
            "long" => Some(Type::Long),
            "float" => Some(Type::Float),
            "double" => Some(Type::Double),
            "void" => Some(Type::Void),
            _ => self.class_by_name(name).map(Type::Reference),
        }
    }

    /// The textual name of a type.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Byte => "byte".into(),
            Type::Short => "short".into(),
            Type::Int => "int".into(),
            Type::Char => "char".into(),
            Type::Boolean => "boolean".into(),
            Type::Long => "long".into(),
            Type::Float => "float".into(),
            Type::Double => "double".into(),
            Type::Void => "void".into(),
            Type::Reference(class) => self.class(*class).name.clone(),
            Type::Array(elem) => format!("{}[]", self.type_name(elem)),
        }
    }
}

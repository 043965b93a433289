use std::collections::HashMap;

use itertools::Itertools;

use super::{
    Class, ClassId, Exp, Field, FieldId, Ir, Method, MethodId, Program, Stmt, Subsignature, Type,
    VarAccess, VarId, Variable,
};
use crate::prelude::*;

/// A checked builder for [`Program`] values.
///
/// The builder is the place where malformed IR is rejected:
/// every statement sequence is validated when it is attached to a method,
/// so the analyses can assume well-formed input afterwards.
///
/// ```
/// use tac_analysis::intermediate_representation::*;
///
/// let mut builder = ProgramBuilder::new();
/// let class = builder.add_class("Main", None, &[], false).unwrap();
/// let main = builder
///     .add_method(class, "main", &[], Type::Void, true, false)
///     .unwrap();
/// let x = builder.add_var(main, "x", Type::Int).unwrap();
/// builder
///     .set_body(
///         main,
///         vec![
///             Stmt::Assign { lhs: x, rhs: Exp::IntLiteral(42) },
///             Stmt::Return { value: None },
///         ],
///     )
///     .unwrap();
/// builder.set_main(main).unwrap();
/// let program = builder.finish().unwrap();
/// assert_eq!(program.main_method(), Some(main));
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    classes: Vec<Class>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    vars: Vec<Variable>,
    var_owner: Vec<MethodId>,
    main: Option<MethodId>,
}

impl ProgramBuilder {
    /// Create an empty builder.
    pub fn new() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Add a class or interface.
    /// Superclasses and interfaces must have been added before.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        superclass: Option<ClassId>,
        interfaces: &[ClassId],
        is_interface: bool,
    ) -> Result<ClassId, Error> {
        let name = name.into();
        if self.classes.iter().any(|class| class.name == name) {
            return Err(anyhow!("duplicate class name: {name}"));
        }
        for id in superclass.iter().chain(interfaces.iter()) {
            self.check_class(*id)?;
        }
        self.classes.push(Class {
            name,
            superclass,
            interfaces: interfaces.to_vec(),
            is_interface,
            declared_methods: HashMap::new(),
        });
        Ok(ClassId(self.classes.len() - 1))
    }

    /// Add a field to a class.
    pub fn add_field(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        ty: Type,
        is_static: bool,
    ) -> Result<FieldId, Error> {
        self.check_class(class)?;
        self.fields.push(Field {
            class,
            name: name.into(),
            ty,
            is_static,
        });
        Ok(FieldId(self.fields.len() - 1))
    }

    /// Add a method to a class.
    /// The subsignature is derived from the name and the declared types.
    pub fn add_method(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        param_types: &[Type],
        return_type: Type,
        is_static: bool,
        is_abstract: bool,
    ) -> Result<MethodId, Error> {
        self.check_class(class)?;
        let name = name.into();
        let subsignature = self.subsignature(&name, param_types, &return_type);
        let class_entry = &mut self.classes[class.0];
        if class_entry.declared_methods.contains_key(&subsignature) {
            return Err(anyhow!(
                "duplicate method {subsignature} in class {}",
                class_entry.name
            ));
        }
        let id = MethodId(self.methods.len());
        class_entry.declared_methods.insert(subsignature.clone(), id);
        self.methods.push(Method {
            class,
            name,
            subsignature,
            param_types: param_types.to_vec(),
            return_type,
            is_static,
            is_abstract,
            ir: if is_abstract { None } else { Some(Ir::default()) },
        });
        Ok(id)
    }

    /// The subsignature a method with the given name and types would get.
    pub fn subsignature(
        &self,
        name: &str,
        param_types: &[Type],
        return_type: &Type,
    ) -> Subsignature {
        Subsignature::new(format!(
            "{} {}({})",
            self.type_name(return_type),
            name,
            param_types.iter().map(|ty| self.type_name(ty)).join(",")
        ))
    }

    /// A [`MethodRef`](super::MethodRef) naming the given method
    /// through its declaring class.
    pub fn method_ref(&self, method: MethodId) -> super::MethodRef {
        let method = &self.methods[method.0];
        super::MethodRef {
            class: method.class,
            subsignature: method.subsignature.clone(),
        }
    }

    /// Add a local variable to a method body.
    pub fn add_var(
        &mut self,
        method: MethodId,
        name: impl Into<String>,
        ty: Type,
    ) -> Result<VarId, Error> {
        let id = VarId(self.vars.len());
        let ir = self.ir_mut(method)?;
        ir.vars.push(id);
        self.vars.push(Variable {
            name: name.into(),
            ty,
        });
        self.var_owner.push(method);
        Ok(id)
    }

    /// Declare the `this` variable of an instance method.
    pub fn set_this(&mut self, method: MethodId, var: VarId) -> Result<(), Error> {
        if self.methods[method.0].is_static {
            return Err(anyhow!("static methods have no `this` variable"));
        }
        self.check_var(method, var)?;
        self.ir_mut(method)?.this_var = Some(var);
        Ok(())
    }

    /// Declare the formal parameter variables of a method.
    /// The count must match the declared parameter types.
    pub fn set_params(&mut self, method: MethodId, params: &[VarId]) -> Result<(), Error> {
        if params.len() != self.methods[method.0].param_types.len() {
            return Err(anyhow!(
                "parameter count does not match the declared types of {}",
                self.methods[method.0].subsignature
            ));
        }
        for param in params {
            self.check_var(method, *param)?;
        }
        self.ir_mut(method)?.params = params.to_vec();
        Ok(())
    }

    /// Attach the statement sequence of a method body.
    ///
    /// Validates the sequence and fails fast on malformed IR:
    /// foreign variables, out-of-range branch targets, non-comparison branch
    /// conditions, call-site argument counts not matching the callee
    /// subsignature, and static/instance mismatches on field accesses.
    pub fn set_body(&mut self, method: MethodId, stmts: Vec<Stmt>) -> Result<(), Error> {
        let mut return_vars = Vec::new();
        for (index, stmt) in stmts.iter().enumerate() {
            self.check_stmt(method, stmt, stmts.len())
                .map_err(|err| anyhow!("statement {index} of method {method:?}: {err}"))?;
            if let Stmt::Return { value: Some(var) } = stmt {
                if !return_vars.contains(var) {
                    return_vars.push(*var);
                }
            }
        }
        let ir = self.ir_mut(method)?;
        ir.return_vars = return_vars;
        ir.stmts = stmts;
        Ok(())
    }

    /// Declare the entry method of the program.
    pub fn set_main(&mut self, method: MethodId) -> Result<(), Error> {
        let entry = &self.methods[method.0];
        if !entry.is_static || entry.is_abstract {
            return Err(anyhow!("the entry method must be static and concrete"));
        }
        self.main = Some(method);
        Ok(())
    }

    /// Finish building: compute the hierarchy and per-variable indexes
    /// and return the immutable program.
    pub fn finish(self) -> Result<Program, Error> {
        let class_count = self.classes.len();
        let mut direct_subclasses = vec![Vec::new(); class_count];
        let mut direct_subinterfaces = vec![Vec::new(); class_count];
        let mut direct_implementors = vec![Vec::new(); class_count];
        for (index, class) in self.classes.iter().enumerate() {
            let id = ClassId(index);
            if let Some(superclass) = class.superclass {
                if !class.is_interface {
                    direct_subclasses[superclass.0].push(id);
                }
            }
            for interface in &class.interfaces {
                if class.is_interface {
                    direct_subinterfaces[interface.0].push(id);
                } else {
                    direct_implementors[interface.0].push(id);
                }
            }
        }

        let mut var_access = vec![VarAccess::default(); self.vars.len()];
        for (method_index, method) in self.methods.iter().enumerate() {
            let Some(ir) = &method.ir else { continue };
            for (index, stmt) in ir.stmts.iter().enumerate() {
                let at = super::StmtRef {
                    method: MethodId(method_index),
                    index,
                };
                match stmt {
                    Stmt::LoadField {
                        base: Some(base), ..
                    } => var_access[base.0].load_fields.push(at),
                    Stmt::StoreField {
                        base: Some(base), ..
                    } => var_access[base.0].store_fields.push(at),
                    Stmt::LoadArray { base, .. } => var_access[base.0].load_arrays.push(at),
                    Stmt::StoreArray { base, .. } => var_access[base.0].store_arrays.push(at),
                    Stmt::Invoke(invoke) => {
                        if let Some(base) = invoke.base {
                            var_access[base.0].invokes.push(at);
                        }
                    }
                    _ => (),
                }
            }
        }

        Ok(Program {
            classes: self.classes,
            methods: self.methods,
            fields: self.fields,
            vars: self.vars,
            main: self.main,
            direct_subclasses,
            direct_subinterfaces,
            direct_implementors,
            var_access,
        })
    }

    fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Reference(class) => self.classes[class.0].name.clone(),
            Type::Array(elem) => format!("{}[]", self.type_name(elem)),
            Type::Byte => "byte".into(),
            Type::Short => "short".into(),
            Type::Int => "int".into(),
            Type::Char => "char".into(),
            Type::Boolean => "boolean".into(),
            Type::Long => "long".into(),
            Type::Float => "float".into(),
            Type::Double => "double".into(),
            Type::Void => "void".into(),
        }
    }

    fn ir_mut(&mut self, method: MethodId) -> Result<&mut Ir, Error> {
        self.methods
            .get_mut(method.0)
            .ok_or_else(|| anyhow!("unknown method id {method:?}"))?
            .ir
            .as_mut()
            .ok_or_else(|| anyhow!("abstract methods have no body"))
    }

    fn check_class(&self, class: ClassId) -> Result<(), Error> {
        if class.0 >= self.classes.len() {
            return Err(anyhow!("unknown class id {class:?}"));
        }
        Ok(())
    }

    fn check_var(&self, method: MethodId, var: VarId) -> Result<(), Error> {
        if var.0 >= self.vars.len() || self.var_owner[var.0] != method {
            return Err(anyhow!("variable {var:?} does not belong to the method"));
        }
        Ok(())
    }

    fn check_target(&self, target: usize, len: usize) -> Result<(), Error> {
        if target >= len {
            return Err(anyhow!("branch target {target} out of range"));
        }
        Ok(())
    }

    fn check_stmt(&self, method: MethodId, stmt: &Stmt, len: usize) -> Result<(), Error> {
        for var in stmt.uses().into_iter().chain(stmt.def()) {
            self.check_var(method, var)?;
        }
        match stmt {
            Stmt::New { class, .. } => self.check_class(*class)?,
            Stmt::LoadField { base, field, .. } | Stmt::StoreField { base, field, .. } => {
                let field = self
                    .fields
                    .get(field.0)
                    .ok_or_else(|| anyhow!("unknown field id {field:?}"))?;
                if field.is_static != base.is_none() {
                    return Err(anyhow!(
                        "static flag of field {} does not match the access form",
                        field.name
                    ));
                }
            }
            Stmt::Invoke(invoke) => {
                self.check_class(invoke.method_ref.class)?;
                if (invoke.kind == super::CallKind::Static) != invoke.base.is_none() {
                    return Err(anyhow!("call kind does not match the receiver form"));
                }
                if invoke.args.len() != invoke.method_ref.subsignature.param_count() {
                    return Err(anyhow!(
                        "argument count does not match subsignature {}",
                        invoke.method_ref.subsignature
                    ));
                }
            }
            Stmt::If { cond, target } => {
                self.check_target(*target, len)?;
                match cond {
                    Exp::Binary { op, .. } if op.is_comparison() => (),
                    _ => return Err(anyhow!("branch condition must be a comparison")),
                }
            }
            Stmt::Goto { target } => self.check_target(*target, len)?,
            Stmt::Switch { cases, default, .. } => {
                for (_, target) in cases {
                    self.check_target(*target, len)?;
                }
                self.check_target(*default, len)?;
            }
            _ => (),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate_representation::{BinaryOp, CallKind, Invoke, StmtRef};

    #[test]
    fn hierarchy_indexes() {
        let mut builder = ProgramBuilder::new();
        let iface = builder.add_class("A", None, &[], true).unwrap();
        let sub_iface = builder.add_class("B", None, &[iface], true).unwrap();
        let base = builder.add_class("C", None, &[iface], false).unwrap();
        let derived = builder.add_class("D", Some(base), &[], false).unwrap();
        let program = builder.finish().unwrap();

        assert_eq!(program.direct_subinterfaces(iface), &[sub_iface]);
        assert_eq!(program.direct_implementors(iface), &[base]);
        assert_eq!(program.direct_subclasses(base), &[derived]);
        assert!(program.direct_subclasses(derived).is_empty());
    }

    #[test]
    fn body_validation() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();

        // Branch target out of range.
        assert!(builder
            .set_body(method, vec![Stmt::Goto { target: 7 }])
            .is_err());
        // Non-comparison branch condition.
        assert!(builder
            .set_body(
                method,
                vec![
                    Stmt::If {
                        cond: Exp::Binary {
                            op: BinaryOp::Add,
                            lhs: x,
                            rhs: x
                        },
                        target: 0
                    },
                    Stmt::Return { value: None },
                ],
            )
            .is_err());
        // Call-site arity mismatch.
        let callee = builder
            .add_method(class, "f", &[Type::Int], Type::Int, true, false)
            .unwrap();
        let method_ref = builder.method_ref(callee);
        assert!(builder
            .set_body(
                method,
                vec![Stmt::Invoke(Invoke {
                    kind: CallKind::Static,
                    result: None,
                    base: None,
                    method_ref,
                    args: vec![],
                })],
            )
            .is_err());
    }

    #[test]
    fn var_access_indexes() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let field = builder.add_field(class, "f", Type::Int, false).unwrap();
        let method = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let base = builder
            .add_var(method, "o", Type::Reference(class))
            .unwrap();
        let x = builder.add_var(method, "x", Type::Int).unwrap();
        builder
            .set_body(
                method,
                vec![
                    Stmt::New { lhs: base, class },
                    Stmt::StoreField {
                        base: Some(base),
                        field,
                        rhs: x,
                    },
                    Stmt::LoadField {
                        lhs: x,
                        base: Some(base),
                        field,
                    },
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();

        let access = program.var_access(base);
        assert_eq!(access.store_fields, vec![StmtRef { method, index: 1 }]);
        assert_eq!(access.load_fields, vec![StmtRef { method, index: 2 }]);
        assert!(program.var_access(x).store_fields.is_empty());
    }
}

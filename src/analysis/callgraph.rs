//! Call graphs and the class-hierarchy-analysis (CHA) call graph builder.
//!
//! [`dispatch`] implements the virtual-dispatch lookup of the source
//! language: walk the superclass chain from the given class and return the
//! first non-abstract method matching the subsignature.
//! [`build_cha`] over-approximates call targets by dispatching on every
//! subtype of the declared class of a call site.

use std::collections::{BTreeSet, HashSet, VecDeque};

use fnv::FnvHashMap;

use crate::intermediate_representation::{
    CallKind, ClassId, Invoke, MethodId, Program, Stmt, StmtRef, Subsignature, Type,
};
use crate::prelude::*;

/// An edge of a call graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct CallEdge {
    /// The kind of the call site.
    pub kind: CallKind,
    /// The call site.
    pub call_site: StmtRef,
    /// The resolved target method.
    pub callee: MethodId,
}

/// A context-insensitive call graph:
/// the set of reachable methods and the resolved call edges.
#[derive(Debug, Clone)]
pub struct CallGraph {
    entry: MethodId,
    reachable: BTreeSet<MethodId>,
    edges: Vec<CallEdge>,
    edge_set: HashSet<(StmtRef, MethodId)>,
    callees: FnvHashMap<StmtRef, Vec<MethodId>>,
}

impl CallGraph {
    /// Create an empty call graph with the given entry method.
    pub fn new(entry: MethodId) -> CallGraph {
        CallGraph {
            entry,
            reachable: BTreeSet::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
            callees: FnvHashMap::default(),
        }
    }

    /// The entry method of the graph.
    pub fn entry(&self) -> MethodId {
        self.entry
    }

    /// Mark a method as reachable.
    /// Returns whether the method was newly added.
    pub fn add_reachable(&mut self, method: MethodId) -> bool {
        self.reachable.insert(method)
    }

    /// Returns whether the method is reachable.
    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.reachable.contains(&method)
    }

    /// Iterate over the reachable methods.
    pub fn reachable_methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.reachable.iter().copied()
    }

    /// Add a call edge. Returns whether the edge was new.
    pub fn add_edge(&mut self, edge: CallEdge) -> bool {
        if self.edge_set.insert((edge.call_site, edge.callee)) {
            self.callees
                .entry(edge.call_site)
                .or_default()
                .push(edge.callee);
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// All call edges in insertion order.
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    /// The resolved callees of a call site.
    pub fn callees_of(&self, call_site: StmtRef) -> &[MethodId] {
        self.callees
            .get(&call_site)
            .map(|callees| callees.as_slice())
            .unwrap_or(&[])
    }
}

/// Look up the dispatch target for the given class and subsignature:
/// the matching non-abstract method declared in the class itself or,
/// failing that, in its nearest superclass.
/// Returns `None` if the chain contains no concrete match.
pub fn dispatch(program: &Program, class: ClassId, subsig: &Subsignature) -> Option<MethodId> {
    let mut current = Some(class);
    while let Some(class) = current {
        if let Some(method) = program.declared_method(class, subsig) {
            if !program.method(method).is_abstract {
                return Some(method);
            }
        }
        current = program.superclass(class);
    }
    None
}

/// Resolve the single callee of a call site given the dynamic type of the
/// receiver object (ignored for static calls).
/// Used by the pointer analysis, which knows the receiver objects.
pub fn resolve_callee(
    program: &Program,
    recv_type: Option<&Type>,
    invoke: &Invoke,
) -> Option<MethodId> {
    let subsig = &invoke.method_ref.subsignature;
    match invoke.kind {
        CallKind::Static => program.declared_method(invoke.method_ref.class, subsig),
        CallKind::Special => dispatch(program, invoke.method_ref.class, subsig),
        CallKind::Virtual | CallKind::Interface => {
            let class = match recv_type {
                Some(Type::Reference(class)) => *class,
                // Array objects dispatch through the declared class.
                Some(Type::Array(_)) => invoke.method_ref.class,
                _ => return None,
            };
            dispatch(program, class, subsig)
        }
    }
}

/// The reflexive transitive closure of the subtype relation below `class`:
/// the class itself plus all direct and indirect subclasses, subinterfaces
/// and implementors.
fn subtypes(program: &Program, class: ClassId) -> Vec<ClassId> {
    let mut seen = BTreeSet::new();
    let mut worklist = VecDeque::from([class]);
    while let Some(current) = worklist.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        for sub in program
            .direct_subclasses(current)
            .iter()
            .chain(program.direct_subinterfaces(current))
            .chain(program.direct_implementors(current))
        {
            worklist.push_back(*sub);
        }
    }
    seen.into_iter().collect()
}

/// Resolve the possible targets of a call site via class hierarchy analysis.
pub fn resolve_cha(program: &Program, invoke: &Invoke) -> Vec<MethodId> {
    let subsig = &invoke.method_ref.subsignature;
    let class = invoke.method_ref.class;
    match invoke.kind {
        CallKind::Static => program
            .declared_method(class, subsig)
            .into_iter()
            .collect(),
        CallKind::Special => dispatch(program, class, subsig).into_iter().collect(),
        CallKind::Virtual | CallKind::Interface => {
            let mut targets = BTreeSet::new();
            for subtype in subtypes(program, class) {
                if let Some(target) = dispatch(program, subtype, subsig) {
                    targets.insert(target);
                }
            }
            targets.into_iter().collect()
        }
    }
}

/// Build a call graph for the given entry method via class hierarchy
/// analysis, following resolved targets transitively.
pub fn build_cha(program: &Program, entry: MethodId) -> CallGraph {
    let mut call_graph = CallGraph::new(entry);
    let mut worklist = VecDeque::from([entry]);
    while let Some(method) = worklist.pop_front() {
        if !call_graph.add_reachable(method) {
            continue;
        }
        let Some(ir) = program.ir(method) else {
            continue;
        };
        for (index, stmt) in ir.stmts.iter().enumerate() {
            let Some(invoke) = stmt.as_invoke() else {
                continue;
            };
            let call_site = StmtRef { method, index };
            for callee in resolve_cha(program, invoke) {
                call_graph.add_edge(CallEdge {
                    kind: invoke.kind,
                    call_site,
                    callee,
                });
                worklist.push_back(callee);
            }
        }
    }
    call_graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intermediate_representation::{ProgramBuilder, Type};

    /// interface A { void f(); }
    /// class B implements A { void f() {} }
    /// class C implements A { void f() {} }
    /// class Main { static void main() { A a = new B(); a.f(); } }
    fn diamond_program() -> (Program, MethodId, MethodId, MethodId) {
        let mut builder = ProgramBuilder::new();
        let iface = builder.add_class("A", None, &[], true).unwrap();
        let b = builder.add_class("B", None, &[iface], false).unwrap();
        let c = builder.add_class("C", None, &[iface], false).unwrap();
        let main_class = builder.add_class("Main", None, &[], false).unwrap();

        let f_decl = builder
            .add_method(iface, "f", &[], Type::Void, false, true)
            .unwrap();
        let b_f = builder
            .add_method(b, "f", &[], Type::Void, false, false)
            .unwrap();
        let this_b = builder.add_var(b_f, "this", Type::Reference(b)).unwrap();
        builder.set_this(b_f, this_b).unwrap();
        builder
            .set_body(b_f, vec![Stmt::Return { value: None }])
            .unwrap();
        let c_f = builder
            .add_method(c, "f", &[], Type::Void, false, false)
            .unwrap();
        let this_c = builder.add_var(c_f, "this", Type::Reference(c)).unwrap();
        builder.set_this(c_f, this_c).unwrap();
        builder
            .set_body(c_f, vec![Stmt::Return { value: None }])
            .unwrap();

        let main = builder
            .add_method(main_class, "main", &[], Type::Void, true, false)
            .unwrap();
        let a_var = builder
            .add_var(main, "a", Type::Reference(iface))
            .unwrap();
        let f_ref = builder.method_ref(f_decl);
        builder
            .set_body(
                main,
                vec![
                    Stmt::New {
                        lhs: a_var,
                        class: b,
                    },
                    Stmt::Invoke(Invoke {
                        kind: CallKind::Interface,
                        result: None,
                        base: Some(a_var),
                        method_ref: f_ref,
                        args: vec![],
                    }),
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        builder.set_main(main).unwrap();
        let program = builder.finish().unwrap();
        (program, main, b_f, c_f)
    }

    #[test]
    fn cha_over_approximates_interface_calls() {
        let (program, main, b_f, c_f) = diamond_program();
        let call_graph = build_cha(&program, main);

        let call_site = StmtRef {
            method: main,
            index: 1,
        };
        let mut callees = call_graph.callees_of(call_site).to_vec();
        callees.sort();
        assert_eq!(callees, vec![b_f, c_f]);
        assert!(call_graph.is_reachable(b_f));
        assert!(call_graph.is_reachable(c_f));
    }

    #[test]
    fn dispatch_walks_the_superclass_chain() {
        // class Base { void g() {} }  class Sub extends Base {}
        let mut builder = ProgramBuilder::new();
        let base = builder.add_class("Base", None, &[], false).unwrap();
        let sub = builder.add_class("Sub", Some(base), &[], false).unwrap();
        let g = builder
            .add_method(base, "g", &[], Type::Void, false, false)
            .unwrap();
        let this_var = builder.add_var(g, "this", Type::Reference(base)).unwrap();
        builder.set_this(g, this_var).unwrap();
        builder
            .set_body(g, vec![Stmt::Return { value: None }])
            .unwrap();
        let program = builder.finish().unwrap();

        let subsig = program.method(g).subsignature.clone();
        assert_eq!(dispatch(&program, sub, &subsig), Some(g));
        assert_eq!(dispatch(&program, base, &subsig), Some(g));
    }

    #[test]
    fn static_calls_resolve_to_a_single_target() {
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let helper = builder
            .add_method(class, "helper", &[], Type::Void, true, false)
            .unwrap();
        builder
            .set_body(helper, vec![Stmt::Return { value: None }])
            .unwrap();
        let main = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let helper_ref = builder.method_ref(helper);
        builder
            .set_body(
                main,
                vec![
                    Stmt::Invoke(Invoke {
                        kind: CallKind::Static,
                        result: None,
                        base: None,
                        method_ref: helper_ref,
                        args: vec![],
                    }),
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        let program = builder.finish().unwrap();
        let call_graph = build_cha(&program, main);
        assert_eq!(
            call_graph.callees_of(StmtRef {
                method: main,
                index: 0
            }),
            &[helper]
        );
    }
}

//! Interprocedural constant propagation for integer-holding variables.
//!
//! Lifts the intraprocedural analysis onto the interprocedural control flow
//! graph and adds field and array awareness on top of a pointer analysis
//! result:
//! * Loads from instance fields meet the stored values of all stores whose
//!   base may alias the load's base; static fields range over all stores of
//!   the same field; array loads additionally filter stores by index
//!   compatibility.
//! * Stores do not change the fact but re-enqueue the affected loads,
//!   substituting for the field edges the graph does not have.
//! * Call, return and call-to-return edges move argument, return and
//!   call-result values between methods.
//!
//! The alias map is built once from the pointer analysis result:
//! two variables alias iff their points-to sets intersect (reflexively).

use std::collections::VecDeque;

use fnv::FnvHashMap;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::constant_propagation::{meet_value, ConstantPropagation, CpFact, Value};
use super::dataflow::DataflowAnalysis;
use super::graph::{Icfg, IcfgEdge, IcfgNode};
use super::pointer::PointerAnalysisResult;
use crate::intermediate_representation::{FieldId, Program, Stmt, StmtRef, VarId};

/// The interprocedural constant propagation engine and its result.
pub struct InterConstantPropagation<'a> {
    program: &'a Program,
    icfg: &'a Icfg,
    cp: ConstantPropagation<'a>,
    alias: FnvHashMap<VarId, Vec<VarId>>,
    static_loads: FnvHashMap<FieldId, Vec<StmtRef>>,
    static_stores: FnvHashMap<FieldId, Vec<StmtRef>>,
    in_facts: Vec<CpFact>,
    out_facts: Vec<CpFact>,
    work_list: VecDeque<NodeIndex>,
    on_list: Vec<bool>,
}

impl<'a> InterConstantPropagation<'a> {
    /// Run the analysis to its fixed point.
    ///
    /// `icfg` must cover the program part reachable from the entry that the
    /// pointer analysis was run for.
    pub fn run(
        program: &'a Program,
        icfg: &'a Icfg,
        pta: &PointerAnalysisResult,
    ) -> InterConstantPropagation<'a> {
        let node_count = icfg.graph().node_count();
        let mut analysis = InterConstantPropagation {
            program,
            icfg,
            cp: ConstantPropagation::new(program),
            alias: build_alias_map(pta),
            static_loads: FnvHashMap::default(),
            static_stores: FnvHashMap::default(),
            in_facts: vec![CpFact::new(); node_count],
            out_facts: vec![CpFact::new(); node_count],
            work_list: VecDeque::new(),
            on_list: vec![false; node_count],
        };
        analysis.index_static_accesses();
        analysis.solve();
        analysis
    }

    /// The fact holding before execution of the statement.
    pub fn in_fact(&self, stmt: StmtRef) -> &CpFact {
        &self.in_facts[self.icfg.stmt_node(stmt).index()]
    }

    /// The fact holding after execution of the statement.
    pub fn out_fact(&self, stmt: StmtRef) -> &CpFact {
        &self.out_facts[self.icfg.stmt_node(stmt).index()]
    }

    /// Index all static field loads and stores of the graph.
    fn index_static_accesses(&mut self) {
        for node in self.icfg.graph().node_indices() {
            let IcfgNode::Stmt(stmt_ref) = self.icfg.graph()[node] else {
                continue;
            };
            match self.program.stmt(stmt_ref) {
                Stmt::LoadField {
                    base: None, field, ..
                } => self.static_loads.entry(*field).or_default().push(stmt_ref),
                Stmt::StoreField {
                    base: None, field, ..
                } => self.static_stores.entry(*field).or_default().push(stmt_ref),
                _ => (),
            }
        }
    }

    fn solve(&mut self) {
        // The boundary fact of the entry method; all other methods receive
        // their facts over call edges.
        let entry = self.icfg.entry_node();
        let mut boundary = CpFact::new();
        if let IcfgNode::Entry(method) = self.icfg.graph()[entry] {
            if let Some(ir) = self.program.ir(method) {
                for param in &ir.params {
                    if self.program.can_hold_int(*param) {
                        boundary.update(*param, Value::Nac);
                    }
                }
            }
        }
        self.in_facts[entry.index()] = boundary.clone();
        self.out_facts[entry.index()] = boundary;

        for node in self.icfg.graph().node_indices() {
            self.enqueue(node);
        }
        while let Some(node) = self.work_list.pop_front() {
            self.on_list[node.index()] = false;
            let mut in_fact = std::mem::take(&mut self.in_facts[node.index()]);
            for edge in self.icfg.graph().edges_directed(node, Direction::Incoming) {
                let transferred =
                    self.transfer_edge(edge.weight(), edge.source(), &self.out_facts[edge.source().index()]);
                self.cp.meet_into(&transferred, &mut in_fact);
            }
            self.in_facts[node.index()] = in_fact;
            let changed = self.transfer_node(node);
            if changed {
                let succs: Vec<NodeIndex> = self
                    .icfg
                    .graph()
                    .neighbors_directed(node, Direction::Outgoing)
                    .collect();
                for succ in succs {
                    self.enqueue(succ);
                }
            }
        }
    }

    fn enqueue(&mut self, node: NodeIndex) {
        if !self.on_list[node.index()] {
            self.on_list[node.index()] = true;
            self.work_list.push_back(node);
        }
    }

    fn enqueue_stmt(&mut self, stmt: StmtRef) {
        if let Some(node) = self.icfg.node(IcfgNode::Stmt(stmt)) {
            self.enqueue(node);
        }
    }

    /// The transfer function of an interprocedural edge.
    fn transfer_edge(&self, edge: &IcfgEdge, source: NodeIndex, out: &CpFact) -> CpFact {
        match edge {
            IcfgEdge::Normal => out.clone(),
            IcfgEdge::CallToReturn => {
                // The call result arrives over the return edge;
                // whatever the variable held before the call is gone.
                let mut fact = out.clone();
                if let IcfgNode::Stmt(call_site) = self.icfg.graph()[source] {
                    if let Some(invoke) = self.program.stmt(call_site).as_invoke() {
                        if let Some(result) = invoke.result {
                            fact.remove(result);
                        }
                    }
                }
                fact
            }
            IcfgEdge::Call { callee } => {
                let mut fact = CpFact::new();
                let IcfgNode::Stmt(call_site) = self.icfg.graph()[source] else {
                    return fact;
                };
                let invoke = self.program.stmt(call_site).as_invoke().expect("call edge");
                if let Some(ir) = self.program.ir(*callee) {
                    for (arg, param) in invoke.args.iter().zip(ir.params.iter()) {
                        if self.program.can_hold_int(*param) {
                            fact.update(*param, out.get(*arg));
                        }
                    }
                }
                fact
            }
            IcfgEdge::Return { callee, call_site } => {
                let mut fact = CpFact::new();
                let invoke = self.program.stmt(*call_site).as_invoke().expect("return edge");
                let Some(result) = invoke.result else {
                    return fact;
                };
                if !self.program.can_hold_int(result) {
                    return fact;
                }
                let mut value = Value::Undef;
                if let Some(ir) = self.program.ir(*callee) {
                    for ret in &ir.return_vars {
                        value = meet_value(value, out.get(*ret));
                    }
                }
                fact.update(result, value);
                fact
            }
        }
    }

    /// The transfer function of a node. Returns whether the out-fact changed.
    fn transfer_node(&mut self, node: NodeIndex) -> bool {
        let stmt_ref = match self.icfg.graph()[node] {
            IcfgNode::Stmt(stmt_ref) => stmt_ref,
            // Entry and exit nodes pass their fact through unchanged.
            _ => {
                let in_fact = self.in_facts[node.index()].clone();
                return self.out_facts[node.index()].copy_from(&in_fact);
            }
        };
        let in_fact = self.in_facts[node.index()].clone();
        match self.program.stmt(stmt_ref).clone() {
            // Call statements pass the fact through;
            // the result variable is handled by the edge transfers.
            Stmt::Invoke(_) => {
                let changed = self.out_facts[node.index()] != in_fact;
                if changed {
                    self.out_facts[node.index()].copy_from(&in_fact);
                }
                changed
            }
            Stmt::LoadField { lhs, base, field } => {
                if !self.program.can_hold_int(lhs) {
                    return self.out_facts[node.index()].copy_from(&in_fact);
                }
                let value = match base {
                    None => self.meet_static_stores(field),
                    Some(base) => self.meet_instance_stores(base, field),
                };
                let mut fact = in_fact;
                fact.remove(lhs);
                fact.update(lhs, value);
                self.out_facts[node.index()].copy_from(&fact)
            }
            Stmt::StoreField { base, field, rhs } => {
                if self.program.can_hold_int(rhs) {
                    match base {
                        None => {
                            let loads = self.static_loads.get(&field).cloned().unwrap_or_default();
                            for load in loads {
                                self.enqueue_stmt(load);
                            }
                        }
                        Some(base) => self.enqueue_aliased_field_loads(base, field),
                    }
                }
                self.out_facts[node.index()].copy_from(&in_fact)
            }
            Stmt::LoadArray { lhs, base, index } => {
                if !self.program.can_hold_int(lhs) {
                    return self.out_facts[node.index()].copy_from(&in_fact);
                }
                let value = self.meet_array_stores(&in_fact, base, index);
                let mut fact = in_fact;
                fact.remove(lhs);
                fact.update(lhs, value);
                self.out_facts[node.index()].copy_from(&fact)
            }
            Stmt::StoreArray { base, rhs, .. } => {
                if self.program.can_hold_int(rhs) {
                    self.enqueue_aliased_array_loads(base);
                }
                self.out_facts[node.index()].copy_from(&in_fact)
            }
            stmt => {
                let mut out_fact = std::mem::take(&mut self.out_facts[node.index()]);
                let changed = self.cp.transfer_stmt(&stmt, &in_fact, &mut out_fact);
                self.out_facts[node.index()] = out_fact;
                changed
            }
        }
    }

    /// Meet the stored values of all static stores of the field.
    fn meet_static_stores(&self, field: FieldId) -> Value {
        let mut value = Value::Undef;
        if let Some(stores) = self.static_stores.get(&field) {
            for &store in stores {
                let Stmt::StoreField { rhs, .. } = self.program.stmt(store) else {
                    continue;
                };
                let Some(store_fact) = self.stored_in_fact(store) else {
                    continue;
                };
                value = meet_value(value, store_fact.get(*rhs));
            }
        }
        value
    }

    /// Meet the stored values of all instance stores of the field
    /// whose base may alias `base`.
    fn meet_instance_stores(&self, base: VarId, field: FieldId) -> Value {
        let mut value = Value::Undef;
        for alias in self.aliases_of(base) {
            for &store in &self.program.var_access(*alias).store_fields {
                let Stmt::StoreField {
                    field: store_field,
                    rhs,
                    ..
                } = self.program.stmt(store)
                else {
                    continue;
                };
                if *store_field != field {
                    continue;
                }
                let Some(store_fact) = self.stored_in_fact(store) else {
                    continue;
                };
                value = meet_value(value, store_fact.get(*rhs));
            }
        }
        value
    }

    /// Meet the stored values of all array stores whose base may alias
    /// `base` and whose index is compatible with the load's index.
    fn meet_array_stores(&self, load_in: &CpFact, base: VarId, index: VarId) -> Value {
        let mut value = Value::Undef;
        let load_index = load_in.get(index);
        for alias in self.aliases_of(base) {
            for &store in &self.program.var_access(*alias).store_arrays {
                let Stmt::StoreArray {
                    index: store_index,
                    rhs,
                    ..
                } = self.program.stmt(store)
                else {
                    continue;
                };
                let Some(store_fact) = self.stored_in_fact(store) else {
                    continue;
                };
                if compat_index(load_index, store_fact.get(*store_index)) {
                    value = meet_value(value, store_fact.get(*rhs));
                }
            }
        }
        value
    }

    fn enqueue_aliased_field_loads(&mut self, base: VarId, field: FieldId) {
        let mut loads = Vec::new();
        for alias in self.aliases_of(base) {
            for &load in &self.program.var_access(*alias).load_fields {
                if let Stmt::LoadField {
                    field: load_field, ..
                } = self.program.stmt(load)
                {
                    if *load_field == field {
                        loads.push(load);
                    }
                }
            }
        }
        for load in loads {
            self.enqueue_stmt(load);
        }
    }

    fn enqueue_aliased_array_loads(&mut self, base: VarId) {
        let mut loads = Vec::new();
        for alias in self.aliases_of(base) {
            loads.extend(self.program.var_access(*alias).load_arrays.iter().copied());
        }
        for load in loads {
            self.enqueue_stmt(load);
        }
    }

    /// The alias set of a variable, including the variable itself.
    fn aliases_of(&self, var: VarId) -> impl Iterator<Item = &VarId> {
        self.alias
            .get(&var)
            .map(|aliases| aliases.as_slice())
            .unwrap_or(&[])
            .iter()
    }

    /// The current in-fact of a store statement,
    /// or `None` if the statement is not part of the graph.
    fn stored_in_fact(&self, store: StmtRef) -> Option<&CpFact> {
        self.icfg
            .node(IcfgNode::Stmt(store))
            .map(|node| &self.in_facts[node.index()])
    }
}

/// Two array index values are compatible iff neither is `Undef` and they
/// are not two distinct constants.
fn compat_index(a: Value, b: Value) -> bool {
    if a.is_undef() || b.is_undef() {
        return false;
    }
    match (a.const_value(), b.const_value()) {
        (Some(c1), Some(c2)) => c1 == c2,
        _ => true,
    }
}

/// Build the reflexive alias map from the pointer analysis result:
/// `alias(v)` contains every variable whose points-to set intersects
/// the one of `v`. Computed through an object-to-variables index,
/// which yields exactly the pairwise-intersection sets.
fn build_alias_map(pta: &PointerAnalysisResult) -> FnvHashMap<VarId, Vec<VarId>> {
    let mut vars_by_obj: FnvHashMap<super::pointer::heap::ObjId, Vec<VarId>> =
        FnvHashMap::default();
    let vars = pta.vars();
    for &var in &vars {
        for obj in pta.points_to(var) {
            vars_by_obj.entry(obj).or_default().push(var);
        }
    }
    let mut alias: FnvHashMap<VarId, Vec<VarId>> = FnvHashMap::default();
    for &var in &vars {
        let mut set = std::collections::BTreeSet::new();
        set.insert(var);
        for obj in pta.points_to(var) {
            set.extend(vars_by_obj[&obj].iter().copied());
        }
        alias.insert(var, set.into_iter().collect());
    }
    alias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::callgraph::build_cha;
    use crate::analysis::pointer::context::ContextInsensitive;
    use crate::analysis::pointer::taint::TaintConfig;
    use crate::intermediate_representation::*;

    fn analyze(program: &Program, main: MethodId) -> (Icfg, PointerAnalysisResult) {
        let call_graph = build_cha(program, main);
        let icfg = Icfg::new(program, &call_graph);
        let pta = crate::analysis::pointer::run(
            program,
            main,
            &ContextInsensitive,
            TaintConfig::empty(),
        );
        (icfg, pta)
    }

    #[test]
    fn constants_flow_through_calls() {
        // static int f(int x) { return x; }
        // main: five = 5; r = f(five)
        let mut builder = ProgramBuilder::new();
        let class = builder.add_class("Main", None, &[], false).unwrap();
        let f = builder
            .add_method(class, "f", &[Type::Int], Type::Int, true, false)
            .unwrap();
        let x = builder.add_var(f, "x", Type::Int).unwrap();
        builder.set_params(f, &[x]).unwrap();
        builder
            .set_body(f, vec![Stmt::Return { value: Some(x) }])
            .unwrap();

        let main = builder
            .add_method(class, "main", &[], Type::Void, true, false)
            .unwrap();
        let five = builder.add_var(main, "five", Type::Int).unwrap();
        let r = builder.add_var(main, "r", Type::Int).unwrap();
        let f_ref = builder.method_ref(f);
        builder
            .set_body(
                main,
                vec![
                    Stmt::Assign {
                        lhs: five,
                        rhs: Exp::IntLiteral(5),
                    },
                    Stmt::Invoke(Invoke {
                        kind: CallKind::Static,
                        result: Some(r),
                        base: None,
                        method_ref: f_ref,
                        args: vec![five],
                    }),
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        builder.set_main(main).unwrap();
        let program = builder.finish().unwrap();

        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        let after_call = inter.in_fact(StmtRef {
            method: main,
            index: 2,
        });
        assert_eq!(after_call.get(r), Value::Const(5));
        // Inside the callee the parameter is the argument's constant.
        assert_eq!(
            inter
                .in_fact(StmtRef {
                    method: f,
                    index: 0
                })
                .get(x),
            Value::Const(5)
        );
    }

    /// class A { int f; } with an aliased base variable and `extra_store`
    /// controlling whether a conflicting store through the alias exists.
    fn field_program(extra_store: bool) -> (Program, MethodId, VarId) {
        let mut builder = ProgramBuilder::new();
        let a_class = builder.add_class("A", None, &[], false).unwrap();
        let field = builder.add_field(a_class, "f", Type::Int, false).unwrap();
        let main_class = builder.add_class("Main", None, &[], false).unwrap();
        let main = builder
            .add_method(main_class, "main", &[], Type::Void, true, false)
            .unwrap();
        let o = builder.add_var(main, "o", Type::Reference(a_class)).unwrap();
        let p = builder.add_var(main, "p", Type::Reference(a_class)).unwrap();
        let seven = builder.add_var(main, "seven", Type::Int).unwrap();
        let nine = builder.add_var(main, "nine", Type::Int).unwrap();
        let y = builder.add_var(main, "y", Type::Int).unwrap();
        let mut stmts = vec![
            // 0: o = new A
            Stmt::New {
                lhs: o,
                class: a_class,
            },
            // 1: p = o
            Stmt::Assign {
                lhs: p,
                rhs: Exp::Var(o),
            },
            // 2: seven = 7
            Stmt::Assign {
                lhs: seven,
                rhs: Exp::IntLiteral(7),
            },
            // 3: o.f = seven
            Stmt::StoreField {
                base: Some(o),
                field,
                rhs: seven,
            },
        ];
        if extra_store {
            // 4: nine = 9; 5: p.f = nine
            stmts.push(Stmt::Assign {
                lhs: nine,
                rhs: Exp::IntLiteral(9),
            });
            stmts.push(Stmt::StoreField {
                base: Some(p),
                field,
                rhs: nine,
            });
        }
        // y = o.f; return
        stmts.push(Stmt::LoadField {
            lhs: y,
            base: Some(o),
            field,
        });
        stmts.push(Stmt::Return { value: None });
        builder.set_body(main, stmts).unwrap();
        builder.set_main(main).unwrap();
        (builder.finish().unwrap(), main, y)
    }

    #[test]
    fn instance_field_load_sees_the_stored_constant() {
        let (program, main, y) = field_program(false);
        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        let exit_in = inter.in_fact(StmtRef {
            method: main,
            index: 5,
        });
        assert_eq!(exit_in.get(y), Value::Const(7));
    }

    #[test]
    fn conflicting_stores_through_aliases_meet_to_nac() {
        let (program, main, y) = field_program(true);
        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        let exit_in = inter.in_fact(StmtRef {
            method: main,
            index: 7,
        });
        assert_eq!(exit_in.get(y), Value::Nac);
    }

    #[test]
    fn static_field_loads_meet_all_static_stores() {
        // class T { static int s; }  main: x = 3; T.s = x; y = T.s
        let mut builder = ProgramBuilder::new();
        let t_class = builder.add_class("T", None, &[], false).unwrap();
        let s = builder.add_field(t_class, "s", Type::Int, true).unwrap();
        let main_class = builder.add_class("Main", None, &[], false).unwrap();
        let main = builder
            .add_method(main_class, "main", &[], Type::Void, true, false)
            .unwrap();
        let x = builder.add_var(main, "x", Type::Int).unwrap();
        let y = builder.add_var(main, "y", Type::Int).unwrap();
        builder
            .set_body(
                main,
                vec![
                    Stmt::Assign {
                        lhs: x,
                        rhs: Exp::IntLiteral(3),
                    },
                    Stmt::StoreField {
                        base: None,
                        field: s,
                        rhs: x,
                    },
                    Stmt::LoadField {
                        lhs: y,
                        base: None,
                        field: s,
                    },
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        builder.set_main(main).unwrap();
        let program = builder.finish().unwrap();

        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        assert_eq!(
            inter
                .in_fact(StmtRef {
                    method: main,
                    index: 3
                })
                .get(y),
            Value::Const(3)
        );
    }

    fn array_program(store_index_value: i32) -> (Program, MethodId, VarId) {
        // arr = new int[]; idx = <store_index_value>; zero = 0; five = 5;
        // arr[idx] = five; y = arr[zero]
        let mut builder = ProgramBuilder::new();
        let main_class = builder.add_class("Main", None, &[], false).unwrap();
        let main = builder
            .add_method(main_class, "main", &[], Type::Void, true, false)
            .unwrap();
        let arr = builder
            .add_var(main, "arr", Type::Array(Box::new(Type::Int)))
            .unwrap();
        let idx = builder.add_var(main, "idx", Type::Int).unwrap();
        let zero = builder.add_var(main, "zero", Type::Int).unwrap();
        let five = builder.add_var(main, "five", Type::Int).unwrap();
        let y = builder.add_var(main, "y", Type::Int).unwrap();
        builder
            .set_body(
                main,
                vec![
                    Stmt::NewArray {
                        lhs: arr,
                        elem: Type::Int,
                    },
                    Stmt::Assign {
                        lhs: idx,
                        rhs: Exp::IntLiteral(store_index_value),
                    },
                    Stmt::Assign {
                        lhs: zero,
                        rhs: Exp::IntLiteral(0),
                    },
                    Stmt::Assign {
                        lhs: five,
                        rhs: Exp::IntLiteral(5),
                    },
                    Stmt::StoreArray {
                        base: arr,
                        index: idx,
                        rhs: five,
                    },
                    Stmt::LoadArray {
                        lhs: y,
                        base: arr,
                        index: zero,
                    },
                    Stmt::Return { value: None },
                ],
            )
            .unwrap();
        builder.set_main(main).unwrap();
        (builder.finish().unwrap(), main, y)
    }

    #[test]
    fn array_load_matches_equal_constant_index() {
        let (program, main, y) = array_program(0);
        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        assert_eq!(
            inter
                .in_fact(StmtRef {
                    method: main,
                    index: 6
                })
                .get(y),
            Value::Const(5)
        );
    }

    #[test]
    fn array_load_ignores_distinct_constant_index() {
        let (program, main, y) = array_program(1);
        let (icfg, pta) = analyze(&program, main);
        let inter = InterConstantPropagation::run(&program, &icfg, &pta);
        assert_eq!(
            inter
                .in_fact(StmtRef {
                    method: main,
                    index: 6
                })
                .get(y),
            Value::Undef
        );
    }

    #[test]
    fn compat_index_table() {
        assert!(!compat_index(Value::Undef, Value::Const(0)));
        assert!(!compat_index(Value::Const(0), Value::Undef));
        assert!(compat_index(Value::Const(0), Value::Const(0)));
        assert!(!compat_index(Value::Const(0), Value::Const(1)));
        assert!(compat_index(Value::Nac, Value::Const(1)));
        assert!(compat_index(Value::Nac, Value::Nac));
    }
}

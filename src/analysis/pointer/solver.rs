//! The context-sensitive pointer analysis solver.
//!
//! A fixed-point work-list algorithm over (pointer, points-to set) entries
//! with on-the-fly call graph construction:
//! * When a context-sensitive method becomes reachable, its statements
//!   contribute pointer-flow-graph edges (copies, static field accesses)
//!   and work-list entries (allocations, static calls).
//! * Instance field and array accesses are materialized lazily when the
//!   points-to set of their base variable grows; the same growth step
//!   resolves and links virtual call targets.
//! * The taint overlay (see [`taint`](super::taint)) synthesizes taint
//!   objects at source call sites, installs taint-transfer edges at
//!   transfer call sites and collects flows into sinks after the fixed
//!   point is reached.
//!
//! All involved structures (points-to sets, edge sets, call edges,
//! interned pointers) grow monotonically and are drawn from finite sets,
//! so the work-list empties after finitely many steps.

use std::collections::{BTreeSet, VecDeque};

use super::context::ContextSelector;
use super::elements::{CsCallEdge, CsCallGraph, CsManager, CsMethodId, CsObjId, CtxId, Pointer, PointerId};
use super::heap::HeapModel;
use super::pfg::PointerFlowGraph;
use super::pts::PointsToSet;
use super::taint::{TaintConfig, TaintFlow, BASE, RESULT};
use super::PointerAnalysisResult;
use crate::analysis::callgraph::resolve_callee;
use crate::intermediate_representation::{
    CallKind, Exp, Invoke, MethodId, Program, Stmt, StmtRef, Type, VarId,
};

/// Run the pointer analysis for the given entry method.
///
/// `selector` decides the context abstraction,
/// `taint_config` drives the taint overlay
/// (pass [`TaintConfig::empty`] to run without one).
pub fn run(
    program: &Program,
    entry: MethodId,
    selector: &dyn ContextSelector,
    taint_config: TaintConfig,
) -> PointerAnalysisResult {
    let mut solver = Solver {
        program,
        selector,
        taint_config,
        heap: HeapModel::new(),
        csm: CsManager::new(),
        call_graph: CsCallGraph::new(),
        pfg: PointerFlowGraph::new(),
        work_list: VecDeque::new(),
    };
    solver.initialize(entry);
    solver.analyze();
    let taint_flows = solver.collect_taint_flows();
    PointerAnalysisResult::new(solver.csm, solver.call_graph, solver.heap, taint_flows)
}

struct Solver<'a> {
    program: &'a Program,
    selector: &'a dyn ContextSelector,
    taint_config: TaintConfig,
    heap: HeapModel,
    csm: CsManager,
    call_graph: CsCallGraph,
    pfg: PointerFlowGraph,
    work_list: VecDeque<(PointerId, PointsToSet)>,
}

impl<'a> Solver<'a> {
    fn initialize(&mut self, entry: MethodId) {
        let ctx = self.csm.context_id(&self.selector.empty_context());
        let cs_entry = self.csm.cs_method(ctx, entry);
        self.call_graph.set_entry(cs_entry);
        self.add_reachable(cs_entry);
    }

    /// Process the statements of a newly reachable context-sensitive method.
    fn add_reachable(&mut self, cs_method: CsMethodId) {
        if !self.call_graph.add_reachable(cs_method) {
            return;
        }
        let (ctx, method) = self.csm.cs_method_parts(cs_method);
        let program = self.program;
        let Some(ir) = program.ir(method) else {
            return;
        };
        for (index, stmt) in ir.stmts.iter().enumerate() {
            let site = StmtRef { method, index };
            match stmt {
                Stmt::New { lhs, class } => {
                    self.process_new(ctx, site, *lhs, Type::Reference(*class));
                }
                Stmt::NewArray { lhs, elem } => {
                    self.process_new(ctx, site, *lhs, Type::Array(Box::new(elem.clone())));
                }
                Stmt::Assign {
                    lhs,
                    rhs: Exp::Var(rhs),
                } => {
                    let source = self.csm.cs_var(ctx, *rhs);
                    let target = self.csm.cs_var(ctx, *lhs);
                    self.add_pfg_edge(source, target);
                }
                // A cast propagates its operand like a copy.
                Stmt::Cast { lhs, rhs, .. } => {
                    let source = self.csm.cs_var(ctx, *rhs);
                    let target = self.csm.cs_var(ctx, *lhs);
                    self.add_pfg_edge(source, target);
                }
                Stmt::LoadField {
                    lhs,
                    base: None,
                    field,
                } => {
                    let source = self.csm.static_field(*field);
                    let target = self.csm.cs_var(ctx, *lhs);
                    self.add_pfg_edge(source, target);
                }
                Stmt::StoreField {
                    base: None,
                    field,
                    rhs,
                } => {
                    let source = self.csm.cs_var(ctx, *rhs);
                    let target = self.csm.static_field(*field);
                    self.add_pfg_edge(source, target);
                }
                Stmt::Invoke(invoke) if invoke.kind == CallKind::Static => {
                    self.process_static_call(ctx, site, invoke);
                }
                _ => (),
            }
        }
    }

    /// Select the heap context of an allocation site and seed the points-to
    /// set of the target variable.
    fn process_new(&mut self, ctx: CtxId, site: StmtRef, lhs: VarId, ty: Type) {
        let obj = self.heap.obj_at(site, ty);
        let method_ctx = self.csm.context(ctx).clone();
        let heap_ctx = self.selector.select_heap_context(&method_ctx, obj);
        let heap_ctx = self.csm.context_id(&heap_ctx);
        let cs_obj = self.csm.cs_obj(heap_ctx, obj);
        let pointer = self.csm.cs_var(ctx, lhs);
        self.work_list.push_back((pointer, PointsToSet::singleton(cs_obj)));
    }

    fn process_static_call(&mut self, ctx: CtxId, site: StmtRef, invoke: &Invoke) {
        let Some(callee) = resolve_callee(self.program, None, invoke) else {
            return;
        };
        self.handle_taint_source(ctx, site, invoke, callee);
        self.handle_taint_transfers(ctx, invoke, callee, None);
        let caller_ctx = self.csm.context(ctx).clone();
        let callee_ctx = self.selector.select_static_context(&caller_ctx, site, callee);
        let callee_ctx = self.csm.context_id(&callee_ctx);
        let cs_callee = self.csm.cs_method(callee_ctx, callee);
        self.handle_call(invoke.kind, ctx, site, invoke, cs_callee);
    }

    /// The main work-list loop.
    fn analyze(&mut self) {
        let program = self.program;
        while let Some((pointer, pts)) = self.work_list.pop_front() {
            let delta = self.propagate(pointer, &pts);
            if delta.is_empty() {
                continue;
            }
            let (taint_objs, heap_objs) = self.partition_taint(&delta);
            self.propagate_taint_transfer(pointer, &taint_objs);

            let Pointer::CsVar { ctx, var } = *self.csm.pointer(pointer) else {
                continue;
            };
            let access = program.var_access(var);
            // Taint objects are purely symbolic; only real heap objects
            // materialize field, array and dispatch edges.
            for cs_obj in heap_objs.iter() {
                for &store in &access.store_fields {
                    let Stmt::StoreField { field, rhs, .. } = program.stmt(store) else {
                        unreachable!()
                    };
                    let source = self.csm.cs_var(ctx, *rhs);
                    let target = self.csm.instance_field(cs_obj, *field);
                    self.add_pfg_edge(source, target);
                }
                for &load in &access.load_fields {
                    let Stmt::LoadField { lhs, field, .. } = program.stmt(load) else {
                        unreachable!()
                    };
                    let source = self.csm.instance_field(cs_obj, *field);
                    let target = self.csm.cs_var(ctx, *lhs);
                    self.add_pfg_edge(source, target);
                }
                for &store in &access.store_arrays {
                    let Stmt::StoreArray { rhs, .. } = program.stmt(store) else {
                        unreachable!()
                    };
                    let source = self.csm.cs_var(ctx, *rhs);
                    let target = self.csm.array_index(cs_obj);
                    self.add_pfg_edge(source, target);
                }
                for &load in &access.load_arrays {
                    let Stmt::LoadArray { lhs, .. } = program.stmt(load) else {
                        unreachable!()
                    };
                    let source = self.csm.array_index(cs_obj);
                    let target = self.csm.cs_var(ctx, *lhs);
                    self.add_pfg_edge(source, target);
                }
                self.process_instance_calls(ctx, var, cs_obj, &access.invokes);
            }
        }
    }

    /// Add `pts \ pt(pointer)` to the pointer and forward the difference
    /// along all object edges. Returns the difference.
    fn propagate(&mut self, pointer: PointerId, pts: &PointsToSet) -> PointsToSet {
        let delta = pts.difference(self.csm.pts(pointer));
        if !delta.is_empty() {
            let target = self.csm.pts_mut(pointer);
            for obj in delta.iter() {
                target.add(obj);
            }
            let succs: Vec<PointerId> = self.pfg.succs_of(pointer).collect();
            for succ in succs {
                self.work_list.push_back((succ, delta.clone()));
            }
        }
        delta
    }

    /// Forward newly discovered taint objects along taint-transfer edges.
    /// Object edges have already conveyed them in [`Solver::propagate`].
    fn propagate_taint_transfer(&mut self, pointer: PointerId, taint_objs: &PointsToSet) {
        if taint_objs.is_empty() {
            return;
        }
        let succs: Vec<PointerId> = self.pfg.taint_succs_of(pointer).collect();
        for succ in succs {
            self.work_list.push_back((succ, taint_objs.clone()));
        }
    }

    /// Split a points-to set into its taint and heap objects.
    fn partition_taint(&self, pts: &PointsToSet) -> (PointsToSet, PointsToSet) {
        let mut taint_objs = PointsToSet::new();
        let mut heap_objs = PointsToSet::new();
        for cs_obj in pts.iter() {
            let (_, obj) = self.csm.cs_obj_parts(cs_obj);
            if self.heap.is_taint(obj) {
                taint_objs.add(cs_obj);
            } else {
                heap_objs.add(cs_obj);
            }
        }
        (taint_objs, heap_objs)
    }

    /// If a new edge was added and the source already points to something,
    /// forward the source's current points-to set.
    fn add_pfg_edge(&mut self, source: PointerId, target: PointerId) {
        if self.pfg.add_edge(source, target) && !self.csm.pts(source).is_empty() {
            let pts = self.csm.pts(source).clone();
            self.work_list.push_back((target, pts));
        }
    }

    /// Like [`Solver::add_pfg_edge`], but taint edges only ever convey the
    /// taint subset of the source's points-to set.
    fn add_taint_edge(&mut self, source: PointerId, target: PointerId) {
        if self.pfg.add_taint_edge(source, target) {
            let (taint_objs, _) = self.partition_taint(&self.csm.pts(source).clone());
            if !taint_objs.is_empty() {
                self.work_list.push_back((target, taint_objs));
            }
        }
    }

    /// Resolve and link the instance calls on `recv_var` for a newly
    /// discovered receiver object.
    fn process_instance_calls(
        &mut self,
        ctx: CtxId,
        recv_var: VarId,
        recv_obj: CsObjId,
        invokes: &[StmtRef],
    ) {
        let program = self.program;
        for &site in invokes {
            let invoke = program.stmt(site).as_invoke().expect("invoke index");
            let (recv_ctx_id, obj) = self.csm.cs_obj_parts(recv_obj);
            let recv_ty = self.heap.obj(obj).ty().clone();
            let Some(callee) = resolve_callee(program, Some(&recv_ty), invoke) else {
                continue;
            };
            if program.method(callee).is_static {
                continue;
            }
            self.handle_taint_source(ctx, site, invoke, callee);

            let caller_ctx = self.csm.context(ctx).clone();
            let recv_ctx = self.csm.context(recv_ctx_id).clone();
            let callee_ctx =
                self.selector
                    .select_virtual_context(&caller_ctx, site, &recv_ctx, obj, callee);
            let callee_ctx = self.csm.context_id(&callee_ctx);
            // Seed the `this` pointer of the callee with the receiver.
            if let Some(this_var) = program.ir(callee).and_then(|ir| ir.this_var) {
                let this_pointer = self.csm.cs_var(callee_ctx, this_var);
                self.work_list
                    .push_back((this_pointer, PointsToSet::singleton(recv_obj)));
            }
            let base_pointer = self.csm.cs_var(ctx, recv_var);
            self.handle_taint_transfers(ctx, invoke, callee, Some(base_pointer));
            let cs_callee = self.csm.cs_method(callee_ctx, callee);
            self.handle_call(invoke.kind, ctx, site, invoke, cs_callee);
        }
    }

    /// Add a call edge; on the first encounter make the callee reachable and
    /// wire arguments to parameters and return variables to the result.
    fn handle_call(
        &mut self,
        kind: CallKind,
        caller_ctx: CtxId,
        call_site: StmtRef,
        invoke: &Invoke,
        cs_callee: CsMethodId,
    ) {
        let edge = CsCallEdge {
            kind,
            caller_ctx,
            call_site,
            callee: cs_callee,
        };
        if !self.call_graph.add_edge(edge) {
            return;
        }
        self.add_reachable(cs_callee);
        let (callee_ctx, callee) = self.csm.cs_method_parts(cs_callee);
        let Some(ir) = self.program.ir(callee) else {
            return;
        };
        for (arg, param) in invoke.args.iter().zip(ir.params.iter()) {
            let source = self.csm.cs_var(caller_ctx, *arg);
            let target = self.csm.cs_var(callee_ctx, *param);
            self.add_pfg_edge(source, target);
        }
        if let Some(result) = invoke.result {
            for &ret in &ir.return_vars {
                let source = self.csm.cs_var(callee_ctx, ret);
                let target = self.csm.cs_var(caller_ctx, result);
                self.add_pfg_edge(source, target);
            }
        }
    }

    /// Synthesize a taint object if the resolved callee is a configured
    /// source. Taint objects live in the empty heap context and are
    /// deduplicated by (call site, type).
    fn handle_taint_source(
        &mut self,
        ctx: CtxId,
        site: StmtRef,
        invoke: &Invoke,
        callee: MethodId,
    ) {
        let return_type = self.program.method(callee).return_type.clone();
        if !self.taint_config.is_source(callee, &return_type) {
            return;
        }
        let Some(result) = invoke.result else {
            return;
        };
        let obj = self.heap.make_taint(site, return_type);
        let empty_ctx = self.csm.context_id(&self.selector.empty_context());
        let cs_obj = self.csm.cs_obj(empty_ctx, obj);
        let pointer = self.csm.cs_var(ctx, result);
        self.work_list.push_back((pointer, PointsToSet::singleton(cs_obj)));
    }

    /// Install the taint-transfer edges configured for the resolved callee.
    fn handle_taint_transfers(
        &mut self,
        ctx: CtxId,
        invoke: &Invoke,
        callee: MethodId,
        base: Option<PointerId>,
    ) {
        let subsig = self.program.method(callee).subsignature.clone();
        let transfers = self.taint_config.transfers_for(&subsig).to_vec();
        for transfer in transfers {
            if transfer.from >= 0 && transfer.to == RESULT {
                if let Some(result) = invoke.result {
                    let arg = invoke.args[transfer.from as usize];
                    let source = self.csm.cs_var(ctx, arg);
                    let target = self.csm.cs_var(ctx, result);
                    self.add_taint_edge(source, target);
                }
            }
            if transfer.from >= 0 && transfer.to == BASE {
                if let Some(base) = base {
                    let arg = invoke.args[transfer.from as usize];
                    let source = self.csm.cs_var(ctx, arg);
                    self.add_taint_edge(source, base);
                }
            }
            if transfer.from == BASE && transfer.to == RESULT {
                if let (Some(base), Some(result)) = (base, invoke.result) {
                    let target = self.csm.cs_var(ctx, result);
                    self.add_taint_edge(base, target);
                }
            }
        }
    }

    /// Collect the taint flows into configured sinks after the fixed point.
    fn collect_taint_flows(&mut self) -> BTreeSet<TaintFlow> {
        let mut flows = BTreeSet::new();
        if self.taint_config.is_empty() {
            return flows;
        }
        let program = self.program;
        let edges: Vec<CsCallEdge> = self.call_graph.edges().to_vec();
        for edge in edges {
            let (_, callee) = self.csm.cs_method_parts(edge.callee);
            let invoke = program.stmt(edge.call_site).as_invoke().expect("call edge");
            for (index, &arg) in invoke.args.iter().enumerate() {
                if !self.taint_config.is_sink(callee, index) {
                    continue;
                }
                let Some(pointer) = self.csm.find_cs_var(edge.caller_ctx, arg) else {
                    continue;
                };
                for cs_obj in self.csm.pts(pointer).iter() {
                    let (_, obj) = self.csm.cs_obj_parts(cs_obj);
                    if let Some(source_call) = self.heap.taint_source(obj) {
                        flows.insert(TaintFlow {
                            source_call,
                            sink_call: edge.call_site,
                            index,
                        });
                    }
                }
            }
        }
        flows
    }
}

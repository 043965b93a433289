//! Context-sensitive analysis elements and their interning manager.
//!
//! The [`CsManager`] maintains the invariant that for every
//! (context, variable), (context, object), (object, field) and
//! (object, array-cell) tuple exactly one canonical pointer exists.
//! Pointers are referenced through [`PointerId`] handles;
//! each pointer owns its points-to set.

use fnv::FnvHashMap;

use super::context::Context;
use super::heap::ObjId;
use super::pts::PointsToSet;
use crate::intermediate_representation::{CallKind, FieldId, MethodId, StmtRef, VarId};
use crate::prelude::*;

/// The id of an interned context.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct CtxId(pub usize);

/// The id of a context-sensitive heap object, i.e. of a
/// (heap context, object) pair.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct CsObjId(pub usize);

/// The id of a context-sensitive method, i.e. of a (context, method) pair.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct CsMethodId(pub usize);

/// The id of a pointer node of the pointer flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct PointerId(pub usize);

/// A node of the pointer flow graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Pointer {
    /// A context-sensitive variable.
    CsVar {
        /// The context the variable is analyzed under.
        ctx: CtxId,
        /// The variable.
        var: VarId,
    },
    /// A static field.
    StaticField(FieldId),
    /// An instance field of a context-sensitive heap object.
    InstanceField {
        /// The object owning the field.
        obj: CsObjId,
        /// The field.
        field: FieldId,
    },
    /// The single abstract cell of an array object.
    /// Array indices are not distinguished by the heap abstraction.
    ArrayIndex(CsObjId),
}

/// The interning manager for contexts, pointers, context-sensitive objects
/// and context-sensitive methods.
#[derive(Debug, Default)]
pub struct CsManager {
    contexts: Vec<Context>,
    context_ids: FnvHashMap<Context, CtxId>,
    pointers: Vec<Pointer>,
    points_to: Vec<PointsToSet>,
    cs_vars: FnvHashMap<(CtxId, VarId), PointerId>,
    static_fields: FnvHashMap<FieldId, PointerId>,
    instance_fields: FnvHashMap<(CsObjId, FieldId), PointerId>,
    array_indexes: FnvHashMap<CsObjId, PointerId>,
    cs_objs: FnvHashMap<(CtxId, ObjId), CsObjId>,
    cs_obj_list: Vec<(CtxId, ObjId)>,
    cs_methods: FnvHashMap<(CtxId, MethodId), CsMethodId>,
    cs_method_list: Vec<(CtxId, MethodId)>,
}

impl CsManager {
    /// Create an empty manager.
    pub fn new() -> CsManager {
        CsManager::default()
    }

    /// Intern a context. Contexts received from a selector that have not
    /// been seen before are simply added.
    pub fn context_id(&mut self, context: &Context) -> CtxId {
        if let Some(id) = self.context_ids.get(context) {
            return *id;
        }
        let id = CtxId(self.contexts.len());
        self.contexts.push(context.clone());
        self.context_ids.insert(context.clone(), id);
        id
    }

    /// Get an interned context by id.
    pub fn context(&self, id: CtxId) -> &Context {
        &self.contexts[id.0]
    }

    /// The canonical pointer of a context-sensitive variable.
    pub fn cs_var(&mut self, ctx: CtxId, var: VarId) -> PointerId {
        if let Some(id) = self.cs_vars.get(&(ctx, var)) {
            return *id;
        }
        let id = self.add_pointer(Pointer::CsVar { ctx, var });
        self.cs_vars.insert((ctx, var), id);
        id
    }

    /// The pointer of a context-sensitive variable,
    /// if it has been created before.
    /// Unlike [`CsManager::cs_var`] this never creates new pointers,
    /// so it is safe to use after the fixed point is reached.
    pub fn find_cs_var(&self, ctx: CtxId, var: VarId) -> Option<PointerId> {
        self.cs_vars.get(&(ctx, var)).copied()
    }

    /// The canonical pointer of a static field.
    pub fn static_field(&mut self, field: FieldId) -> PointerId {
        if let Some(id) = self.static_fields.get(&field) {
            return *id;
        }
        let id = self.add_pointer(Pointer::StaticField(field));
        self.static_fields.insert(field, id);
        id
    }

    /// The canonical pointer of an instance field of a heap object.
    pub fn instance_field(&mut self, obj: CsObjId, field: FieldId) -> PointerId {
        if let Some(id) = self.instance_fields.get(&(obj, field)) {
            return *id;
        }
        let id = self.add_pointer(Pointer::InstanceField { obj, field });
        self.instance_fields.insert((obj, field), id);
        id
    }

    /// The canonical pointer of the array cell of a heap object.
    pub fn array_index(&mut self, obj: CsObjId) -> PointerId {
        if let Some(id) = self.array_indexes.get(&obj) {
            return *id;
        }
        let id = self.add_pointer(Pointer::ArrayIndex(obj));
        self.array_indexes.insert(obj, id);
        id
    }

    /// Intern a (heap context, object) pair.
    pub fn cs_obj(&mut self, ctx: CtxId, obj: ObjId) -> CsObjId {
        if let Some(id) = self.cs_objs.get(&(ctx, obj)) {
            return *id;
        }
        let id = CsObjId(self.cs_obj_list.len());
        self.cs_obj_list.push((ctx, obj));
        self.cs_objs.insert((ctx, obj), id);
        id
    }

    /// The (heap context, object) pair of a context-sensitive object.
    pub fn cs_obj_parts(&self, obj: CsObjId) -> (CtxId, ObjId) {
        self.cs_obj_list[obj.0]
    }

    /// Intern a (context, method) pair.
    pub fn cs_method(&mut self, ctx: CtxId, method: MethodId) -> CsMethodId {
        if let Some(id) = self.cs_methods.get(&(ctx, method)) {
            return *id;
        }
        let id = CsMethodId(self.cs_method_list.len());
        self.cs_method_list.push((ctx, method));
        self.cs_methods.insert((ctx, method), id);
        id
    }

    /// The (context, method) pair of a context-sensitive method.
    pub fn cs_method_parts(&self, method: CsMethodId) -> (CtxId, MethodId) {
        self.cs_method_list[method.0]
    }

    /// Get a pointer by id.
    pub fn pointer(&self, id: PointerId) -> &Pointer {
        &self.pointers[id.0]
    }

    /// The number of pointers created so far.
    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// The current points-to set of a pointer.
    pub fn pts(&self, id: PointerId) -> &PointsToSet {
        &self.points_to[id.0]
    }

    /// The mutable points-to set of a pointer.
    pub fn pts_mut(&mut self, id: PointerId) -> &mut PointsToSet {
        &mut self.points_to[id.0]
    }

    /// Iterate over all interned context-sensitive variables
    /// with their pointers.
    pub fn cs_vars(&self) -> impl Iterator<Item = ((CtxId, VarId), PointerId)> + '_ {
        self.cs_vars.iter().map(|(key, id)| (*key, *id))
    }

    fn add_pointer(&mut self, pointer: Pointer) -> PointerId {
        let id = PointerId(self.pointers.len());
        self.pointers.push(pointer);
        self.points_to.push(PointsToSet::new());
        id
    }
}

/// An edge of the context-sensitive call graph.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct CsCallEdge {
    /// The kind of the call site.
    pub kind: CallKind,
    /// The context of the caller.
    pub caller_ctx: CtxId,
    /// The call site.
    pub call_site: StmtRef,
    /// The context-sensitive callee.
    pub callee: CsMethodId,
}

/// The context-sensitive call graph built on the fly by the pointer
/// analysis: the reachable context-sensitive methods and the call edges.
#[derive(Debug, Default)]
pub struct CsCallGraph {
    entry: Option<CsMethodId>,
    reachable: fnv::FnvHashSet<CsMethodId>,
    edges: Vec<CsCallEdge>,
    edge_set: fnv::FnvHashSet<(CtxId, StmtRef, CsMethodId)>,
}

impl CsCallGraph {
    /// Create an empty call graph.
    pub fn new() -> CsCallGraph {
        CsCallGraph::default()
    }

    /// Declare the entry method.
    pub fn set_entry(&mut self, entry: CsMethodId) {
        self.entry = Some(entry);
    }

    /// The entry method, if one was declared.
    pub fn entry(&self) -> Option<CsMethodId> {
        self.entry
    }

    /// Mark a context-sensitive method as reachable.
    /// Returns whether it was newly added.
    pub fn add_reachable(&mut self, method: CsMethodId) -> bool {
        self.reachable.insert(method)
    }

    /// Returns whether the method is reachable.
    pub fn is_reachable(&self, method: CsMethodId) -> bool {
        self.reachable.contains(&method)
    }

    /// The number of reachable context-sensitive methods.
    pub fn reachable_count(&self) -> usize {
        self.reachable.len()
    }

    /// Add a call edge. Returns whether the edge was new.
    pub fn add_edge(&mut self, edge: CsCallEdge) -> bool {
        if self
            .edge_set
            .insert((edge.caller_ctx, edge.call_site, edge.callee))
        {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// All call edges in insertion order.
    pub fn edges(&self) -> &[CsCallEdge] {
        &self.edges
    }
}

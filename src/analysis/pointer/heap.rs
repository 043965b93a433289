//! The heap model: allocation-site abstraction of heap objects.
//!
//! Every `new` statement is mapped to exactly one abstract object.
//! The model additionally owns the synthetic taint objects created at
//! taint-source call sites, deduplicated by (call site, type).

use fnv::FnvHashMap;

use crate::intermediate_representation::{StmtRef, Type};
use crate::prelude::*;

/// The id of an abstract heap object.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct ObjId(pub usize);

/// An abstract heap object.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Obj {
    /// An object abstracting all objects allocated at one allocation site.
    Alloc {
        /// The allocation site.
        site: StmtRef,
        /// The type of the allocated object.
        ty: Type,
    },
    /// A synthetic object representing tainted data
    /// entering the program at a taint-source call site.
    Taint {
        /// The call site of the taint source.
        source_call: StmtRef,
        /// The type the source produces.
        ty: Type,
    },
}

impl Obj {
    /// The type of the object.
    pub fn ty(&self) -> &Type {
        match self {
            Obj::Alloc { ty, .. } | Obj::Taint { ty, .. } => ty,
        }
    }
}

/// The allocation-site heap model.
#[derive(Debug, Default, Clone)]
pub struct HeapModel {
    objs: Vec<Obj>,
    allocs: FnvHashMap<StmtRef, ObjId>,
    taints: FnvHashMap<(StmtRef, Type), ObjId>,
}

impl HeapModel {
    /// Create an empty heap model.
    pub fn new() -> HeapModel {
        HeapModel::default()
    }

    /// The abstract object of the given allocation site,
    /// created on first use.
    pub fn obj_at(&mut self, site: StmtRef, ty: Type) -> ObjId {
        if let Some(obj) = self.allocs.get(&site) {
            return *obj;
        }
        let obj = ObjId(self.objs.len());
        self.objs.push(Obj::Alloc { site, ty });
        self.allocs.insert(site, obj);
        obj
    }

    /// The taint object for the given source call site and type,
    /// created on first use. Deduplicated by (call site, type),
    /// never by identity of a synthesized value.
    pub fn make_taint(&mut self, source_call: StmtRef, ty: Type) -> ObjId {
        if let Some(obj) = self.taints.get(&(source_call, ty.clone())) {
            return *obj;
        }
        let obj = ObjId(self.objs.len());
        self.objs.push(Obj::Taint {
            source_call,
            ty: ty.clone(),
        });
        self.taints.insert((source_call, ty), obj);
        obj
    }

    /// Get an object by id.
    pub fn obj(&self, obj: ObjId) -> &Obj {
        &self.objs[obj.0]
    }

    /// Returns true iff the object is a synthetic taint object.
    pub fn is_taint(&self, obj: ObjId) -> bool {
        matches!(self.obj(obj), Obj::Taint { .. })
    }

    /// The source call site of a taint object,
    /// or `None` for ordinary heap objects.
    pub fn taint_source(&self, obj: ObjId) -> Option<StmtRef> {
        match self.obj(obj) {
            Obj::Taint { source_call, .. } => Some(*source_call),
            Obj::Alloc { .. } => None,
        }
    }
}

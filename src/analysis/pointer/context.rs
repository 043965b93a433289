//! Contexts and context selectors.
//!
//! A context is a bounded sequence of context elements (call sites or
//! allocation sites). The solver treats contexts as opaque values:
//! which elements are recorded, and how many, is decided by the
//! [`ContextSelector`] in use. Termination of the analysis only requires
//! that a selector produces finitely many contexts for a finite program.

use super::heap::ObjId;
use crate::intermediate_representation::{MethodId, StmtRef};
use crate::prelude::*;

/// An element of a context.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum ContextElem {
    /// A call site, for call-site-sensitive contexts.
    CallSite(StmtRef),
    /// An allocation site, for object-sensitive contexts.
    Obj(ObjId),
}

/// A context: a bounded sequence of context elements.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Default)]
pub struct Context(Vec<ContextElem>);

impl Context {
    /// The empty context.
    pub fn empty() -> Context {
        Context::default()
    }

    /// The elements of the context, oldest first.
    pub fn elements(&self) -> &[ContextElem] {
        &self.0
    }

    /// A new context consisting of the last `limit - 1` elements of `self`
    /// followed by `elem`. For `limit == 0` the empty context is returned.
    pub fn appended(&self, elem: ContextElem, limit: usize) -> Context {
        if limit == 0 {
            return Context::empty();
        }
        let keep = self.0.len().saturating_sub(limit - 1);
        let mut elements = self.0[keep..].to_vec();
        elements.push(elem);
        Context(elements)
    }

    /// A new context consisting of the last `limit` elements of `self`.
    pub fn truncated(&self, limit: usize) -> Context {
        let keep = self.0.len().saturating_sub(limit);
        Context(self.0[keep..].to_vec())
    }
}

/// The strategy deciding which contexts the analysis distinguishes.
pub trait ContextSelector {
    /// The context of the entry method.
    fn empty_context(&self) -> Context {
        Context::empty()
    }

    /// The heap context for an object allocated in a method
    /// analyzed under `method_ctx`.
    fn select_heap_context(&self, method_ctx: &Context, obj: ObjId) -> Context;

    /// The callee context for a static call.
    fn select_static_context(
        &self,
        caller_ctx: &Context,
        call_site: StmtRef,
        callee: MethodId,
    ) -> Context;

    /// The callee context for a virtual call with the given receiver object.
    fn select_virtual_context(
        &self,
        caller_ctx: &Context,
        call_site: StmtRef,
        recv_ctx: &Context,
        recv_obj: ObjId,
        callee: MethodId,
    ) -> Context;
}

/// Context-insensitive analysis: every method and object gets the empty
/// context.
pub struct ContextInsensitive;

impl ContextSelector for ContextInsensitive {
    fn select_heap_context(&self, _method_ctx: &Context, _obj: ObjId) -> Context {
        Context::empty()
    }

    fn select_static_context(
        &self,
        _caller_ctx: &Context,
        _call_site: StmtRef,
        _callee: MethodId,
    ) -> Context {
        Context::empty()
    }

    fn select_virtual_context(
        &self,
        _caller_ctx: &Context,
        _call_site: StmtRef,
        _recv_ctx: &Context,
        _recv_obj: ObjId,
        _callee: MethodId,
    ) -> Context {
        Context::empty()
    }
}

/// k-call-site sensitivity: a callee context is the last `k` call sites
/// on the call string, heap contexts keep `k - 1` of them.
pub struct CallSiteSensitive {
    k: usize,
}

impl CallSiteSensitive {
    /// Create a selector with call strings of length `k`.
    pub fn new(k: usize) -> CallSiteSensitive {
        CallSiteSensitive { k }
    }
}

impl ContextSelector for CallSiteSensitive {
    fn select_heap_context(&self, method_ctx: &Context, _obj: ObjId) -> Context {
        method_ctx.truncated(self.k.saturating_sub(1))
    }

    fn select_static_context(
        &self,
        caller_ctx: &Context,
        call_site: StmtRef,
        _callee: MethodId,
    ) -> Context {
        caller_ctx.appended(ContextElem::CallSite(call_site), self.k)
    }

    fn select_virtual_context(
        &self,
        caller_ctx: &Context,
        call_site: StmtRef,
        _recv_ctx: &Context,
        _recv_obj: ObjId,
        _callee: MethodId,
    ) -> Context {
        caller_ctx.appended(ContextElem::CallSite(call_site), self.k)
    }
}

/// k-object sensitivity: a callee context of a virtual call is derived from
/// the receiver object, static calls inherit the caller context.
pub struct ObjectSensitive {
    k: usize,
}

impl ObjectSensitive {
    /// Create a selector with object strings of length `k`.
    pub fn new(k: usize) -> ObjectSensitive {
        ObjectSensitive { k }
    }
}

impl ContextSelector for ObjectSensitive {
    fn select_heap_context(&self, method_ctx: &Context, _obj: ObjId) -> Context {
        method_ctx.truncated(self.k.saturating_sub(1))
    }

    fn select_static_context(
        &self,
        caller_ctx: &Context,
        _call_site: StmtRef,
        _callee: MethodId,
    ) -> Context {
        caller_ctx.clone()
    }

    fn select_virtual_context(
        &self,
        _caller_ctx: &Context,
        _call_site: StmtRef,
        recv_ctx: &Context,
        recv_obj: ObjId,
        _callee: MethodId,
    ) -> Context {
        recv_ctx.appended(ContextElem::Obj(recv_obj), self.k)
    }
}

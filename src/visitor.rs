//! Dispatch entry point the mark loop (`mark.rs`) calls once per traced edge.
//! `Visitor` is a thin, object-safe wrapper so `TraceTrait::trace` bodies
//! (including the library's own `Vec`/`HashMap`/`GcRef` impls in `gcref.rs`)
//! don't need to know whether the real implementation is the mark stack, a
//! root-counting pass, or a test double.

use crate::{
    gc_info_table::GC_TABLE,
    gcref::{GcRef, UntypedGcRef},
    internal::trace_trait::{TraceDescriptor, TraceTrait},
};

pub trait VisitorTrait {
    fn visit(&mut self, this: *const u8, descriptor: TraceDescriptor) {
        let _ = this;
        let _ = descriptor;
    }

    fn visit_weak(&mut self, this: *const u8, descriptor: TraceDescriptor) {
        let _ = this;
        let _ = descriptor;
    }
}

#[repr(C)]
pub struct Visitor {
    vis: *mut dyn VisitorTrait,
}

impl Visitor {
    pub fn new(vis: *mut dyn VisitorTrait) -> Self {
        Self { vis }
    }

    /// Trace method for raw pointers. Prefer the versions for managed pointers.
    pub unsafe fn trace<T: TraceTrait>(&mut self, t: *const T) {
        if t.is_null() {
            return;
        }
        (*self.vis).visit(t.cast(), <T as TraceTrait>::get_trace_descriptor(t.cast()))
    }

    /// Trace method for inlined values that are not separately allocated but
    /// otherwise follow the managed object's `trace()` contract.
    pub fn trace_ref<T: TraceTrait>(&mut self, object: &T) {
        <T as TraceTrait>::trace(object, self);
    }

    /// Trace a typed managed reference by dispatching through its static
    /// trace descriptor (the Rust-level equivalent of spec §4.F's
    /// type-descriptor dispatch for a known-type child).
    pub fn trace_gcref<T: TraceTrait>(&mut self, r: GcRef<T>) {
        unsafe {
            let payload = r.raw.get().cast::<T>();
            (*self.vis).visit(
                payload.cast(),
                <T as TraceTrait>::get_trace_descriptor(payload.cast()),
            )
        }
    }

    /// Trace an erased managed reference by looking its trace callback up in
    /// the process-wide `GCInfoTable` (the type is only known at runtime).
    pub fn trace_untyped(&mut self, r: UntypedGcRef) {
        unsafe {
            let header = r.header();
            let info = header.as_ref().type_index().get();
            let payload = header.as_ref().payload();
            (*self.vis).visit(
                payload,
                TraceDescriptor {
                    base_object_payload: payload,
                    callback: info.trace,
                },
            );
        }
    }

    /// Weak-edge variant: the visitor is told about the edge but a mark-loop
    /// implementation must not keep the target alive through it.
    pub fn trace_weak_untyped(&mut self, r: UntypedGcRef) {
        unsafe {
            let header = r.header();
            let info = header.as_ref().type_index().get();
            let payload = header.as_ref().payload();
            (*self.vis).visit_weak(
                payload,
                TraceDescriptor {
                    base_object_payload: payload,
                    callback: info.trace,
                },
            );
        }
    }
}

/// Looks up and invokes the trace callback registered for `index`, driving
/// `visitor` over the object at `payload`. Used by the mark loop when all it
/// has is a header (no static Rust type).
pub unsafe fn dispatch_trace(
    index: crate::internal::gc_info::GCInfoIndex,
    payload: *const u8,
    visitor: &mut Visitor,
) {
    let info = GC_TABLE.get_gc_info(index);
    (info.trace)(visitor as *mut Visitor, payload);
}

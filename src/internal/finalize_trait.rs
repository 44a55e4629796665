pub type FinalizationCallback = extern "C" fn(*mut u8);

/// How a Rust type is torn down when the collector reclaims it (spec §4.H
/// calls this the registered "finalizer"; this trait is the zero-registration
/// default used for plain Rust `Drop` types, distinct from the embedder-level
/// `add_finalizer`/`add_ptr_finalizer`/`add_quiescent` entries in `finalize.rs`).
pub trait FinalizeTrait<T> {
    const NON_TRIVIAL_DTOR: bool = core::mem::needs_drop::<T>();
    const CALLBACK: Option<FinalizationCallback> = if Self::NON_TRIVIAL_DTOR {
        Some(Self::finalize)
    } else {
        None
    };

    extern "C" fn finalize(obj: *mut u8) {
        unsafe {
            core::ptr::drop_in_place(obj.cast::<T>());
        }
    }
}


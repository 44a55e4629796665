use std::{any::TypeId, sync::atomic::AtomicU16};

use crate::gc_info_table::{GCInfo, GC_TABLE};

use super::{finalize_trait::FinalizeTrait, trace_trait::TraceTrait};

/// Determines how the collector treats a Rust type with respect to tracing
/// and finalization. Implemented automatically for every type that implements
/// [`TraceTrait`] and [`FinalizeTrait`].
pub trait GCInfoTrait<T: TraceTrait + FinalizeTrait<T> + Sized + 'static> {
    const REGISTERED_INDEX: AtomicU16;
    /// Returns the index of this type's [`GCInfo`] in the process-wide table.
    fn index() -> GCInfoIndex;
}

impl<T: TraceTrait + FinalizeTrait<T> + Sized + 'static> GCInfoTrait<T> for T {
    const REGISTERED_INDEX: AtomicU16 = AtomicU16::new(0);
    fn index() -> GCInfoIndex {
        unsafe {
            GC_TABLE.add_gc_info_type_id(
                TypeId::of::<T>(),
                GCInfo {
                    finalize: <T as FinalizeTrait<T>>::CALLBACK,
                    trace: <T as TraceTrait>::trace_,
                },
            )
        }
    }
}

/// Index into the process-wide type-descriptor table. Stored in the high
/// bits of every [`HeapObjectHeader`](crate::header::HeapObjectHeader) word.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct GCInfoIndex(pub(crate) u16);

impl GCInfoIndex {
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub fn get(self) -> GCInfo {
        unsafe { GC_TABLE.get_gc_info(self) }
    }

    /// Obtain a mutable reference to this type's `GCInfo`.
    ///
    /// # Safety
    /// Mutating a live `GCInfo` while a collection may be running is unsound.
    pub unsafe fn get_mut(self) -> &'static mut GCInfo {
        GC_TABLE.get_gc_info_mut(self)
    }
}

//! Component H: finalizer subsystem (spec.md §4.H), grounded in the teacher's
//! `internal/finalize_trait.rs` extern-"C" finalizer callback shape,
//! generalized to the embedder-registered finalizer lists spec.md describes.
//!
//! Per spec.md §9's design note on "Pointer-tagging in headers and finalizer
//! lists", the two low bits of the object slot are preserved as a packed tag
//! rather than modeled as a plain enum, since an embedder may observe the
//! layout directly across the FFI boundary.

use crate::{
    gcref::UntypedGcRef,
    header::HeapObjectHeader,
    internal::finalize_trait::FinalizationCallback,
};
use parking_lot::Mutex;
use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Bit 0: the finalizer is an unboxed native function pointer (no managed
/// dispatch through `GCInfoTable`).
const TAG_NATIVE_PTR: usize = 0b01;
/// Bit 1: the entry is already "freed" and must fire at the next quiescent
/// point regardless of reachability.
const TAG_QUIESCENT: usize = 0b10;
const TAG_MASK: usize = 0b11;

#[derive(Clone, Copy)]
pub struct FinalizerEntry {
    tagged_object: usize,
    finalizer: FinalizationCallback,
}

impl FinalizerEntry {
    fn new(object: UntypedGcRef, tag: usize, finalizer: FinalizationCallback) -> Self {
        Self {
            tagged_object: object.header().as_ptr() as usize | tag,
            finalizer,
        }
    }

    pub fn object(&self) -> NonNull<HeapObjectHeader> {
        unsafe { NonNull::new_unchecked((self.tagged_object & !TAG_MASK) as *mut HeapObjectHeader) }
    }

    pub fn is_native_ptr(&self) -> bool {
        self.tagged_object & TAG_NATIVE_PTR != 0
    }

    pub fn is_quiescent(&self) -> bool {
        self.tagged_object & TAG_QUIESCENT != 0
    }

    fn run(&self) {
        let payload = unsafe { self.object().as_ref().payload() };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.finalizer)(payload);
        }));
        if let Err(payload) = result {
            // spec.md §7: "Finalizer failure is caught; the error is printed
            // to the standard error stream with a backtrace and the
            // remaining finalizers run."
            eprintln!("gc: finalizer panicked: {:?}", describe_panic(&payload));
            eprintln!("{:?}", backtrace::Backtrace::new());
        }
    }
}

fn describe_panic(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Per-thread finalizer list. Length is tracked with an atomic so concurrent
/// `finalize(obj)` calls on other threads observe a consistent prefix while
/// resizes happen under the finalizer lock (spec.md §5).
#[derive(Default)]
pub struct FinalizerList {
    entries: Mutex<Vec<FinalizerEntry>>,
    len: AtomicUsize,
}

impl FinalizerList {
    pub fn add(&self, object: UntypedGcRef, finalizer: FinalizationCallback) {
        self.push(FinalizerEntry::new(object, 0, finalizer));
    }

    pub fn add_ptr(&self, object: UntypedGcRef, finalizer: FinalizationCallback) {
        self.push(FinalizerEntry::new(object, TAG_NATIVE_PTR, finalizer));
    }

    pub fn add_quiescent(&self, object: UntypedGcRef, finalizer: FinalizationCallback) {
        self.push(FinalizerEntry::new(
            object,
            TAG_NATIVE_PTR | TAG_QUIESCENT,
            finalizer,
        ));
    }

    fn push(&self, entry: FinalizerEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        self.len.store(entries.len(), Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// spec.md §4.H `sweep_finalizer_list`: entries whose object was not
    /// marked move to `to_finalize`; marked-and-old entries move to the
    /// global `finalizer_list_marked`; marked-and-young entries stay.
    pub fn sweep_into(&self, to_finalize: &mut Vec<FinalizerEntry>, finalizer_list_marked: &mut Vec<FinalizerEntry>) {
        let mut entries = self.entries.lock();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            let header = unsafe { entry.object().as_ref() };
            if entry.is_quiescent() {
                to_finalize.push(entry);
            } else if !header.is_marked() {
                to_finalize.push(entry);
            } else if header.is_old() {
                finalizer_list_marked.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *entries = kept;
        self.len.store(entries.len(), Ordering::Release);
    }

    /// Extracts every entry whose object is `target` into a fresh list
    /// (spec.md §4.H `finalize(object)`), removing them from this list.
    pub fn extract(&self, target: NonNull<HeapObjectHeader>, out: &mut Vec<FinalizerEntry>) {
        let mut entries = self.entries.lock();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if entry.object() == target {
                out.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *entries = kept;
        self.len.store(entries.len(), Ordering::Release);
    }

    /// Re-pushes the entries surviving a marked-list scan (used by the
    /// collector's root pass over `finalizer_list_marked`).
    pub fn snapshot(&self) -> Vec<FinalizerEntry> {
        self.entries.lock().clone()
    }
}

/// Global finalizer state (spec.md §3: "a process-wide `to_finalize` queue, a
/// `finalizer_list_marked` list"), protected by the finalizer lock (spec.md
/// §5).
#[derive(Default)]
pub struct GlobalFinalizerState {
    inner: Mutex<GlobalFinalizerInner>,
}

#[derive(Default)]
struct GlobalFinalizerInner {
    to_finalize: Vec<FinalizerEntry>,
    finalizer_list_marked: Vec<FinalizerEntry>,
}

impl GlobalFinalizerState {
    pub fn merge_sweep_results(&self, mut to_finalize: Vec<FinalizerEntry>, mut marked: Vec<FinalizerEntry>) {
        let mut inner = self.inner.lock();
        inner.to_finalize.append(&mut to_finalize);
        inner.finalizer_list_marked.append(&mut marked);
    }

    /// Roots to push during the mark loop's second pass (spec.md §4.F:
    /// "`finalizer_list_marked` is walked and its entries scanned as roots").
    pub fn marked_roots(&self) -> Vec<NonNull<HeapObjectHeader>> {
        self.inner.lock().finalizer_list_marked.iter().map(|e| e.object()).collect()
    }

    /// spec.md §4.H `finalize(object)`: explicit finalization path, also
    /// scanning the global marked list.
    pub fn extract_marked(&self, target: NonNull<HeapObjectHeader>, out: &mut Vec<FinalizerEntry>) {
        let mut inner = self.inner.lock();
        let mut kept = Vec::with_capacity(inner.finalizer_list_marked.len());
        for entry in inner.finalizer_list_marked.drain(..) {
            if entry.object() == target {
                out.push(entry);
            } else {
                kept.push(entry);
            }
        }
        inner.finalizer_list_marked = kept;
    }

    /// spec.md §4.H `run_pending_finalizers`: drains `to_finalize` under the
    /// finalizer lock and runs entries in reverse registration order.
    pub fn run_pending(&self, inhibited: bool) {
        if inhibited {
            return;
        }
        let pending = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.to_finalize)
        };
        run_entries(&pending);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().to_finalize.len()
    }
}

/// spec.md §8 property 6: "finalizers execute in reverse insertion order."
pub fn run_entries(entries: &[FinalizerEntry]) {
    for entry in entries.iter().rev() {
        entry.run();
    }
}

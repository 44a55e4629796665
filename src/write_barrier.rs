//! Component E: write barrier and remembered set (spec.md §4.E), grounded in
//! the teacher's `gc_base.rs::GcBase::write_barrier` entry point and the
//! byte-CAS idiom of `internal/card_table.rs`, adapted to object granularity
//! since spec.md's remset is a list of object pointers, not a byte-per-card
//! table.

use crate::{
    gcref::UntypedGcRef,
    header::{GcBits, HeapObjectHeader},
};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One thread's remembered set of old objects known (or suspected) to
/// reference young objects.
#[derive(Default)]
pub struct RemSet {
    pub entries: Vec<NonNull<HeapObjectHeader>>,
    /// Heuristic counter bumped on every forward-barrier append (spec.md
    /// §4.E: "The remset counter `remset_nptr` is bumped heuristically"),
    /// consulted by the collection driver to decide whether to escalate the
    /// next cycle to full (spec.md §4.I.6).
    pub remset_nptr: AtomicUsize,
}

impl RemSet {
    pub fn push(&mut self, header: NonNull<HeapObjectHeader>) {
        self.entries.push(header);
        self.remset_nptr.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.remset_nptr.store(0, Ordering::Relaxed);
    }
}

/// The two swappable remset buffers a thread owns (spec.md §4.E: "Each
/// thread owns two remset buffers swapped at the start of marking: `remset`
/// ... and `last_remset`").
#[derive(Default)]
pub struct RemSetPair {
    pub remset: RemSet,
    pub last_remset: RemSet,
}

impl RemSetPair {
    /// Called once per collection, before marking starts: `last_remset`
    /// becomes the frozen root set for this cycle, `remset` starts fresh to
    /// collect edges created *during* this cycle.
    pub fn swap_for_cycle(&mut self) {
        std::mem::swap(&mut self.remset, &mut self.last_remset);
        self.remset.clear();
    }
}

/// Module-binding edges, stored separately per spec.md §4.E ("Binding
/// barrier analog for module-binding slots, which are stored in a separate
/// `rem_bindings` list and tagged `OLD_MARKED` immediately").
#[derive(Default)]
pub struct RemBindings {
    pub entries: Vec<UntypedGcRef>,
}

/// Forward write barrier (spec.md §4.E): invoked when an already
/// `OLD_MARKED` object is assigned a (possibly young) child reference.
/// `OLD_MARKED` already implies "reached"; re-appending to the remset is
/// what actually matters, since it's what makes the collector revisit `obj`
/// as a root next cycle even though it won't be found via root scanning.
pub fn queue_root(remset: &mut RemSet, obj: UntypedGcRef) {
    let header = obj.header();
    if unsafe { header.as_ref().bits() } == GcBits::OldMarked {
        remset.push(header);
    }
}

/// Binding write barrier (spec.md §4.E): module-binding slots are tagged
/// `OLD_MARKED` immediately and tracked in `rem_bindings` rather than the
/// regular remset, since module bindings are always-old roots.
pub fn queue_binding(rem_bindings: &mut RemBindings, binding: UntypedGcRef) {
    unsafe { binding.header().as_ref().set_bits(GcBits::OldMarked) };
    rem_bindings.entries.push(binding);
}

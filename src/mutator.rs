//! Per-thread mutator state (spec.md §3 "Thread-local heap state"), grounded
//! in the teacher's `mutator.rs` (`ThreadState`, `enter_safe`/`enter_unsafe`,
//! `oom_abort`) and `global.rs`'s per-thread attach/detach pattern.

use crate::{
    big_object::BigObjectList,
    finalize::FinalizerList,
    gcref::{UntypedGcRef, WeakGcRef},
    malloc_buffer::MallocBufferList,
    pool::PoolAllocator,
    shadow_stack::ShadowStack,
    write_barrier::{RemBindings, RemSetPair},
};
use std::cell::Cell;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

/// spec.md §5: "a program point where a mutator voluntarily parks so the
/// collector may run." Mirrors the teacher's `ThreadState`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ThreadState {
    /// Running mutator code that may touch the heap; must reach a safepoint
    /// before the collector can proceed.
    Unsafe = 0,
    /// Parked at a safepoint, waiting for the collector to finish.
    Waiting = 1,
    /// Not touching managed memory (e.g. blocked in a syscall); the
    /// collector may proceed without waiting on this thread.
    Safe = 2,
}

impl ThreadState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ThreadState::Unsafe,
            1 => ThreadState::Waiting,
            _ => ThreadState::Safe,
        }
    }
}

/// Per-mutator state. Everything here is thread-local by convention: the
/// owning mutator thread accesses it without synchronization except during a
/// stop-the-world window, when the collector thread is the sole accessor
/// (spec.md §5 "Scheduling").
pub struct MutatorState {
    pub id: usize,
    pub pool: PoolAllocator,
    pub big_objects: BigObjectList,
    pub malloc_buffers: MallocBufferList,
    pub weak_refs: Vec<WeakGcRef>,
    pub remset: RemSetPair,
    pub rem_bindings: RemBindings,
    pub finalizers: FinalizerList,
    pub shadow_stack: ShadowStack,
    /// spec.md §4.F `excstack` frame: the thread's pending-exception object,
    /// if any, scanned as a root so an in-flight exception's payload cannot
    /// be collected out from under a handler.
    pub pending_exception: Cell<Option<UntypedGcRef>>,
    pub finalizers_inhibited: AtomicU8,
    pub in_finalizer: std::cell::Cell<bool>,
    gc_state: AtomicU8,
    /// spec.md §4.B step 1: "counter is initialized to `-interval`;
    /// allocations add to it; crossing zero means one interval consumed."
    alloc_counter: AtomicI64,
}

impl MutatorState {
    pub fn new(id: usize, default_interval: usize) -> Self {
        Self {
            id,
            pool: PoolAllocator::new(id),
            big_objects: BigObjectList::default(),
            malloc_buffers: MallocBufferList::default(),
            weak_refs: Vec::new(),
            remset: RemSetPair::default(),
            rem_bindings: RemBindings::default(),
            finalizers: FinalizerList::default(),
            shadow_stack: ShadowStack::new(),
            pending_exception: Cell::new(None),
            finalizers_inhibited: AtomicU8::new(0),
            in_finalizer: std::cell::Cell::new(false),
            gc_state: AtomicU8::new(ThreadState::Unsafe as u8),
            alloc_counter: AtomicI64::new(-(default_interval as i64)),
        }
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.gc_state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ThreadState) {
        self.gc_state.store(state as u8, Ordering::Release);
    }

    /// Bumps the allocation counter; returns `true` if this allocation
    /// crossed zero (one interval consumed, spec.md §4.B step 1) and a
    /// safepoint poll is due.
    pub fn bump_alloc_counter(&self, size: usize) -> bool {
        let before = self.alloc_counter.fetch_add(size as i64, Ordering::Relaxed);
        before < 0 && before + size as i64 >= 0
    }

    pub fn reset_alloc_counter(&self, interval: usize) {
        self.alloc_counter.store(-(interval as i64), Ordering::Relaxed);
    }

    pub fn alloc_counter(&self) -> i64 {
        self.alloc_counter.load(Ordering::Relaxed)
    }

    pub fn is_inhibited(&self) -> bool {
        self.finalizers_inhibited.load(Ordering::Relaxed) > 0 || self.in_finalizer.get()
    }
}

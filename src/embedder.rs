//! §6 embedder API surface: the symbols a host runtime calls to allocate,
//! root, finalize and drive collection. Grounded in the teacher's `api.rs`
//! (`Heap`/`Mutator` facade) and `global.rs`'s per-process singleton plus
//! per-thread attach pattern.

use crate::{
    big_object::big_alloc,
    callbacks::{ExternalAllocFn, ExternalFreeFn, PostGcFn, PreGcFn, RootScannerFn, TaskScannerFn},
    collector::{CollectKind, Collector},
    config::GcConfig,
    conservative,
    error::{GcError, GcResult},
    finalize::FinalizerEntry,
    gcref::{GcRef, UntypedGcRef, WeakGcRef, WeakSlot},
    header::HeapObjectHeader,
    internal::{
        finalize_trait::{FinalizationCallback, FinalizeTrait},
        gc_info::GCInfoTrait,
        trace_trait::TraceTrait,
    },
    mutator::MutatorState,
    perm::PermSpace,
    pool::{cell_size_for, size_class_index},
    shadow_stack::ShadowStack,
    shadow_stack::ShadowStackEntry,
    write_barrier::{queue_binding as wb_queue_binding, queue_root as wb_queue_root},
};
use parking_lot::Mutex;

/// A single managed heap: the collector plus every attached mutator's state
/// and the permanent allocation region. One process normally owns exactly
/// one; nothing here prevents more for embedding or testing.
pub struct Heap {
    pub collector: Collector,
    mutators: Mutex<Vec<Box<MutatorState>>>,
    perm: Mutex<PermSpace>,
}

impl Heap {
    pub fn new(config: GcConfig) -> Self {
        Self {
            collector: Collector::new(config),
            mutators: Mutex::new(Vec::new()),
            perm: Mutex::new(PermSpace::new()),
        }
    }

    /// Attaches a new mutator thread, returning its id for use with every
    /// other `Heap` method. `MutatorState`s are never removed once attached,
    /// so raw pointers into this vector (see `push_frame`) stay valid for
    /// the life of the `Heap`.
    pub fn attach_mutator(&self) -> usize {
        let mut mutators = self.mutators.lock();
        let id = mutators.len();
        mutators.push(Box::new(MutatorState::new(id, self.collector.current_interval())));
        id
    }

    fn with_mutators<R>(&self, f: impl FnOnce(&mut [&mut MutatorState]) -> R) -> R {
        let mut guard = self.mutators.lock();
        let mut refs: Vec<&mut MutatorState> = guard.iter_mut().map(|b| b.as_mut()).collect();
        f(&mut refs)
    }

    /// spec.md §4.B/§4.C `alloc`: routes to the pool allocator below the
    /// largest size class, the big-object allocator above it. Only the
    /// header is initialized; the caller writes `T`'s fields into the
    /// returned cell's payload before anything else can observe it.
    pub fn alloc<T>(&self, thread: usize) -> GcResult<GcRef<T>>
    where
        T: GCInfoTrait<T> + TraceTrait + FinalizeTrait<T> + 'static,
    {
        let payload_size = std::mem::size_of::<T>();
        let cell_size = cell_size_for(payload_size);
        if cell_size > (i64::MAX / 2) as usize {
            return Err(GcError::AllocationCounterOverflow {
                requested: payload_size,
            });
        }
        let type_index = T::index();

        let (crossed, header) = self.with_mutators(|mutators| {
            let crossed = mutators[thread].bump_alloc_counter(cell_size);
            let header = if let Some(sci) = size_class_index(cell_size) {
                mutators[thread]
                    .pool
                    .pool_alloc(&self.collector.page_map, sci, type_index)
            } else {
                let owner = mutators[thread].id;
                let big = self.collector.with_callbacks(|cb| {
                    big_alloc(&mut mutators[thread].big_objects, owner, &*cb, payload_size, type_index)
                });
                big.cast::<HeapObjectHeader>()
            };
            (crossed, header)
        });

        if crossed {
            self.poll(thread);
            self.collect(CollectKind::Auto, thread);
        }
        Ok(UntypedGcRef::from_header(header)
            .cast()
            .unwrap_or_else(|| unreachable!("just allocated with this type's own index")))
    }

    fn poll(&self, thread: usize) {
        self.with_mutators(|mutators| {
            self.collector.safepoint.poll(mutators[thread]);
        });
    }

    /// spec.md §6 `collect(kind)`.
    pub fn collect(&self, kind: CollectKind, caller: usize) {
        self.with_mutators(|mutators| {
            self.collector.collect(kind, mutators, caller);
        });
    }

    pub fn enable(&self, enabled: bool) {
        self.collector.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.collector.is_enabled()
    }

    pub fn set_max_memory(&self, bytes: usize) {
        self.collector.set_max_memory(bytes);
    }

    pub fn enable_conservative_gc_support(&self) {
        self.with_mutators(|mutators| {
            self.collector.enable_conservative_gc_support(mutators);
        });
    }

    /// spec.md §6 conservative interior-pointer resolver.
    pub fn internal_obj_base_ptr(&self, ptr: usize) -> Option<usize> {
        let mutators = self.mutators.lock();
        let refs: Vec<&MutatorState> = mutators.iter().map(|b| b.as_ref()).collect();
        conservative::internal_obj_base_ptr(&self.collector.page_map, &refs, ptr)
    }

    /// spec.md §4.E forward write barrier.
    pub fn queue_root(&self, thread: usize, parent: UntypedGcRef) {
        self.with_mutators(|mutators| wb_queue_root(&mut mutators[thread].remset.remset, parent));
    }

    /// spec.md §4.E binding write barrier.
    pub fn queue_binding(&self, thread: usize, binding: UntypedGcRef) {
        self.with_mutators(|mutators| wb_queue_binding(&mut mutators[thread].rem_bindings, binding));
    }

    /// spec.md §4.C `new_weakref`: allocates a `WeakSlot` cell pointing at
    /// `target` and records it on the owning thread's weak-ref list so
    /// sweep can clear it.
    pub fn new_weakref(&self, thread: usize, target: UntypedGcRef) -> GcResult<WeakGcRef> {
        let slot = self.alloc::<WeakSlot>(thread)?;
        unsafe {
            (slot.downcast().get() as *mut WeakSlot).write(WeakSlot::new(target));
        }
        self.with_mutators(|mutators| mutators[thread].weak_refs.push(WeakGcRef { slot }));
        Ok(WeakGcRef { slot })
    }

    pub fn add_finalizer(&self, thread: usize, object: UntypedGcRef, f: FinalizationCallback) {
        self.with_mutators(|mutators| mutators[thread].finalizers.add(object, f));
    }

    pub fn add_ptr_finalizer(&self, thread: usize, object: UntypedGcRef, f: FinalizationCallback) {
        self.with_mutators(|mutators| mutators[thread].finalizers.add_ptr(object, f));
    }

    pub fn add_quiescent(&self, thread: usize, object: UntypedGcRef, f: FinalizationCallback) {
        self.with_mutators(|mutators| mutators[thread].finalizers.add_quiescent(object, f));
    }

    /// spec.md §4.H `finalize(object)`: runs any finalizer registered for
    /// `object` immediately, pulling it out of whichever list (thread-local
    /// or the global marked list) currently holds it.
    pub fn finalize(&self, thread: usize, object: UntypedGcRef) {
        let mut entries: Vec<FinalizerEntry> = Vec::new();
        self.with_mutators(|mutators| {
            mutators[thread].finalizers.extract(object.header(), &mut entries);
        });
        self.collector.finalizers.extract_marked(object.header(), &mut entries);
        crate::finalize::run_entries(&entries);
    }

    pub fn set_cb_pre_gc(&self, f: PreGcFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.pre_gc.register(f)
            } else {
                cb.pre_gc.deregister(f)
            }
        });
    }

    pub fn set_cb_post_gc(&self, f: PostGcFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.post_gc.register(f)
            } else {
                cb.post_gc.deregister(f)
            }
        });
    }

    pub fn set_cb_root_scanner(&self, f: RootScannerFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.root_scanners.register(f)
            } else {
                cb.root_scanners.deregister(f)
            }
        });
    }

    pub fn set_cb_task_scanner(&self, f: TaskScannerFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.task_scanners.register(f)
            } else {
                cb.task_scanners.deregister(f)
            }
        });
    }

    pub fn set_cb_external_alloc(&self, f: ExternalAllocFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.external_alloc.register(f)
            } else {
                cb.external_alloc.deregister(f)
            }
        });
    }

    pub fn set_cb_external_free(&self, f: ExternalFreeFn, enable: bool) {
        self.collector.with_callbacks(|cb| {
            if enable {
                cb.external_free.register(f)
            } else {
                cb.external_free.deregister(f)
            }
        });
    }

    /// spec.md §6 `perm_alloc(size, zero, align, offset)`.
    pub fn perm_alloc(&self, size: usize, zero: bool, align: usize, offset: usize) -> *mut u8 {
        self.perm.lock().perm_alloc(size, zero, align, offset)
    }

    /// Pushes a new shadow-stack frame for `thread`. Dropping the returned
    /// guard pops it, mirroring the teacher's `letroot!` scoping discipline
    /// for embedders that cannot use the macro directly.
    pub fn push_frame(&self, thread: usize) -> ShadowStackFrameGuard<'_> {
        let stack: *const ShadowStack = {
            let mutators = self.mutators.lock();
            &mutators[thread].shadow_stack
        };
        // Safety: `mutators` only grows (see `attach_mutator`), so the
        // `ShadowStack` this points at outlives the lock guard above.
        ShadowStackFrameGuard {
            entry: unsafe { (*stack).push_frame() },
        }
    }
}

/// RAII guard returned by [`Heap::push_frame`]; dropping it pops the
/// shadow-stack frame.
pub struct ShadowStackFrameGuard<'h> {
    entry: ShadowStackEntry<'h>,
}

impl<'h> ShadowStackFrameGuard<'h> {
    pub fn add(&self, root: UntypedGcRef) {
        self.entry.add(root);
    }
}

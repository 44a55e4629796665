//! Component I: collection driver and heuristics (spec.md §4.I), grounded in
//! the teacher's `minimark.rs` struct shape, `safepoint.rs`'s `GlobalSafepoint`/
//! `Barrier`, `allocation_config.rs`'s growth heuristics, and `global.rs`'s
//! singleton init pattern.
//!
//! Discovering and snapshotting live OS threads is the host runtime's job
//! (spec.md's own non-goal list: "The host runtime's task/thread model...");
//! `collect` takes the thread snapshot as a parameter rather than maintaining
//! a registry itself.

use crate::{
    big_object::BigObjectList,
    callbacks::CallbackLists,
    config::GcConfig,
    finalize::GlobalFinalizerState,
    gcref::UntypedGcRef,
    mark::Marker,
    mutator::{MutatorState, ThreadState},
    page_map::PageMap,
    safepoint::GlobalSafepoint,
    sweep::{self, SweepMode, SweepStats},
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CollectKind {
    Auto,
    Full,
}

/// Process-wide collector state (spec.md §3 "Global state"): the page map,
/// the global `big_objects_marked` survivor list, finalizer bookkeeping,
/// callback registration, tunables and the safepoint barrier.
pub struct Collector {
    pub page_map: PageMap,
    big_objects_marked: Mutex<BigObjectList>,
    pub finalizers: GlobalFinalizerState,
    callbacks: Mutex<CallbackLists>,
    config: Mutex<GcConfig>,
    pub safepoint: GlobalSafepoint,
    enabled: AtomicBool,
    conservative: AtomicBool,
    /// Guards "exactly one collector thread runs at a time" (spec.md §4.I
    /// step 2); the condvar wakes waiters once the active collection ends.
    running: Mutex<bool>,
    running_done: Condvar,
    cycle: AtomicUsize,
    live_bytes: AtomicUsize,
    deferred_alloc: AtomicUsize,
    current_interval: AtomicUsize,
    last_trim_rss: AtomicUsize,
    force_full_pending: AtomicBool,
}

impl Collector {
    pub fn new(config: GcConfig) -> Self {
        let current_interval = config.default_collect_interval;
        Self {
            page_map: PageMap::new(),
            big_objects_marked: Mutex::new(BigObjectList::default()),
            finalizers: GlobalFinalizerState::default(),
            callbacks: Mutex::new(CallbackLists::default()),
            config: Mutex::new(config),
            safepoint: GlobalSafepoint::new(),
            enabled: AtomicBool::new(true),
            conservative: AtomicBool::new(false),
            running: Mutex::new(false),
            running_done: Condvar::new(),
            cycle: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            deferred_alloc: AtomicUsize::new(0),
            current_interval: AtomicUsize::new(current_interval),
            last_trim_rss: AtomicUsize::new(0),
            force_full_pending: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn set_max_memory(&self, bytes: usize) {
        self.config.lock().max_total_memory = bytes;
    }

    pub fn current_interval(&self) -> usize {
        self.current_interval.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Bytes accumulated by mutators that allocated while the collector was
    /// disabled (spec.md §4.I step 1); folded back in by the embedder layer
    /// once GC is re-enabled.
    pub fn deferred_alloc(&self) -> usize {
        self.deferred_alloc.load(Ordering::Relaxed)
    }

    pub fn with_callbacks<R>(&self, f: impl FnOnce(&mut CallbackLists) -> R) -> R {
        f(&mut self.callbacks.lock())
    }

    /// spec.md §6 `enable_conservative_gc_support`: idempotent; forces one
    /// full collection with `mark_reset_age` suppressed (decision #3,
    /// DESIGN.md) to realign age bits before conservative scanning begins.
    pub fn enable_conservative_gc_support(&self, mutators: &mut [&mut MutatorState]) {
        if self.conservative.swap(true, Ordering::AcqRel) {
            return;
        }
        self.collect(CollectKind::Full, mutators, 0);
    }

    pub fn is_conservative(&self) -> bool {
        self.conservative.load(Ordering::Acquire)
    }

    /// spec.md §4.I entry point. `caller` indexes into `mutators` to identify
    /// the calling thread (for the disabled-GC deferred-counter path and the
    /// "is the caller inside a finalizer" check).
    pub fn collect(&self, kind: CollectKind, mutators: &mut [&mut MutatorState], caller: usize) {
        // Step 1: disabled GC defers.
        if !self.is_enabled() {
            let pending = mutators[caller].alloc_counter().max(0) as usize;
            self.deferred_alloc.fetch_add(pending, Ordering::Relaxed);
            return;
        }

        // Step 2: become the sole collector, or wait for the active one.
        {
            let mut running = self.running.lock();
            if *running {
                self.running_done.wait_while(&mut running, |r| *r);
                return;
            }
            *running = true;
        }

        let start = Instant::now();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_cycle(kind, mutators, caller)
        }));

        {
            let mut running = self.running.lock();
            *running = false;
            self.running_done.notify_all();
        }

        match result {
            Ok(summary) => {
                if self.config.lock().verbose {
                    eprintln!(
                        "gc: {:?} cycle {}: {}ms, freed {}/{} bytes, next_interval={}",
                        summary.mode,
                        summary.cycle,
                        start.elapsed().as_millis(),
                        summary.freed_bytes,
                        summary.allocated_bytes,
                        self.current_interval(),
                    );
                }
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn run_cycle(&self, kind: CollectKind, mutators: &mut [&mut MutatorState], caller: usize) -> CycleSummary {
        // Step 3: stop the world.
        std::sync::atomic::fence(Ordering::SeqCst);
        self.safepoint.arm();
        {
            let refs: Vec<&MutatorState> = mutators.iter().map(|m| &**m).collect();
            self.safepoint.wait_until_parked(&refs);
        }

        // Step 4: pre-GC callbacks.
        self.callbacks.lock().run_pre_gc();
        self.callbacks.lock().run_root_scanners();

        let allocated_bytes: i64 = mutators.iter().map(|m| m.alloc_counter() + self.current_interval() as i64).sum();

        let force_full = matches!(kind, CollectKind::Full) || self.force_full_pending.swap(false, Ordering::AcqRel);
        let mode = if force_full { SweepMode::Full } else { SweepMode::Quick };

        // Step 5: mark, then post-mark finalizer logic, then sweep.
        for mutator in mutators.iter_mut() {
            mutator.remset.swap_for_cycle();
        }

        let mut big_objects_marked = self.big_objects_marked.lock();
        self.mark_from_roots(mutators, &mut big_objects_marked);
        self.run_finalizer_pass(mutators, &mut big_objects_marked);

        self.callbacks.lock().run_task_scanners();
        let mut stats = SweepStats::default();
        for mutator in mutators.iter() {
            sweep::sweep_weak_refs(&mutator.weak_refs, &mut stats);
        }
        for mutator in mutators.iter_mut() {
            sweep::sweep_malloc_buffers(&mut mutator.malloc_buffers, &mut stats);
        }
        {
            let callbacks = self.callbacks.lock();
            for mutator in mutators.iter_mut() {
                sweep::sweep_big_objects(&mut mutator.big_objects, &callbacks, mode, &mut stats);
            }
            sweep::sweep_big_objects(&mut big_objects_marked, &callbacks, mode, &mut stats);
        }
        sweep::sweep_pool_pages(mutators, &self.page_map, mode, &mut stats);

        // Open question #1: the collector thread owns the full-sweep merge
        // target for surviving big objects.
        if matches!(mode, SweepMode::Full) {
            sweep::merge_big_objects_marked(&mut big_objects_marked, &mut mutators[caller].big_objects);
        }
        drop(big_objects_marked);

        let freed_bytes = stats.malloc_bytes_freed + stats.big_bytes_freed;
        self.update_counters_and_heuristics(mode, allocated_bytes.max(0) as usize, freed_bytes, mutators.len());
        let next_interval = self.current_interval();
        for mutator in mutators.iter() {
            mutator.reset_alloc_counter(next_interval);
        }

        // Step 7: clear the safepoint, restore thread states, post-GC
        // callbacks, drain `to_finalize` unless the caller is mid-finalizer.
        self.safepoint.disarm();
        for mutator in mutators.iter() {
            mutator.set_state(ThreadState::Unsafe);
        }
        self.callbacks.lock().run_post_gc();
        if !mutators[caller].in_finalizer.get() {
            self.finalizers.run_pending(mutators[caller].is_inhibited());
        }

        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        CycleSummary {
            mode,
            cycle,
            freed_bytes,
            allocated_bytes: allocated_bytes.max(0) as usize,
        }
    }

    /// spec.md §4.F roots: each thread's shadow stack, pending exception (if
    /// any), module bindings, and the frozen `last_remset` from the swap this
    /// cycle performed.
    fn mark_from_roots(&self, mutators: &mut [&mut MutatorState], big_objects_marked: &mut BigObjectList) {
        let root_data: Vec<_> = mutators
            .iter()
            .map(|mutator| {
                (
                    mutator.shadow_stack.roots(),
                    mutator.pending_exception.get(),
                    mutator.rem_bindings.entries.clone(),
                    mutator
                        .weak_refs
                        .iter()
                        .map(|w| w.slot.downcast())
                        .collect::<Vec<_>>(),
                    mutator
                        .remset
                        .last_remset
                        .entries
                        .iter()
                        .map(|header| UntypedGcRef::from_header(*header))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();

        let mut big_lists: Vec<&mut BigObjectList> = mutators.iter_mut().map(|m| &mut m.big_objects).collect();
        let mut marker = Marker::new(&self.page_map, &mut big_lists, big_objects_marked);
        for (shadow_roots, pending_exc, module_bindings, weak_handles, remset_roots) in root_data {
            marker.push_shadow_stack_roots(shadow_roots);
            if let Some(exc) = pending_exc {
                marker.push_exception_stack_roots(vec![exc]);
            }
            marker.push_module_bindings(module_bindings);
            marker.push_weak_handles(weak_handles);
            for root in remset_roots {
                marker.push_root(root);
            }
        }
        marker.run();

        // spec.md §4.F: "finalizer_list_marked is walked and its entries
        // scanned as roots" — the survivors recorded by *previous* cycles,
        // before this cycle's own finalizer sweep runs.
        let previously_marked = self.finalizers.marked_roots();
        if !previously_marked.is_empty() {
            let mut big_lists: Vec<&mut BigObjectList> = mutators.iter_mut().map(|m| &mut m.big_objects).collect();
            let mut marker = Marker::new(&self.page_map, &mut big_lists, big_objects_marked);
            marker.push_finalizer_marked_roots(previously_marked);
            marker.run();
        }
    }

    /// spec.md §4.H post-mark pass: sweep each thread's finalizer list,
    /// migrating entries into the global `to_finalize`/`finalizer_list_marked`
    /// lists, then re-mark the newly migrated survivors with `mark_reset_age`
    /// so the next cycle revisits them (spec.md §4.F: "the bits are forcibly
    /// set to MARKED with the OLD bit cleared").
    fn run_finalizer_pass(&self, mutators: &mut [&mut MutatorState], big_objects_marked: &mut BigObjectList) {
        for mutator in mutators.iter() {
            let mut to_finalize = Vec::new();
            let mut newly_marked = Vec::new();
            mutator.finalizers.sweep_into(&mut to_finalize, &mut newly_marked);
            self.finalizers.merge_sweep_results(to_finalize, newly_marked);
        }
        // Second drain: objects kept alive only by a finalizer this cycle.
        // `marked_roots()` here returns the global list *after* the merge
        // above, so it covers exactly the entries just migrated in plus any
        // that survived from the root-marking-time walk (already marked, so
        // `try_mark_and_enqueue` is a no-op for those and the age-reset is
        // the only effect that matters for freshly migrated ones).
        let mut big_lists: Vec<&mut BigObjectList> = mutators.iter_mut().map(|m| &mut m.big_objects).collect();
        let mut marker = Marker::new(&self.page_map, &mut big_lists, big_objects_marked);
        marker.mark_reset_age = true;
        marker.push_finalizer_marked_roots(self.finalizers.marked_roots());
        marker.run();
    }

    /// spec.md §4.I step 6: interval doubling, remset-driven escalation,
    /// interval capping, memory-target forcing, and RSS-trim triggering.
    fn update_counters_and_heuristics(&self, mode: SweepMode, allocated: usize, freed: usize, threads: usize) {
        let config = *self.config.lock();

        if freed < (allocated * 7) / 10 {
            let doubled = self.current_interval.load(Ordering::Relaxed).saturating_mul(2);
            self.current_interval.store(doubled, Ordering::Relaxed);
        }

        let live = self.live_bytes.load(Ordering::Relaxed);
        let new_live = live.saturating_add(allocated).saturating_sub(freed);
        self.live_bytes.store(new_live, Ordering::Relaxed);

        let capped = config.capped_interval(self.current_interval.load(Ordering::Relaxed), config.max_total_memory, threads);
        self.current_interval.store(capped, Ordering::Relaxed);

        if new_live > config.max_total_memory {
            self.force_full_pending.store(true, Ordering::Relaxed);
        }

        if matches!(mode, SweepMode::Full) {
            let last_trim = self.last_trim_rss.load(Ordering::Relaxed);
            if last_trim == 0 || new_live > last_trim + last_trim / 4 {
                self.last_trim_rss.store(new_live, Ordering::Relaxed);
                trim_host_malloc();
            }
        }
    }

    /// Escalates the next cycle to full (spec.md §4.I step 6 remset clause),
    /// called by the embedder layer once it observes a large aggregate
    /// `remset_nptr` across threads.
    pub fn request_full_next_cycle(&self) {
        self.force_full_pending.store(true, Ordering::Relaxed);
    }
}

struct CycleSummary {
    mode: SweepMode,
    cycle: usize,
    freed_bytes: usize,
    allocated_bytes: usize,
}

#[cfg(target_os = "linux")]
fn trim_host_malloc() {
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(target_os = "linux"))]
fn trim_host_malloc() {}

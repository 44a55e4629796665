//! Global safepoint barrier (spec.md §4.I.3, §5), grounded in the teacher's
//! `safepoint.rs` (`GlobalSafepoint`/`Barrier`), reimplemented on top of
//! `parking_lot`'s `Mutex`/`Condvar` instead of hand-rolled futex code.

use crate::mutator::{MutatorState, ThreadState};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owns the "world is stopping" flag mutators poll, and the wait queue the
/// collector blocks on until every mutator has parked.
#[derive(Default)]
pub struct GlobalSafepoint {
    armed: AtomicBool,
    lock: Mutex<()>,
    parked: Condvar,
    resumed: Condvar,
}

impl GlobalSafepoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// spec.md §5: "The collector publishes 'world is stopping' via release
    /// stores to the safepoint page."
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        let _guard = self.lock.lock();
        self.armed.store(false, Ordering::Release);
        self.resumed.notify_all();
    }

    /// Called by a mutator at an allocation-fast-path or explicit safepoint
    /// check. If the world is stopping, parks until the collector disarms
    /// the safepoint.
    pub fn poll(&self, mutator: &MutatorState) {
        if !self.is_armed() {
            return;
        }
        let previous = mutator.state();
        mutator.set_state(ThreadState::Waiting);
        let mut guard = self.lock.lock();
        self.parked.notify_all();
        while self.is_armed() {
            self.resumed.wait(&mut guard);
        }
        mutator.set_state(previous);
    }

    /// Collector-side: spin/wait until every mutator in `mutators` has
    /// observed the safepoint (spec.md §4.I.3: "spin-wait until every
    /// thread's `gc_state` flag is non-zero").
    pub fn wait_until_parked(&self, mutators: &[&MutatorState]) {
        loop {
            let all_parked = mutators
                .iter()
                .all(|m| matches!(m.state(), ThreadState::Waiting | ThreadState::Safe));
            if all_parked {
                return;
            }
            let mut guard = self.lock.lock();
            // Re-check under the lock to avoid missing a just-parked thread's
            // notification.
            let all_parked = mutators
                .iter()
                .all(|m| matches!(m.state(), ThreadState::Waiting | ThreadState::Safe));
            if all_parked {
                return;
            }
            self.parked.wait(&mut guard);
        }
    }
}

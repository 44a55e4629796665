//! Collector tunables (spec.md §6 "Tunables"), generalizing the teacher's
//! `AllocationConfig` (threshold + large-object threshold + growth knobs)
//! into the full set spec.md names.

use std::mem::size_of;

/// Number of bytes promotion requires an object to survive: spec.md §6 fixes
/// this at 1 (survive exactly one full collection).
pub const PROMOTION_AGE: u8 = 1;

#[derive(Clone, Copy, Debug)]
pub struct GcConfig {
    /// Per-thread allocation counter interval between safepoint-triggering
    /// checks, in bytes. Spec default: ≈5.6M × word on 64-bit, 3.2M × word on
    /// 32-bit.
    pub default_collect_interval: usize,
    /// Upper bound the interval may grow to before being capped.
    pub max_collect_interval: usize,
    /// Soft cap on live bytes; exceeding it forces a full collection.
    pub max_total_memory: usize,
    /// Age (in full collections survived) at which a young object promotes.
    pub promotion_age: u8,
    /// Emit one-line cycle summaries to stderr (teacher's `eprintln!`-based
    /// diagnostic style; see `collector.rs`).
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        let word = size_of::<usize>();
        let is_64 = word == 8;
        Self {
            default_collect_interval: if is_64 { 5_600_000 * word } else { 3_200_000 * word },
            max_collect_interval: if is_64 { 1_250_000_000 } else { 750_000_000 },
            max_total_memory: if is_64 {
                2usize * 1024 * 1024 * 1024 * 1024
            } else {
                2usize * 1024 * 1024 * 1024
            },
            promotion_age: PROMOTION_AGE,
            verbose: false,
        }
    }
}

impl GcConfig {
    /// spec.md §4.I.6: "Cap interval at `max(max_collect_interval, total_mem /
    /// threads / 2)` on 64-bit."
    pub fn capped_interval(&self, proposed: usize, total_mem: usize, threads: usize) -> usize {
        let word = size_of::<usize>();
        if word == 8 {
            let per_thread_cap = total_mem / threads.max(1) / 2;
            proposed.min(self.max_collect_interval.max(per_thread_cap))
        } else {
            proposed.min(self.max_collect_interval)
        }
    }
}

use std::mem::size_of;

use gc_info_table::GCInfo;

pub mod big_object;
pub mod callbacks;
pub mod collector;
pub mod config;
pub mod conservative;
pub mod embedder;
pub mod error;
pub mod finalize;
pub mod gc_info_table;
pub mod gcref;
pub mod header;
pub mod internal;
pub mod malloc_buffer;
pub mod mark;
pub mod mmap;
pub mod mutator;
pub mod page_map;
pub mod perm;
pub mod pool;
pub mod safepoint;
pub mod shadow_stack;
pub mod sweep;
pub mod util;
pub mod visitor;
pub mod write_barrier;

pub use collector::CollectKind;
pub use config::GcConfig;
pub use embedder::Heap;

pub struct GCPlatform;

impl GCPlatform {
    /// Process-wide one-time init: brings up the type-descriptor table that
    /// every `Heap` on this process shares (spec.md §3's global state is
    /// per-`Heap`; the descriptor table is the one thing that really is
    /// process-global, matching the teacher's own singleton `GC_TABLE`).
    pub fn initialize() {
        #[cfg(target_family = "wasm")]
        {
            panic!("Invoke GCPlatform::initialize_wasm on WASM!");
        }
        unsafe {
            gc_info_table::GCInfoTable::init(None);
        }
    }

    pub unsafe fn initialize_wasm(
        gc_info_table_mem: &'static mut [u8; size_of::<GCInfo>() * (1 << 14)],
    ) {
        gc_info_table::GCInfoTable::init(Some(gc_info_table_mem));
    }
}

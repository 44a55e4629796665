//! §6 permanent allocation region: a bump arena for small long-lived host
//! allocations that the collector never scans or reclaims. Grounded in the
//! teacher's `mmap.rs` page-granular mapping for the chunked bump path and
//! `large_space.rs`'s direct-host-allocation shape for the oversized
//! fallback.

use crate::{error::oom_abort, mmap::Mmap};
use std::alloc::Layout;

const CHUNK_SIZE: usize = 2 * 1024 * 1024;
const LARGE_CUTOFF: usize = 20 * 1024;

struct Chunk {
    _mapping: Mmap,
    cursor: usize,
    limit: usize,
}

impl Chunk {
    fn new() -> Self {
        let mapping = Mmap::new(CHUNK_SIZE);
        let base = mapping.start() as usize;
        Self {
            cursor: base,
            limit: base + CHUNK_SIZE,
            _mapping: mapping,
        }
    }
}

/// spec.md §6 `perm_alloc`: never reclaimed, so there is no free path here
/// at all, only bump-allocation and chunk growth.
#[derive(Default)]
pub struct PermSpace {
    chunks: Vec<Chunk>,
    /// Requests at or above `LARGE_CUTOFF` skip the bump arena and go
    /// straight to the host allocator; tracked here only so the allocation
    /// is never dropped for the life of the process.
    large: Vec<(*mut u8, Layout)>,
}

unsafe impl Send for PermSpace {}

impl PermSpace {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            large: Vec::new(),
        }
    }

    /// `offset` lets the caller carve a sub-block out of a larger aligned
    /// structure: the resolver finds a base `b` such that `(b + offset) %
    /// align == 0`, rather than `b % align == 0`.
    pub fn perm_alloc(&mut self, size: usize, zero: bool, align: usize, offset: usize) -> *mut u8 {
        if size >= LARGE_CUTOFF {
            return self.alloc_large(size, zero, align, offset);
        }
        if self.chunks.is_empty() {
            self.chunks.push(Chunk::new());
        }
        loop {
            let chunk = self.chunks.last_mut().expect("just ensured non-empty");
            let aligned = align_with_offset(chunk.cursor, align, offset);
            if aligned + size <= chunk.limit {
                chunk.cursor = aligned + size;
                let ptr = aligned as *mut u8;
                if zero {
                    unsafe { std::ptr::write_bytes(ptr, 0, size) };
                }
                return ptr;
            }
            self.chunks.push(Chunk::new());
        }
    }

    fn alloc_large(&mut self, size: usize, zero: bool, align: usize, offset: usize) -> *mut u8 {
        let align = align.max(1);
        // Over-allocate by `align` so an offset-aligned base can always be
        // carved out of the raw allocation.
        let layout = Layout::from_size_align(size + align, align).expect("perm large layout");
        let raw = unsafe {
            if zero {
                std::alloc::alloc_zeroed(layout)
            } else {
                std::alloc::alloc(layout)
            }
        };
        if raw.is_null() {
            oom_abort("perm_alloc", size);
        }
        let ptr = align_with_offset(raw as usize, align, offset) as *mut u8;
        self.large.push((raw, layout));
        ptr
    }
}

fn align_with_offset(addr: usize, align: usize, offset: usize) -> usize {
    if align <= 1 {
        return addr;
    }
    let want = (align - offset % align) % align;
    let rem = addr % align;
    if rem <= want {
        addr + (want - rem)
    } else {
        addr + (align - rem) + want
    }
}

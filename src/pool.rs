//! Component B: size-classed pool allocator (spec.md §4.B), grounded in the
//! teacher's `segregated_space/{page.rs,free_list.rs,size_class.rs}` size
//! progression and free-list-through-first-word trick.

use crate::{
    error::oom_abort,
    header::{GcBits, HeapObjectHeader},
    internal::gc_info::GCInfoIndex,
    mmap::Mmap,
    page_map::{PageMap, PageMeta, PAGE_SIZE},
    util::align_up,
};
use std::{mem::size_of, ptr::NonNull};

/// Size classes in bytes, including the header. Geometric-ish progression
/// matching the teacher's `size_classes()` generator in spirit (small steps
/// at the bottom, wider steps higher up).
pub const SIZE_CLASSES: &[usize] = &[
    16, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096,
];

/// Above this, `pool_alloc` is not applicable; use `big_object::big_alloc`
/// instead (spec.md §4.C: "Allocations above the largest pool class").
pub const LARGE_CUTOFF: usize = SIZE_CLASSES[SIZE_CLASSES.len() - 1];

pub fn size_class_index(total_size: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&c| c >= total_size)
}

/// One mmap-backed pool page plus the oversized mapping that backs it (kept
/// alive only to hand back to the OS on release).
pub struct Page {
    pub meta_key: usize,
    mapping: Mmap,
    pub next: Option<Box<Page>>,
    bump_cursor: usize,
    bump_limit: usize,
}

impl Page {
    fn acquire(size_class: u8, cell_size: usize, owner: usize, page_map: &PageMap) -> Box<Page> {
        let mapping = Mmap::new(PAGE_SIZE * 2);
        let base = mapping.aligned_to(PAGE_SIZE) as usize;
        let cell_count = ((PAGE_SIZE) / cell_size) as u32;
        let meta = Box::new(PageMeta::new(base, size_class, cell_size, cell_count, owner));
        page_map.register(meta);
        Box::new(Page {
            meta_key: base,
            mapping,
            next: None,
            bump_cursor: base,
            bump_limit: base + cell_count as usize * cell_size,
        })
    }

    fn bump_alloc(&mut self, cell_size: usize) -> Option<NonNull<u8>> {
        if self.bump_cursor + cell_size > self.bump_limit {
            return None;
        }
        let ptr = self.bump_cursor;
        self.bump_cursor += cell_size;
        Some(unsafe { NonNull::new_unchecked(ptr as *mut u8) })
    }
}

/// Per-mutator, per-size-class allocation state (spec.md §3 "owned pool
/// freelists per size class; list of newly allocated pages").
#[derive(Default)]
struct SizeClassState {
    /// Head of the singly-linked freelist, threaded through the first word
    /// of each free cell (spec.md §4.B invariant: "a page's freelist is
    /// singly linked through the first word of each free cell").
    freelist: Option<NonNull<u8>>,
    newpages: Option<Box<Page>>,
}

pub struct PoolAllocator {
    owner: usize,
    classes: Vec<SizeClassState>,
}

impl PoolAllocator {
    pub fn new(owner: usize) -> Self {
        Self {
            owner,
            classes: (0..SIZE_CLASSES.len()).map(|_| SizeClassState::default()).collect(),
        }
    }

    /// spec.md §4.B `pool_alloc(thread, size_class_index, cell_size) -> cell`.
    /// Returns a cell whose header has already been initialized to `CLEAN`
    /// with the given type index.
    pub fn pool_alloc(
        &mut self,
        page_map: &PageMap,
        size_class_index: usize,
        type_index: GCInfoIndex,
    ) -> NonNull<HeapObjectHeader> {
        let cell_size = SIZE_CLASSES[size_class_index];
        let state = &mut self.classes[size_class_index];

        // Fast path: pop the freelist head.
        if let Some(head) = state.freelist {
            let next = unsafe { *(head.as_ptr() as *const usize) };
            state.freelist = NonNull::new(next as *mut u8);
            let popped_page_base = head.as_ptr() as usize & !(PAGE_SIZE - 1);
            // spec.md §4.B step 2: "If the popped cell resides on a
            // different page than the next cell, update the just-emptied
            // page's metadata (nfree=0, has_young=1)."
            let different_page = state
                .freelist
                .map(|n| !same_page(n.as_ptr() as usize, head.as_ptr() as usize))
                .unwrap_or(true);
            page_map.with_page(popped_page_base, |meta| {
                if different_page {
                    meta.nfree = 0;
                    meta.has_young = true;
                } else {
                    meta.nfree = meta.nfree.saturating_sub(1);
                }
            });
            return init_cell(head.cast(), type_index);
        }

        // Bump-allocate from the current newpages head; chain/replace as it
        // exhausts (spec.md §4.B step 3).
        loop {
            if let Some(page) = state.newpages.as_mut() {
                if let Some(ptr) = page.bump_alloc(cell_size) {
                    let frontier = (page.bump_cursor - page.meta_key) as u32;
                    page_map.with_page(page.meta_key, |meta| meta.bump_frontier = frontier);
                    return init_cell(ptr, type_index);
                }
                // Exhausted: drop to the next chained page, if any.
                let exhausted = state.newpages.take().unwrap();
                state.newpages = exhausted.next;
                continue;
            }
            // No page available: allocate a fresh one from the page map.
            let mut page = Page::acquire(size_class_index as u8, cell_size, self.owner, page_map);
            page.next = None;
            state.newpages = Some(page);
        }
    }

    /// Returns an emptied page to this size class's free pool (used by
    /// sweep, spec.md §4.G: "return the page to the size class's newpages").
    pub fn return_page(&mut self, size_class_index: usize, mut page: Box<Page>) {
        page.next = self.classes[size_class_index].newpages.take();
        self.classes[size_class_index].newpages = Some(page);
    }

    pub fn push_free_cell(&mut self, page_map: &PageMap, size_class_index: usize, cell: NonNull<u8>) {
        let state = &mut self.classes[size_class_index];
        unsafe {
            *(cell.as_ptr() as *mut usize) = state
                .freelist
                .map(|p| p.as_ptr() as usize)
                .unwrap_or(0);
        }
        state.freelist = Some(cell);
        let page_base = cell.as_ptr() as usize & !(PAGE_SIZE - 1);
        page_map.with_page(page_base, |meta| meta.uses_freelist = true);
    }

    /// Walks a size class's freelist chain looking for `addr` (spec.md §6
    /// conservative resolver, freelist-page case). O(freelist length); only
    /// called from conservative scanning, never from the allocation fast
    /// path.
    pub fn is_on_freelist(&self, size_class_index: usize, addr: usize) -> bool {
        let mut cur = self.classes[size_class_index].freelist;
        while let Some(node) = cur {
            if node.as_ptr() as usize == addr {
                return true;
            }
            cur = NonNull::new(unsafe { *(node.as_ptr() as *const usize) } as *mut u8);
        }
        false
    }
}

fn same_page(a: usize, b: usize) -> bool {
    a & !(PAGE_SIZE - 1) == b & !(PAGE_SIZE - 1)
}

fn init_cell(ptr: NonNull<u8>, type_index: GCInfoIndex) -> NonNull<HeapObjectHeader> {
    if ptr.as_ptr().is_null() {
        oom_abort("pool_alloc", size_of::<HeapObjectHeader>());
    }
    unsafe {
        let header = ptr.cast::<HeapObjectHeader>();
        header.as_ptr().write(HeapObjectHeader::new(type_index));
        debug_assert_eq!(header.as_ref().bits(), GcBits::Clean);
        header
    }
}

/// `size_class_cell_size` rounded up from a requested payload size, including
/// header overhead.
pub fn cell_size_for(payload_size: usize) -> usize {
    align_up(payload_size + size_of::<HeapObjectHeader>(), size_of::<usize>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes_cover_small_requests() {
        assert_eq!(size_class_index(1), Some(0));
        assert_eq!(size_class_index(16), Some(0));
        assert_eq!(size_class_index(17), Some(1));
        assert_eq!(size_class_index(LARGE_CUTOFF), Some(SIZE_CLASSES.len() - 1));
        assert_eq!(size_class_index(LARGE_CUTOFF + 1), None);
    }
}

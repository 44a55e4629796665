//! Component A: two-level radix map from a page address to its metadata,
//! grounded in the teacher's `segregated_space/size_class.rs` size-class
//! arithmetic and `mmap.rs` for page-granular mapping. spec.md §4.A:
//! "Each level holds a 32-bit allocation bitmap per 32-page chunk;
//! find-first-set accelerates sweep."

use parking_lot::Mutex;
use std::collections::HashMap;

/// Fixed pool page size. spec.md leaves the exact size to the implementation
/// ("Page: a fixed aligned region (implementation defines the size)").
pub const PAGE_SIZE: usize = 16 * 1024;
pub const PAGE_SHIFT: u32 = 14;

/// Number of pages covered by one allocation-bitmap chunk (spec.md §4.A).
pub const CHUNK_PAGES: usize = 32;

/// Per-page metadata (spec.md §3 "Pool page").
pub struct PageMeta {
    pub size_class: u8,
    /// Opaque id of the owning mutator (see `mutator::MutatorState::id`).
    pub owner: usize,
    pub fl_begin_offset: u32,
    pub fl_end_offset: u32,
    pub nfree: u32,
    pub has_marked: bool,
    pub has_young: bool,
    /// One bit per cell: set once a surviving cell has been seen by a full
    /// sweep, making it eligible for promotion next cycle.
    pub age_bitmap: Vec<u64>,
    /// Old-object count observed at the *previous* full sweep; compared
    /// against `nold` by the quick-sweep page-skip heuristic (spec.md §4.G,
    /// §9 open question #2).
    pub prev_nold: u32,
    pub nold: u32,
    pub base: usize,
    pub cell_size: usize,
    pub cell_count: u32,
    /// Set the first time a cell on this page is swept back onto a freelist;
    /// until then the page is still being bump-allocated and `bump_frontier`
    /// is the authoritative live/dead boundary (see `conservative.rs`).
    pub uses_freelist: bool,
    /// Byte offset from `base` of the first cell not yet handed out by
    /// `pool_alloc`'s bump path. Meaningless once `uses_freelist` is set.
    pub bump_frontier: u32,
}

impl PageMeta {
    pub fn new(base: usize, size_class: u8, cell_size: usize, cell_count: u32, owner: usize) -> Self {
        let words = (cell_count as usize + 63) / 64;
        Self {
            size_class,
            owner,
            fl_begin_offset: 0,
            fl_end_offset: 0,
            nfree: cell_count,
            has_marked: false,
            has_young: false,
            age_bitmap: vec![0u64; words],
            prev_nold: 0,
            nold: 0,
            base,
            cell_size,
            cell_count,
            uses_freelist: false,
            bump_frontier: 0,
        }
    }

    #[inline]
    pub fn cell_index(&self, addr: usize) -> u32 {
        ((addr - self.base) / self.cell_size) as u32
    }

    #[inline]
    pub fn is_aged(&self, index: u32) -> bool {
        self.age_bitmap[index as usize / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    pub fn set_aged(&mut self, index: u32) {
        self.age_bitmap[index as usize / 64] |= 1 << (index % 64);
    }

    #[inline]
    pub fn clear_aged(&mut self, index: u32) {
        self.age_bitmap[index as usize / 64] &= !(1 << (index % 64));
    }
}

/// Address -> page metadata map, with a chunk-level allocation bitmap so
/// sweep can skip entirely-empty regions via find-first-set instead of
/// walking every possible page address.
pub struct PageMap {
    pages: Mutex<HashMap<usize, Box<PageMeta>>>,
    chunk_bitmap: Mutex<HashMap<usize, u32>>,
}

impl PageMap {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            chunk_bitmap: Mutex::new(HashMap::new()),
        }
    }

    fn chunk_of(page_base: usize) -> (usize, u32) {
        let page_index = page_base >> PAGE_SHIFT;
        (page_index / CHUNK_PAGES, (page_index % CHUNK_PAGES) as u32)
    }

    /// Registers a freshly-acquired page (spec.md §4.A: "The allocator marks
    /// the bitmap on page acquisition").
    pub fn register(&self, meta: Box<PageMeta>) {
        let page_base = meta.base;
        let (chunk, bit) = Self::chunk_of(page_base);
        self.pages.lock().insert(page_base, meta);
        *self.chunk_bitmap.lock().entry(chunk).or_insert(0) |= 1 << bit;
    }

    /// Unregisters and returns a page's metadata (spec.md §4.A: "the sweep
    /// clears bits when a level subtree contains no allocated pages").
    pub fn unregister(&self, page_base: usize) -> Option<Box<PageMeta>> {
        let removed = self.pages.lock().remove(&page_base);
        if removed.is_some() {
            let (chunk, bit) = Self::chunk_of(page_base);
            let mut bitmap = self.chunk_bitmap.lock();
            if let Some(word) = bitmap.get_mut(&chunk) {
                *word &= !(1 << bit);
                if *word == 0 {
                    bitmap.remove(&chunk);
                }
            }
        }
        removed
    }

    /// Looks up the page metadata that owns `addr`, or `None` if `addr` is
    /// not in any registered page (spec.md §4.A lookup contract).
    pub fn lookup(&self, addr: usize) -> Option<usize> {
        let page_base = addr & !(PAGE_SIZE - 1);
        self.pages.lock().contains_key(&page_base).then_some(page_base)
    }

    pub fn with_page<R>(&self, page_base: usize, f: impl FnOnce(&mut PageMeta) -> R) -> Option<R> {
        self.pages.lock().get_mut(&page_base).map(|meta| f(meta))
    }

    /// Every registered page base, grouped by chunk via find-first-set so
    /// sweep never inspects empty chunks.
    pub fn all_page_bases(&self) -> Vec<usize> {
        let bitmap = self.chunk_bitmap.lock();
        let mut out = Vec::new();
        for (&chunk, &bits) in bitmap.iter() {
            let mut remaining = bits;
            while remaining != 0 {
                let bit = remaining.trailing_zeros();
                let page_index = chunk * CHUNK_PAGES + bit as usize;
                out.push(page_index << PAGE_SHIFT);
                remaining &= remaining - 1;
            }
        }
        out
    }
}

impl Default for PageMap {
    fn default() -> Self {
        Self::new()
    }
}

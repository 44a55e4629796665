//! Component C: big-object allocator for allocations above the largest pool
//! size class (spec.md §4.C), grounded in the teacher's `large_space.rs`
//! `PreciseAllocation` (doubly-linked, cache-line aligned, host-allocated).

use crate::{
    callbacks::CallbackLists,
    error::oom_abort,
    header::{GcBits, HeapObjectHeader},
    internal::gc_info::GCInfoIndex,
    util::align_up,
};
use std::{alloc::Layout, ptr::NonNull};

pub const ALIGNMENT: usize = 16;

/// Header prepended to every big-object allocation. Reuses the same 2-bit
/// `HeapObjectHeader` tag scheme as pool cells (spec.md §3: "Big-object
/// record: Header containing size, age counter ... GC bits, and doubly
/// linked list pointers").
#[repr(C)]
pub struct BigObjectHeader {
    pub gc: HeapObjectHeader,
    pub size: usize,
    /// Saturating age counter; promotion threshold is `config::PROMOTION_AGE`.
    pub age: u8,
    /// Id of the mutator whose list this node lives on; lets the mark loop
    /// find the right per-thread list to unlink a promoted survivor from.
    pub owner: usize,
    pub prev: Option<NonNull<BigObjectHeader>>,
    pub next: Option<NonNull<BigObjectHeader>>,
}

impl BigObjectHeader {
    pub fn payload(&self) -> *mut u8 {
        unsafe { (self as *const Self as *mut u8).add(std::mem::size_of::<Self>()) }
    }

    fn layout(size: usize) -> Layout {
        let total = align_up(size + std::mem::size_of::<BigObjectHeader>(), ALIGNMENT);
        Layout::from_size_align(total, ALIGNMENT).expect("big object layout")
    }
}

/// Per-thread doubly-linked list of big objects (spec.md §3: "Big objects
/// live on per-thread lists during the cycle").
#[derive(Default)]
pub struct BigObjectList {
    pub head: Option<NonNull<BigObjectHeader>>,
    pub len: usize,
}

impl BigObjectList {
    pub fn push_front(&mut self, mut node: NonNull<BigObjectHeader>) {
        unsafe {
            node.as_mut().prev = None;
            node.as_mut().next = self.head;
            if let Some(mut head) = self.head {
                head.as_mut().prev = Some(node);
            }
        }
        self.head = Some(node);
        self.len += 1;
    }

    pub fn unlink(&mut self, mut node: NonNull<BigObjectHeader>) {
        unsafe {
            let prev = node.as_ref().prev;
            let next = node.as_ref().next;
            match prev {
                Some(mut p) => p.as_mut().next = next,
                None => self.head = next,
            }
            if let Some(mut n) = next {
                n.as_mut().prev = prev;
            }
            node.as_mut().prev = None;
            node.as_mut().next = None;
        }
        self.len -= 1;
    }

    /// Drains every node out of `self` and appends them to `other`, used to
    /// merge the global `big_objects_marked` survivor list into a thread's
    /// list at the end of a full sweep (spec.md §4.G, open question #1).
    pub fn append(&mut self, other: &mut BigObjectList) {
        while let Some(node) = self.head {
            self.unlink(node);
            other.push_front(node);
        }
    }

    pub fn iter(&self) -> BigObjectIter {
        BigObjectIter { next: self.head }
    }
}

pub struct BigObjectIter {
    next: Option<NonNull<BigObjectHeader>>,
}

impl Iterator for BigObjectIter {
    type Item = NonNull<BigObjectHeader>;
    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.next = unsafe { cur.as_ref().next };
        Some(cur)
    }
}

/// spec.md §4.C: allocate, write the header, link into `list`, and notify
/// the external-alloc callback.
pub fn big_alloc(
    list: &mut BigObjectList,
    owner: usize,
    callbacks: &CallbackLists,
    size: usize,
    type_index: GCInfoIndex,
) -> NonNull<BigObjectHeader> {
    let layout = BigObjectHeader::layout(size);
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        oom_abort("big_alloc", size);
    }
    let header = unsafe { NonNull::new_unchecked(ptr as *mut BigObjectHeader) };
    unsafe {
        header.as_ptr().write(BigObjectHeader {
            gc: HeapObjectHeader::new(type_index),
            size,
            age: 0,
            owner,
            prev: None,
            next: None,
        });
        debug_assert_eq!(header.as_ref().gc.bits(), GcBits::Clean);
    }
    list.push_front(header);
    callbacks.notify_external_alloc(size);
    header
}

/// spec.md §4.C / §4.G: free a big object's backing storage and notify the
/// external-free callback.
pub unsafe fn big_free(callbacks: &CallbackLists, node: NonNull<BigObjectHeader>) {
    let size = node.as_ref().size;
    callbacks.notify_external_free(size);
    let layout = BigObjectHeader::layout(size);
    std::alloc::dealloc(node.as_ptr() as *mut u8, layout);
}

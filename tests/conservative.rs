//! Conservative interior-pointer resolution, exercised through the public
//! `Heap` facade.

use genmark::internal::{finalize_trait::FinalizeTrait, trace_trait::TraceTrait};
use genmark::visitor::Visitor;
use genmark::{CollectKind, GcConfig, GCPlatform, Heap};
use std::sync::Once;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| GCPlatform::initialize());
}

struct Blob {
    a: u64,
    b: u64,
}

impl FinalizeTrait<Blob> for Blob {}
impl TraceTrait for Blob {
    fn trace(&self, _vis: &mut Visitor) {}
}

#[test]
fn interior_pointer_resolves_to_cell_base() {
    setup();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();
    heap.enable_conservative_gc_support();
    let frame = heap.push_frame(thread);

    let mut obj = heap.alloc::<Blob>(thread).expect("alloc");
    obj.a = 1;
    obj.b = 2;
    frame.add(obj.downcast());

    let base = obj.downcast().header().as_ptr() as usize;
    let payload = obj.downcast().get() as usize;
    // A few bytes into the payload, still inside the same cell.
    let interior = payload + 4;

    assert_eq!(heap.internal_obj_base_ptr(interior), Some(base));
}

#[test]
fn unmapped_address_does_not_resolve() {
    setup();
    let heap = Heap::new(GcConfig::default());
    let _thread = heap.attach_mutator();
    heap.enable_conservative_gc_support();

    assert_eq!(heap.internal_obj_base_ptr(0x1), None);
}

#[test]
fn freed_cell_does_not_resolve_after_collection() {
    setup();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();
    heap.enable_conservative_gc_support();

    let obj = heap.alloc::<Blob>(thread).expect("alloc");
    let ptr = obj.downcast().get() as usize;
    drop(obj);

    // Unrooted: the next full collection sweeps the cell onto its size
    // class's freelist.
    heap.collect(CollectKind::Full, thread);

    assert_eq!(heap.internal_obj_base_ptr(ptr), None);
}

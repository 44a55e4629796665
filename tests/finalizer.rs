//! Finalizer registration, explicit `finalize()`, and sweep-triggered
//! automatic finalization, exercised through the public `Heap` facade.

use genmark::internal::{finalize_trait::FinalizeTrait, trace_trait::TraceTrait};
use genmark::visitor::Visitor;
use genmark::{CollectKind, GcConfig, GCPlatform, Heap};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| GCPlatform::initialize());
}

static LOG: Mutex<Vec<u32>> = Mutex::new(Vec::new());

struct FNode {
    tag: u32,
}

impl FinalizeTrait<FNode> for FNode {}
impl TraceTrait for FNode {
    fn trace(&self, _vis: &mut Visitor) {}
}

extern "C" fn record_finalizer(payload: *mut u8) {
    let node = unsafe { &*(payload as *const FNode) };
    LOG.lock().unwrap().push(node.tag);
}

fn new_fnode(heap: &Heap, thread: usize, tag: u32) -> genmark::gcref::GcRef<FNode> {
    let mut node = heap.alloc::<FNode>(thread).expect("alloc");
    node.tag = tag;
    node
}

#[test]
fn finalizers_run_in_reverse_insertion_order_on_collection() {
    setup();
    LOG.lock().unwrap().clear();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();

    for tag in [1u32, 2, 3] {
        let node = new_fnode(&heap, thread, tag);
        heap.add_ptr_finalizer(thread, node.downcast(), record_finalizer);
        // no root: each node becomes unreachable as soon as this loop
        // iteration's binding goes out of scope.
    }

    heap.collect(CollectKind::Full, thread);

    assert_eq!(*LOG.lock().unwrap(), vec![3, 2, 1]);
}

#[test]
fn explicit_finalize_runs_immediately_and_only_once() {
    setup();
    LOG.lock().unwrap().clear();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();
    let frame = heap.push_frame(thread);

    let node = new_fnode(&heap, thread, 99);
    frame.add(node.downcast());
    heap.add_ptr_finalizer(thread, node.downcast(), record_finalizer);

    heap.finalize(thread, node.downcast());
    assert_eq!(*LOG.lock().unwrap(), vec![99]);

    // A subsequent collection must not re-run the already-extracted entry,
    // even though `node` is still rooted and therefore still alive.
    heap.collect(CollectKind::Full, thread);
    assert_eq!(*LOG.lock().unwrap(), vec![99]);
}

#[test]
fn rooted_object_with_finalizer_survives_and_does_not_finalize() {
    setup();
    LOG.lock().unwrap().clear();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();
    let frame = heap.push_frame(thread);

    let node = new_fnode(&heap, thread, 7);
    frame.add(node.downcast());
    heap.add_ptr_finalizer(thread, node.downcast(), record_finalizer);

    heap.collect(CollectKind::Full, thread);

    assert!(LOG.lock().unwrap().is_empty());
    assert_eq!(node.tag, 7);
}

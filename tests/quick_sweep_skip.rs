//! Property coverage for repeated quick sweeps interleaved with occasional
//! full collections: a rooted chain must stay intact and the heap must keep
//! handing out usable memory across many `Auto` cycles, not just a single
//! `Full` one.

use genmark::gcref::GcRef;
use genmark::internal::{finalize_trait::FinalizeTrait, trace_trait::TraceTrait};
use genmark::visitor::Visitor;
use genmark::{CollectKind, GcConfig, GCPlatform, Heap};
use std::cell::Cell;
use std::sync::Once;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| GCPlatform::initialize());
}

struct Link {
    tag: u32,
    next: Cell<Option<GcRef<Link>>>,
}

impl FinalizeTrait<Link> for Link {}
impl TraceTrait for Link {
    fn trace(&self, vis: &mut Visitor) {
        if let Some(next) = self.next.get() {
            vis.trace_gcref(next);
        }
    }
}

fn new_link(heap: &Heap, thread: usize, tag: u32) -> GcRef<Link> {
    let mut node = heap.alloc::<Link>(thread).expect("alloc");
    node.tag = tag;
    node.next.set(None);
    node
}

#[test]
fn rooted_chain_survives_a_thousand_mixed_auto_cycles() {
    setup();
    let heap = Heap::new(GcConfig::default());
    let thread = heap.attach_mutator();
    let frame = heap.push_frame(thread);

    let head = new_link(&heap, thread, 0);
    frame.add(head.downcast());
    let mut tail = head;

    for i in 1..1000u32 {
        let node = new_link(&heap, thread, i);
        tail.next.set(Some(node));
        tail = node;

        // garbage that nothing roots, churned every iteration
        let _garbage = new_link(&heap, thread, u32::MAX);

        if i % 7 == 0 {
            heap.collect(CollectKind::Full, thread);
        } else {
            heap.collect(CollectKind::Auto, thread);
        }
    }

    let mut cursor = Some(head);
    let mut count = 0u32;
    let mut expected_tag = 0u32;
    while let Some(node) = cursor {
        assert_eq!(node.tag, expected_tag);
        expected_tag += 1;
        count += 1;
        cursor = node.next.get();
    }
    assert_eq!(count, 1000);
}

//! Allocation and collection throughput, replacing the teacher's
//! `binary_trees` benchmark with one driven through the `Heap` facade
//! (`MiniMarkGC`/`comet_tree` do not exist in this crate).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
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

struct TreeNode {
    depth: u32,
    left: Cell<Option<GcRef<TreeNode>>>,
    right: Cell<Option<GcRef<TreeNode>>>,
}

impl FinalizeTrait<TreeNode> for TreeNode {}
impl TraceTrait for TreeNode {
    fn trace(&self, vis: &mut Visitor) {
        if let Some(left) = self.left.get() {
            vis.trace_gcref(left);
        }
        if let Some(right) = self.right.get() {
            vis.trace_gcref(right);
        }
    }
}

fn build_tree(heap: &Heap, thread: usize, depth: u32) -> GcRef<TreeNode> {
    let mut node = heap.alloc::<TreeNode>(thread).expect("alloc");
    node.depth = depth;
    if depth == 0 {
        node.left.set(None);
        node.right.set(None);
    } else {
        let left = build_tree(heap, thread, depth - 1);
        let right = build_tree(heap, thread, depth - 1);
        node.left.set(Some(left));
        node.right.set(Some(right));
    }
    node
}

fn bench_allocation(c: &mut Criterion) {
    setup();

    c.bench_function("alloc_small_cells", |b| {
        let heap = Heap::new(GcConfig::default());
        let thread = heap.attach_mutator();
        b.iter(|| {
            let node = heap.alloc::<TreeNode>(thread).expect("alloc");
            black_box(node.depth);
        });
    });

    c.bench_function("build_and_collect_depth_12_tree", |b| {
        let heap = Heap::new(GcConfig::default());
        let thread = heap.attach_mutator();
        b.iter(|| {
            let frame = heap.push_frame(thread);
            let root = build_tree(&heap, thread, 12);
            frame.add(root.downcast());
            heap.collect(CollectKind::Full, thread);
            black_box(root.depth);
        });
    });

    c.bench_function("thousand_quick_collects", |b| {
        let heap = Heap::new(GcConfig::default());
        let thread = heap.attach_mutator();
        let frame = heap.push_frame(thread);
        let root = build_tree(&heap, thread, 8);
        frame.add(root.downcast());
        b.iter(|| {
            for _ in 0..1000 {
                heap.collect(CollectKind::Auto, thread);
            }
        });
    });
}

criterion_group!(benches, bench_allocation);
criterion_main!(benches);

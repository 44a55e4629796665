//! On-stack root tracking, grounded in the teacher's `api.rs` shadow-stack
//! design (`ShadowStack`/`Rooted`/`letroot!`), adapted to feed spec.md §4.F's
//! `stack` mark frame kind ("Task shadow stack frame").

use crate::{gcref::UntypedGcRef, internal::trace_trait::TraceTrait};
use std::cell::RefCell;

/// A mutator's shadow stack: a stack of frames, each a small vector of
/// roots. Mirrors spec.md §4.F's `stack` frame kind, which the mark loop
/// walks as one of its initial root sources.
#[derive(Default)]
pub struct ShadowStack {
    frames: RefCell<Vec<Vec<UntypedGcRef>>>,
}

/// One entry on a mutator's shadow stack: a stack-discipline-scoped slot
/// holding zero or more managed references, registered for the duration of
/// the enclosing Rust scope.
pub struct ShadowStackEntry<'a> {
    stack: &'a ShadowStack,
}

impl<'a> Drop for ShadowStackEntry<'a> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().pop();
    }
}

impl<'a> ShadowStackEntry<'a> {
    pub fn add(&self, root: UntypedGcRef) {
        self.stack
            .frames
            .borrow_mut()
            .last_mut()
            .expect("frame pushed")
            .push(root);
    }
}

impl ShadowStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&self) -> ShadowStackEntry<'_> {
        self.frames.borrow_mut().push(Vec::new());
        ShadowStackEntry { stack: self }
    }

    /// Flattens every live frame's roots for the mark loop to enqueue.
    pub fn roots(&self) -> Vec<UntypedGcRef> {
        self.frames.borrow().iter().flatten().copied().collect()
    }
}

/// Registers `$val` (an [`UntypedGcRef`]) as a shadow-stack root for the
/// rest of the enclosing scope, mirroring the teacher's `letroot!` macro.
#[macro_export]
macro_rules! letroot {
    ($name:ident, $stack:expr, $val:expr) => {
        let __frame = $stack.push_frame();
        let $name = $val;
        __frame.add($name);
    };
}

pub trait Rootable: TraceTrait {}
impl<T: TraceTrait> Rootable for T {}

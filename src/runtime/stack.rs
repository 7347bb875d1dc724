//! The per-thread stack of running computations.
//!
//! Only the top frame is consulted when a read is tracked. A `None` frame
//! suspends tracking for everything that runs above it.

use crate::effect::Computation;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE_STACK: RefCell<Vec<Option<Computation>>> = const { RefCell::new(Vec::new()) };
}

/// Scoped stack frame. Pushed on creation, popped on drop, including
/// during unwinding.
pub(crate) struct StackGuard {
    depth: usize,
    // Frames belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl StackGuard {
    pub(crate) fn push(frame: Option<Computation>) -> Self {
        let depth = ACTIVE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(frame);
            stack.len()
        });
        Self {
            depth,
            _not_send: PhantomData,
        }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        ACTIVE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "active stack popped out of order");
            stack.pop();
        });
    }
}

/// The computation on top of this thread's stack, if tracking is active.
pub(crate) fn top() -> Option<Computation> {
    ACTIVE_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

pub(crate) fn depth() -> usize {
    ACTIVE_STACK.with(|stack| stack.borrow().len())
}

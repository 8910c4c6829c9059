//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a node is read, the
//! runtime records an edge from the computation on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering a computation pushes its
//! node id; [`untrack`] pushes an empty frame so reads inside it record
//! nothing. The guard pops its frame when dropped, even if the computation
//! panics.
//!
//! Protocol checks (no writes, watches or pulls during an evaluation) look
//! at the whole stack: an untracked frame nested inside an evaluation is
//! still inside that evaluation.

use std::cell::RefCell;

use crate::graph::NodeId;

use super::runtime::Runtime;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<NodeId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops its frame when dropped.
pub(crate) struct ReactiveContext {
    frame: Option<NodeId>,
}

impl ReactiveContext {
    /// Make `node` the current evaluator until the guard is dropped.
    pub(crate) fn enter(node: NodeId) -> Self {
        Self::push(Some(node))
    }

    /// Suspend dependency recording until the guard is dropped.
    pub(crate) fn untracked() -> Self {
        Self::push(None)
    }

    fn push(frame: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(frame));
        Self { frame }
    }

    /// The computation reads are currently recorded for, if any.
    pub(crate) fn current() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }

    /// Whether any computation is being evaluated, tracked or not.
    pub(crate) fn is_evaluating() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().any(Option::is_some))
    }

    /// Whether the stack is empty.
    pub(crate) fn is_idle() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().is_empty())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let now_idle = CONTEXT_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                let popped = stack.pop();
                debug_assert_eq!(
                    popped,
                    Some(self.frame),
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.frame,
                    popped
                );
                stack.is_empty()
            })
            .unwrap_or(false);

        if now_idle {
            Runtime::flush_released();
        }
    }
}

/// Run `f` without recording dependencies.
///
/// Reads inside `f` still pull stale computations, they just do not make
/// the surrounding computation depend on what they read.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

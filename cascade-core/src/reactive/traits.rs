//! Shared read interface of signals and memos, plus the combinators built
//! on it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::context::untrack;
use super::effect::{watch_node, Effect};
use super::evaluator::{self, Access};
use super::memo::{Memo, MemoOptions};
use super::runtime::Runtime;
use super::suspense::Pending;

pub(crate) mod sealed {
    use std::rc::Rc;

    use crate::reactive::runtime::NodeHandle;

    pub trait Sealed {
        fn handle(&self) -> &Rc<NodeHandle>;
    }
}

fn access(id: NodeId) -> Access {
    Runtime::with(|rt| evaluator::access(rt, id))
}

/// A readable node: a [`Signal`](super::Signal) or a [`Memo`].
///
/// Reads inside a computation's expression make that computation depend on
/// the node. Clones share the node.
pub trait Reactive: sealed::Sealed + Clone + 'static {
    /// The value type, compared with `PartialEq` to detect changes.
    type Value: Clone + PartialEq + 'static;

    fn id(&self) -> NodeId {
        self.handle().id()
    }

    /// Read the value, recording a dependency of the current computation.
    ///
    /// A stale memo read outside a propagation pass is recomputed first.
    fn get(&self) -> Self::Value {
        let id = self.id();
        evaluator::downcast(id, access(id).value)
    }

    /// Like [`get`](Reactive::get), but reports a node that is
    /// mid-suspension when the reader is a suspended computation.
    fn read(&self) -> Result<Self::Value, Pending> {
        let id = self.id();
        let Access { value, pending } = access(id);
        if pending {
            return Err(Pending::new());
        }
        Ok(evaluator::downcast(id, value))
    }

    /// Read the value without recording a dependency.
    fn peek(&self) -> Self::Value {
        untrack(|| self.get())
    }

    /// Number of computations currently reading this node.
    fn observer_count(&self) -> usize {
        let id = self.id();
        Runtime::with(|rt| rt.graph.borrow().observers(id).len())
    }

    /// Call `f` with the new value after every propagated change.
    ///
    /// Watchers run once the whole graph is consistent, most recently
    /// registered first. Fails inside an evaluation.
    fn watch<F>(&self, f: F) -> Result<Effect, ReactiveError>
    where
        F: Fn(&Self::Value) + 'static,
    {
        let id = self.id();
        let callback = move || {
            let value: Self::Value = untrack(|| evaluator::downcast(id, access(id).value));
            f(&value);
        };
        watch_node(self.handle().clone(), Rc::new(callback))
    }

    /// [`watch`](Reactive::watch), plus one immediate call with the
    /// current value.
    fn subscribe<F>(&self, f: F) -> Result<Effect, ReactiveError>
    where
        F: Fn(&Self::Value) + 'static,
    {
        let f = Rc::new(f);
        let watcher = Rc::clone(&f);
        let effect = self.watch(move |value| watcher(value))?;
        f(&self.peek());
        Ok(effect)
    }

    /// Derive a memo from this node alone.
    fn map<U, F>(&self, f: F) -> Memo<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&Self::Value) -> U + 'static,
    {
        let source = self.clone();
        Memo::with_options(
            move |_| f(&source.get()),
            MemoOptions {
                fixed_deps: true,
                initial: None,
            },
        )
    }

    /// Follow the node `f` selects for the current value.
    ///
    /// `f` runs untracked; only this node and the selected node are
    /// dependencies.
    fn switch<R, F>(&self, f: F) -> Memo<R::Value>
    where
        R: Reactive,
        F: Fn(&Self::Value) -> R + 'static,
    {
        let source = self.clone();
        let selected: RefCell<Option<R>> = RefCell::new(None);
        Memo::new(move |_| {
            let value = source.get();
            let inner = untrack(|| f(&value));
            let result = inner.get();
            // Held so the selected node outlives its edge.
            *selected.borrow_mut() = Some(inner);
            result
        })
    }
}

/// A memo of every node's value, in order.
pub fn combine<R: Reactive>(nodes: &[R]) -> Memo<Vec<R::Value>> {
    let nodes = nodes.to_vec();
    Memo::with_options(
        move |_| nodes.iter().map(|node| node.get()).collect(),
        MemoOptions {
            fixed_deps: true,
            initial: None,
        },
    )
}

//! Memo Implementation
//!
//! A Memo is a cached derived value: a computation node whose expression
//! re-runs only when something it read has changed.
//!
//! # How Memos Work
//!
//! 1. A memo starts stale. The first read runs the expression and records
//!    every node it reads as a dependency.
//!
//! 2. When a dependency changes inside a transaction, the propagation pass
//!    re-runs the memo once, after all of its changed dependencies.
//!
//! 3. If the new value equals the old one, nothing downstream runs.
//!
//! 4. A memo nobody reads from and nobody watches drops its dependencies
//!    at the end of a pass and goes back to stale; the next read
//!    recomputes it.
//!
//! # Dependency Shapes
//!
//! How a memo re-collects its dependencies is fixed at creation, see
//! [`DepsShape`]. [`MemoOptions::fixed_deps`] selects
//! [`DepsShape::Fixed`]; otherwise the runtime's configured default is
//! used.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::graph::{
    value_eq, Collect, Collected, ComputationState, DepsShape, Node, NodeId, SuspenseState, Value,
};

use super::runtime::{NodeHandle, Runtime};
use super::suspense::Suspend;
use super::traits::{sealed, Reactive};

/// Creation options for [`Memo::with_options`].
pub struct MemoOptions<T> {
    /// Collect dependencies on the first run only.
    pub fixed_deps: bool,
    /// Value handed to the first run as the previous value.
    ///
    /// Required for a memo that reads itself, directly or through a cycle,
    /// on its first run: that read returns this value.
    pub initial: Option<T>,
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            fixed_deps: false,
            initial: None,
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` decides whether a
///   recomputation changed anything.
pub struct Memo<T> {
    handle: Rc<NodeHandle>,
    _marker: PhantomData<fn() -> T>,
}

fn previous<T: 'static>(prev: Option<&dyn Any>) -> Option<&T> {
    prev.and_then(|value| value.downcast_ref::<T>())
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The function receives the previous value, `None` on the first run.
    /// It is not run until the memo is read or watched.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&T>) -> T + 'static,
    {
        Self::with_options(f, MemoOptions::default())
    }

    /// Create a memo with explicit options.
    pub fn with_options<F>(f: F, options: MemoOptions<T>) -> Self
    where
        F: Fn(Option<&T>) -> T + 'static,
    {
        let collect: Collect = Rc::new(move |prev: Option<&dyn Any>| -> Collected {
            Ok(Rc::new(f(previous::<T>(prev))) as Value)
        });
        let shape = if options.fixed_deps {
            DepsShape::Fixed
        } else {
            Runtime::config().default_shape
        };
        let state = ComputationState::new(shape, Some(collect));
        Self::create(state, options.initial)
    }

    /// Create a memo whose expression may suspend.
    ///
    /// While it is suspended the memo holds `fallback`, or the fallback
    /// carried by the [`Suspend`]. A cancel handle carried by the
    /// suspension runs right before the next attempt.
    pub fn suspended<F>(f: F, fallback: T) -> Self
    where
        F: Fn(Option<&T>) -> Result<T, Suspend<T>> + 'static,
    {
        let collect: Collect = Rc::new(move |prev: Option<&dyn Any>| -> Collected {
            f(previous::<T>(prev))
                .map(|value| Rc::new(value) as Value)
                .map_err(Suspend::erase)
        });
        let mut state = ComputationState::new(Runtime::config().default_shape, Some(collect));
        state.suspense = Some(SuspenseState {
            fallback: Some(Rc::new(fallback)),
            cancel: None,
        });
        Self::create(state, None)
    }

    fn create(state: ComputationState, initial: Option<T>) -> Self {
        let initial = initial.map(|value| Rc::new(value) as Value);
        let handle = Runtime::create(Node::computation(state, initial, value_eq::<T>));
        Self {
            handle,
            _marker: PhantomData,
        }
    }
}

impl<T> Memo<T> {
    fn with_graph<R>(&self, f: impl FnOnce(&crate::graph::Graph, NodeId) -> R) -> R {
        let id = self.handle.id();
        Runtime::with(|rt| f(&rt.graph.borrow(), id))
    }

    /// The nodes this memo read during its last run, in read order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.with_graph(|graph, id| graph.sources(id))
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies().len()
    }

    /// Whether the next read will recompute.
    pub fn is_stale(&self) -> bool {
        self.with_graph(|graph, id| graph.node(id).flags.stale)
    }

    /// Whether the last run of a suspended memo fell back.
    pub fn is_suspending(&self) -> bool {
        self.with_graph(|graph, id| graph.node(id).flags.suspending)
    }

    /// The current dependency shape. A speculative memo that read a
    /// different sequence of nodes reports [`DepsShape::Unstable`].
    pub fn shape(&self) -> DepsShape {
        self.with_graph(|graph, id| graph.computation(id).shape)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> sealed::Sealed for Memo<T> {
    fn handle(&self) -> &Rc<NodeHandle> {
        &self.handle
    }
}

impl<T> Reactive for Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    type Value = T;
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.handle.id())
            .field("stale", &self.is_stale())
            .finish()
    }
}

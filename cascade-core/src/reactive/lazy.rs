//! Lazy computations.
//!
//! A lazy computation is never recomputed by a propagation pass. When one
//! of its dependencies changes it is left stale and its watchers are told
//! so; the owner re-runs it with an explicit [`Lazy::pull`] when it is
//! ready to. This is the shape a render loop needs: pull once per frame,
//! watch to learn when the next frame is due.
//!
//! Lazy nodes cannot be read from inside another computation, so they have
//! no `get` and do not implement [`Reactive`](super::Reactive).

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::error;

use crate::error::ReactiveError;
use crate::graph::{value_eq, Collected, ComputationState, Node, NodeId, Value};

use super::context::ReactiveContext;
use super::effect::{watch_node, Effect};
use super::evaluator;
use super::runtime::{NodeHandle, Runtime};

/// A computation that only runs when pulled.
pub struct Lazy<T> {
    handle: Rc<NodeHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Lazy<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new() -> Self {
        Self::create(None)
    }

    /// Create a lazy computation whose first pull sees `initial` as the
    /// previous value.
    pub fn with_initial(initial: T) -> Self {
        Self::create(Some(Rc::new(initial)))
    }

    fn create(initial: Option<Value>) -> Self {
        let mut state = ComputationState::new(Runtime::config().default_shape, None);
        state.lazy = true;
        let handle = Runtime::create(Node::computation(state, initial, value_eq::<T>));
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    /// Bring the value up to date with `f` and return it.
    ///
    /// `f` only runs if a dependency changed since the last pull. Fails
    /// inside an evaluation.
    pub fn pull<F>(&self, f: F) -> Result<T, ReactiveError>
    where
        F: Fn(Option<&T>) -> T,
    {
        let id = self.handle.id();
        if ReactiveContext::is_evaluating() {
            error!(node = %id, "lazy computation pulled during an evaluation");
            return Err(ReactiveError::PullDuringEvaluation);
        }

        if self.is_stale() {
            let expr = |prev: Option<&dyn Any>| -> Collected {
                let prev = prev.and_then(|value| value.downcast_ref::<T>());
                Ok(Rc::new(f(prev)) as Value)
            };
            Runtime::with(|rt| evaluator::estimate(rt, id, &expr));
        }
        Ok(evaluator::downcast(id, Runtime::stored_value(id)))
    }

    /// Call `f` whenever a dependency change leaves the value stale.
    pub fn watch<F>(&self, f: F) -> Result<Effect, ReactiveError>
    where
        F: Fn() + 'static,
    {
        watch_node(Rc::clone(&self.handle), Rc::new(f))
    }
}

impl<T> Lazy<T> {
    pub fn id(&self) -> NodeId {
        self.handle.id()
    }

    /// Whether the next pull will run its expression.
    pub fn is_stale(&self) -> bool {
        let id = self.handle.id();
        Runtime::with(|rt| rt.graph.borrow().node(id).flags.stale)
    }

    pub fn dependency_count(&self) -> usize {
        let id = self.handle.id();
        Runtime::with(|rt| rt.graph.borrow().sources(id).len())
    }
}

impl<T> Default for Lazy<T>
where
    T: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("id", &self.handle.id())
            .field("stale", &self.is_stale())
            .finish()
    }
}

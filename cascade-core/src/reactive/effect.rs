//! Effect Implementation
//!
//! An Effect is the handle of a watcher: a side-effecting callback attached
//! to a node.
//!
//! # How Watchers Work
//!
//! 1. Registering a watcher on a stale computation evaluates it once, so
//!    its dependencies exist and later writes reach it.
//!
//! 2. When a propagation pass changes the node, the watcher is queued. It
//!    runs after the pass, when every computation is up to date.
//!
//! 3. Disposing the effect marks it disposed at once and removes it from
//!    the node when the runtime is idle. A watcher disposed while it is
//!    already queued is skipped.
//!
//! # Differences from Memo
//!
//! - Watchers are terminal: nothing can depend on them.
//! - Watchers take no part in dependency counting.
//! - An effect keeps its node alive until it is disposed.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{error, trace};

use crate::error::ReactiveError;
use crate::graph::{NodeId, Watcher, WatcherId};

use super::context::ReactiveContext;
use super::evaluator;
use super::runtime::{NodeHandle, Runtime};

/// Handle to a registered watcher.
///
/// Dropping the handle disposes the watcher.
#[must_use = "dropping an Effect disposes its watcher"]
pub struct Effect {
    node: Rc<NodeHandle>,
    watcher: WatcherId,
    disposed: Rc<Cell<bool>>,
}

impl Effect {
    /// Get the effect's unique ID.
    pub fn id(&self) -> WatcherId {
        self.watcher
    }

    /// The watched node.
    pub fn node(&self) -> NodeId {
        self.node.id()
    }

    /// Stop the watcher. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        trace!(node = %self.node.id(), "watcher disposed");
        Runtime::unwatch(self.node.id(), self.watcher);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.watcher)
            .field("node", &self.node.id())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

/// Dispose an effect. See [`Effect::dispose`].
pub fn dispose(effect: &Effect) {
    effect.dispose();
}

/// Attach `callback` to a node.
pub(crate) fn watch_node(
    node: Rc<NodeHandle>,
    callback: Rc<dyn Fn()>,
) -> Result<Effect, ReactiveError> {
    let id = node.id();
    if ReactiveContext::is_evaluating() {
        error!(node = %id, "watcher registered during an evaluation");
        return Err(ReactiveError::WatchDuringEvaluation);
    }

    let watcher = WatcherId::new();
    let disposed = Rc::new(Cell::new(false));
    let registered = Watcher {
        callback,
        disposed: Rc::clone(&disposed),
    };

    let expr = Runtime::with(|rt| {
        let mut graph = rt.graph.borrow_mut();
        let target = graph.node_mut(id);
        target.watchers.insert(watcher, registered);
        if target.is_computation() && target.flags.stale && !target.is_lazy() {
            graph.computation(id).collect.clone()
        } else {
            None
        }
    });
    if let Some(expr) = expr {
        Runtime::with(|rt| evaluator::estimate(rt, id, &*expr));
    }

    trace!(node = %id, "watcher registered");
    Ok(Effect {
        node,
        watcher,
        disposed,
    })
}

//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, memos and
//! watchers. It owns the dependency graph and turns writes into
//! propagation passes.
//!
//! # How It Works
//!
//! 1. Every write happens inside a transaction. A write outside one opens
//!    an implicit transaction around itself; [`batch`] opens an explicit
//!    one. Nested transactions flatten into the outermost.
//!
//! 2. A write stores the value, sets the cell's `changed` flag and queues
//!    the cell once.
//!
//! 3. When the outermost transaction ends, the queued cells become the
//!    roots of a propagation pass. Watchers collected by the pass are then
//!    dispatched one at a time. Writes made by a watcher join the same
//!    transaction and trigger another pass before the next watcher runs.
//!
//! # Thread Model
//!
//! The runtime is thread-local and single-threaded. Handles are `!Send`,
//! so a node can never be touched from a thread that does not own it.
//!
//! # Node Lifetime
//!
//! Typed handles share a [`NodeHandle`]. Dropping the last one releases
//! the node. Because handles may be dropped from anywhere, including from
//! inside user code that runs while the graph is borrowed, releases are
//! queued and applied once the runtime is idle.

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::config::{ConfigError, RuntimeConfig};
use crate::error::ReactiveError;
use crate::graph::{
    Graph, GraphStats, Node, NodeId, PassHost, Propagator, Value, Watcher, WatcherId,
};

use super::context::ReactiveContext;
use super::evaluator;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Work postponed until the runtime is idle.
enum Deferred {
    Release(NodeId),
    Unwatch(NodeId, WatcherId),
}

/// Shared ownership of one graph node.
///
/// Dropping the last handle releases the node.
pub struct NodeHandle {
    id: NodeId,
}

impl NodeHandle {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        let id = self.id;
        // The runtime may already be gone during thread teardown.
        let _ = RUNTIME.try_with(|rt| rt.defer(Deferred::Release(id)));
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodeHandle").field(&self.id).finish()
    }
}

/// The thread-local reactive runtime.
///
/// All state lives in a per-thread instance reached through associated
/// functions such as [`Runtime::batch`] and [`Runtime::stats`].
pub struct Runtime {
    pub(super) graph: RefCell<Graph>,
    in_transaction: Cell<bool>,
    dirty: RefCell<Vec<NodeId>>,
    effects: RefCell<Vec<Watcher>>,
    deferred: RefCell<Vec<Deferred>>,
    flushing: Cell<bool>,
    config: Cell<RuntimeConfig>,
}

/// Marks the outermost transaction; ending it re-enables releases.
struct Transaction;

impl Transaction {
    fn begin() -> Option<Self> {
        Runtime::with(|rt| (!rt.in_transaction.replace(true)).then_some(Transaction))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| {
            rt.in_transaction.set(false);
            rt.flush_if_idle();
        });
    }
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            in_transaction: Cell::new(false),
            dirty: RefCell::new(Vec::new()),
            effects: RefCell::new(Vec::new()),
            deferred: RefCell::new(Vec::new()),
            flushing: Cell::new(false),
            config: Cell::new(RuntimeConfig::default()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Run `f` as one transaction.
    ///
    /// Writes inside `f` are queued and propagated together when the
    /// outermost batch returns, so every watcher sees all of them at once.
    /// Calling `batch` inside a batch (or inside a watcher) just runs `f`.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let Some(transaction) = Transaction::begin() else {
            return f();
        };
        let result = f();
        Self::with(Runtime::commit);
        drop(transaction);
        result
    }

    /// Whether a transaction is open on this thread.
    pub fn in_transaction() -> bool {
        Self::with(|rt| rt.in_transaction.get())
    }

    /// Whether a computation is being evaluated on this thread.
    pub fn is_evaluating() -> bool {
        ReactiveContext::is_evaluating()
    }

    /// Graph counters for this thread.
    pub fn stats() -> GraphStats {
        Self::with(|rt| rt.graph.borrow().stats())
    }

    /// The configuration in effect on this thread.
    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config.get())
    }

    /// Replace this thread's configuration.
    ///
    /// Computations keep the dependency shape they were created with.
    pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        debug!(?config, "runtime configured");
        Self::with(|rt| rt.config.set(config));
        Ok(())
    }

    /// Add a node and hand out the first handle to it.
    pub(crate) fn create(node: Node) -> Rc<NodeHandle> {
        let id = Self::with(|rt| rt.graph.borrow_mut().insert(node));
        trace!(node = %id, "node created");
        Rc::new(NodeHandle { id })
    }

    /// Write a cell.
    ///
    /// With `check`, a value equal to the current one is ignored.
    pub(crate) fn write(id: NodeId, value: Value, check: bool) -> Result<(), ReactiveError> {
        if ReactiveContext::is_evaluating() {
            error!(node = %id, "cell written during an evaluation");
            return Err(ReactiveError::WriteDuringEvaluation);
        }
        Self::batch(|| Self::with(|rt| rt.enqueue(id, value, check)));
        Ok(())
    }

    fn enqueue(&self, id: NodeId, value: Value, check: bool) {
        let mut graph = self.graph.borrow_mut();
        let node = graph.node_mut(id);
        if check && node.holds(Some(&value)) {
            return;
        }
        let previous = node.value.replace(value);
        if !node.flags.changed {
            node.flags.changed = true;
            self.dirty.borrow_mut().push(id);
        }
        drop(graph);
        drop(previous);
    }

    /// Propagate everything written in the transaction and dispatch the
    /// collected watchers.
    fn commit(&self) {
        loop {
            let roots: Vec<NodeId> = self.dirty.borrow_mut().drain(..).rev().collect();
            if !roots.is_empty() {
                debug!(roots = roots.len(), "committing transaction");
                let release_idle = self.config.get().release_idle;
                let effects = Propagator::run(self, &roots, release_idle);
                self.effects.borrow_mut().extend(effects);
            }

            let next = self.effects.borrow_mut().pop();
            match next {
                Some(watcher) => watcher.dispatch(),
                None if self.dirty.borrow().is_empty() => break,
                None => {}
            }
        }
    }

    /// Current value of a node without evaluating or recording anything.
    pub(crate) fn stored_value(id: NodeId) -> Option<Value> {
        Self::with(|rt| rt.graph.borrow().node(id).value.clone())
    }

    /// Queue a watcher for removal.
    pub(crate) fn unwatch(node: NodeId, watcher: WatcherId) {
        let _ = RUNTIME.try_with(|rt| rt.defer(Deferred::Unwatch(node, watcher)));
    }

    /// Apply queued releases if the runtime is idle.
    pub(crate) fn flush_released() {
        let _ = RUNTIME.try_with(Runtime::flush_if_idle);
    }

    fn defer(&self, work: Deferred) {
        self.deferred.borrow_mut().push(work);
        self.flush_if_idle();
    }

    fn flush_if_idle(&self) {
        if self.in_transaction.get() || self.flushing.get() || !ReactiveContext::is_idle() {
            return;
        }
        self.flushing.set(true);

        loop {
            let work = std::mem::take(&mut *self.deferred.borrow_mut());
            if work.is_empty() {
                break;
            }
            let Ok(mut graph) = self.graph.try_borrow_mut() else {
                // Put it back; the next idle point picks it up.
                self.deferred.borrow_mut().splice(0..0, work);
                break;
            };

            // Removed nodes and watchers are dropped after the graph borrow
            // ends: they may own handles whose drop queues more work.
            let mut removed = Vec::new();
            let mut watchers = Vec::new();
            for item in work {
                match item {
                    Deferred::Release(id) => {
                        if let Some(node) = graph.remove(id) {
                            trace!(node = %id, "node released");
                            removed.push(node);
                        }
                    }
                    Deferred::Unwatch(id, watcher) => {
                        if graph.contains(id) {
                            watchers.extend(graph.node_mut(id).watchers.shift_remove(&watcher));
                        }
                    }
                }
            }
            drop(graph);
            drop(watchers);
            drop(removed);
        }

        self.flushing.set(false);
    }
}

impl PassHost for Runtime {
    fn graph(&self) -> RefMut<'_, Graph> {
        self.graph.borrow_mut()
    }

    fn reevaluate(&self, node: NodeId) -> bool {
        evaluator::reevaluate(self, node)
    }
}

/// Run `f` as one transaction. See [`Runtime::batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}

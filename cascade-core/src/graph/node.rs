//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! Every node is a *cell*: it holds a value, a list of observer edges and a
//! list of watchers. A *computation* is a cell that additionally owns a list
//! of source edges and the expression that produces its value.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::arena::Index;
use super::edge::EdgeId;

/// Type-erased node value. Cloning only bumps a reference count.
pub(crate) type Value = Rc<dyn Any>;

/// Equality check captured for the concrete value type when a node is created.
pub(crate) type ValueEq = fn(&dyn Any, &dyn Any) -> bool;

/// Cancellation handle stored by a suspended computation.
pub(crate) type CancelFn = Box<dyn FnOnce()>;

/// Result of running a collect expression once.
pub(crate) type Collected = Result<Value, Suspension>;

/// Type-erased collect expression: previous value in, next value out.
pub(crate) type Collect = Rc<dyn Fn(Option<&dyn Any>) -> Collected>;

/// Erased form of a suspended run.
pub(crate) struct Suspension {
    pub(crate) fallback: Option<Value>,
    pub(crate) cancel: Option<CancelFn>,
}

/// Equality used for every typed node.
pub(crate) fn value_eq<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Index);

impl NodeId {
    pub(crate) fn from_index(index: Index) -> Self {
        Self(index)
    }

    pub(crate) fn index(&self) -> Index {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.0.slot(), self.0.generation())
    }
}

/// Unique identifier for a registered watcher.
///
/// Uses an atomic counter so ids stay unique across runtimes on different
/// threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a computation maintains its source edges across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepsShape {
    /// Edges are collected on the first run and never touched again.
    Fixed,

    /// All edges are torn down before each run and rebuilt while it reads.
    Unstable,

    /// The previous edge list is assumed to hold and verified read by read.
    /// The first mismatch demotes the computation to [`DepsShape::Unstable`].
    #[default]
    Speculative,
}

/// Orthogonal state bits of a node.
///
/// Plain cells only ever use `changed`, `mark_for_check` and `propagating`.
/// `stale`, `estimating`, `suspending` and `conflict` are meaningful on
/// computations only. `marking` and `propagating` may be set together: a
/// conflicted node re-marks its observers while it is still propagating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodeFlags {
    /// The value may not match the dependencies any more.
    pub(crate) stale: bool,
    /// Reached by the mark phase of the current pass and not yet propagated.
    pub(crate) mark_for_check: bool,
    /// Inside a pull evaluation; a self-read returns the previous value.
    pub(crate) estimating: bool,
    /// The value changed and observers still need to hear about it.
    pub(crate) changed: bool,
    /// The last run of a suspended computation fell back.
    pub(crate) suspending: bool,
    /// On the mark-phase walk stack.
    pub(crate) marking: bool,
    /// On the propagate-phase walk stack.
    pub(crate) propagating: bool,
    /// Revisited while propagating: part of a dependency cycle.
    pub(crate) conflict: bool,
}

/// Suspense bookkeeping of a suspended computation.
pub(crate) struct SuspenseState {
    pub(crate) fallback: Option<Value>,
    pub(crate) cancel: Option<CancelFn>,
}

/// Computation-only part of a node.
pub(crate) struct ComputationState {
    pub(crate) first_source: Option<EdgeId>,
    pub(crate) last_source: Option<EdgeId>,
    /// Next expected source while verifying a speculative edge list.
    pub(crate) cursor: Option<EdgeId>,
    pub(crate) shape: DepsShape,
    /// A fixed computation whose edges have been collected.
    pub(crate) sealed: bool,
    /// Only recomputed by an explicit pull.
    pub(crate) lazy: bool,
    /// `None` for lazy computations, whose expression arrives with each pull.
    pub(crate) collect: Option<Collect>,
    pub(crate) suspense: Option<SuspenseState>,
}

impl ComputationState {
    pub(crate) fn new(shape: DepsShape, collect: Option<Collect>) -> Self {
        Self {
            first_source: None,
            last_source: None,
            cursor: None,
            shape,
            sealed: false,
            lazy: false,
            collect,
            suspense: None,
        }
    }

    /// Whether reads are checked against the previously recorded sources.
    pub(crate) fn is_verifying(&self) -> bool {
        match self.shape {
            DepsShape::Speculative => true,
            DepsShape::Fixed => !self.sealed,
            DepsShape::Unstable => false,
        }
    }
}

/// The kind of node in the dependency graph.
pub(crate) enum NodeKind {
    /// A mutable input. Only the transaction manager writes it.
    Cell,

    /// A derived node recomputed from its sources.
    Computation(Box<ComputationState>),
}

/// A side effect attached to a node. Watchers take no part in dependency
/// accounting.
#[derive(Clone)]
pub(crate) struct Watcher {
    pub(crate) callback: Rc<dyn Fn()>,
    pub(crate) disposed: Rc<Cell<bool>>,
}

impl Watcher {
    /// Invoke the callback unless the watcher was disposed after being queued.
    pub(crate) fn dispatch(&self) {
        if !self.disposed.get() {
            (self.callback)();
        }
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) flags: NodeFlags,
    /// `None` until a computation first produces a value.
    pub(crate) value: Option<Value>,
    pub(crate) eq: ValueEq,
    pub(crate) first_observer: Option<EdgeId>,
    pub(crate) last_observer: Option<EdgeId>,
    pub(crate) watchers: IndexMap<WatcherId, Watcher>,
    /// Marked inbound edges not yet resolved in the current pass.
    pub(crate) pending: u32,
}

impl Node {
    /// Create a new cell node.
    pub(crate) fn cell(value: Value, eq: ValueEq) -> Self {
        Self::new(NodeKind::Cell, Some(value), eq)
    }

    /// Create a new computation node. Computations start stale.
    pub(crate) fn computation(state: ComputationState, value: Option<Value>, eq: ValueEq) -> Self {
        let mut node = Self::new(NodeKind::Computation(Box::new(state)), value, eq);
        node.flags.stale = true;
        node
    }

    fn new(kind: NodeKind, value: Option<Value>, eq: ValueEq) -> Self {
        Self {
            kind,
            flags: NodeFlags::default(),
            value,
            eq,
            first_observer: None,
            last_observer: None,
            watchers: IndexMap::new(),
            pending: 0,
        }
    }

    pub(crate) fn computation_state(&self) -> Option<&ComputationState> {
        match &self.kind {
            NodeKind::Computation(state) => Some(state),
            NodeKind::Cell => None,
        }
    }

    pub(crate) fn computation_state_mut(&mut self) -> Option<&mut ComputationState> {
        match &mut self.kind {
            NodeKind::Computation(state) => Some(state),
            NodeKind::Cell => None,
        }
    }

    pub(crate) fn is_computation(&self) -> bool {
        matches!(self.kind, NodeKind::Computation(_))
    }

    pub(crate) fn is_lazy(&self) -> bool {
        self.computation_state().is_some_and(|state| state.lazy)
    }

    pub(crate) fn is_suspense(&self) -> bool {
        self.computation_state()
            .is_some_and(|state| state.suspense.is_some())
    }

    pub(crate) fn has_observers(&self) -> bool {
        self.last_observer.is_some()
    }

    /// Compare a candidate value with the stored one using the node's
    /// equality.
    pub(crate) fn holds(&self, candidate: Option<&Value>) -> bool {
        match (self.value.as_deref(), candidate.map(|v| &**v)) {
            (None, None) => true,
            (Some(current), Some(candidate)) => (self.eq)(current, candidate),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i32) -> Value {
        Rc::new(value)
    }

    #[test]
    fn watcher_ids_are_unique() {
        let id1 = WatcherId::new();
        let id2 = WatcherId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn cell_starts_clean() {
        let node = Node::cell(int(1), value_eq::<i32>);
        assert!(!node.is_computation());
        assert_eq!(node.flags, NodeFlags::default());
    }

    #[test]
    fn computation_starts_stale() {
        let node = Node::computation(
            ComputationState::new(DepsShape::Speculative, None),
            None,
            value_eq::<i32>,
        );
        assert!(node.is_computation());
        assert!(node.flags.stale);
        assert!(!node.is_lazy());
        assert!(!node.is_suspense());
    }

    #[test]
    fn holds_uses_typed_equality() {
        let node = Node::cell(int(7), value_eq::<i32>);
        assert!(node.holds(Some(&int(7))));
        assert!(!node.holds(Some(&int(8))));
        assert!(!node.holds(None));

        let mismatched: Value = Rc::new("7");
        assert!(!node.holds(Some(&mismatched)));
    }

    #[test]
    fn verifying_depends_on_shape() {
        let mut state = ComputationState::new(DepsShape::Fixed, None);
        assert!(state.is_verifying());
        state.sealed = true;
        assert!(!state.is_verifying());

        assert!(ComputationState::new(DepsShape::Speculative, None).is_verifying());
        assert!(!ComputationState::new(DepsShape::Unstable, None).is_verifying());
    }

    #[test]
    fn disposed_watcher_is_skipped() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let watcher = Watcher {
            callback: Rc::new(move || calls_clone.set(calls_clone.get() + 1)),
            disposed: Rc::new(Cell::new(false)),
        };

        watcher.dispatch();
        watcher.disposed.set(true);
        watcher.dispatch();
        assert_eq!(calls.get(), 1);
    }
}

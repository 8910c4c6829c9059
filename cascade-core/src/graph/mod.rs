//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between cells and the computations that read them.
//!
//! # Overview
//!
//! - Nodes are cells (mutable inputs) or computations (derived values).
//! - An edge means "observer read source during its last run".
//!
//! Each node keeps an ordered, doubly-linked list of observer edges and each
//! computation keeps an ordered, doubly-linked list of source edges. The
//! order matters: the speculative dependency regime compares a run's reads
//! against the recorded source order.
//!
//! # Design Decisions
//!
//! 1. Nodes and edges are owned by generational arenas and referenced by
//!    index from both sides, so unlinking is O(1) and a dangling index is
//!    detected rather than dereferenced.
//!
//! 2. Cycles are legal. The scheduler tolerates self- and mutually
//!    referential computations instead of rejecting them.
//!
//! 3. The graph holds no user code invariants of its own: running
//!    expressions and dispatching effects is the runtime's job, which keeps
//!    every method here free of re-entrancy.

mod arena;
mod edge;
mod node;
mod scheduler;
mod shape;

pub use arena::Index;
pub use edge::EdgeId;
pub use node::{DepsShape, NodeId, WatcherId};

pub(crate) use arena::Arena;
pub(crate) use edge::Edge;
pub(crate) use node::{
    value_eq, CancelFn, Collect, Collected, ComputationState, Node, Suspension, SuspenseState,
    Value, Watcher,
};
pub(crate) use scheduler::{PassHost, Propagator};

use serde::Serialize;
use smallvec::SmallVec;

/// Counters describing the graph, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Live nodes.
    pub nodes: usize,
    /// Live edge pairs.
    pub edges: usize,
    /// Edge pairs created since the runtime started.
    pub edges_linked: u64,
    /// Edge pairs removed since the runtime started.
    pub edges_unlinked: u64,
    /// Collect expressions run since the runtime started.
    pub evaluations: u64,
    /// Propagation passes run since the runtime started.
    pub passes: u64,
}

/// Snapshot of an observer list taken before walking it.
pub(crate) type EdgeSnapshot = SmallVec<[EdgeId; 8]>;

/// Node and edge storage.
pub(crate) struct Graph {
    nodes: Arena<Node>,
    edges: Arena<Edge>,
    stats: GraphStats,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Arena::new(),
            edges: Arena::new(),
            stats: GraphStats::default(),
        }
    }

    /// Add a node to the graph.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        NodeId::from_index(self.nodes.insert(node))
    }

    /// Remove a node from the graph.
    ///
    /// Every edge touching the node is unlinked first, so observers simply
    /// lose it as a source. The node is handed back so the caller can drop
    /// its values and closures outside any borrow of the graph.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        if !self.nodes.contains(id.index()) {
            return None;
        }

        if self.node(id).is_computation() {
            self.cleanup_sources(id, None);
        }
        while let Some(edge) = self.node(id).last_observer {
            self.unlink(edge);
        }

        self.nodes.remove(id.index())
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.index())
    }

    /// Get a reference to a node.
    ///
    /// Panics on a dangling id: handles keep their nodes alive, so this can
    /// only happen through a bug in the runtime.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(id.index())
            .unwrap_or_else(|| panic!("dangling node id {id}"))
    }

    /// Get a mutable reference to a node.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("dangling node id {id}"))
    }

    pub(crate) fn computation(&self, id: NodeId) -> &ComputationState {
        self.node(id)
            .computation_state()
            .unwrap_or_else(|| panic!("node {id} is not a computation"))
    }

    pub(crate) fn computation_mut(&mut self, id: NodeId) -> &mut ComputationState {
        self.node_mut(id)
            .computation_state_mut()
            .unwrap_or_else(|| panic!("node {id} is not a computation"))
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        self.edges
            .get_mut(id.index())
            .expect("edge list points at a removed edge")
    }

    /// Append an edge: `observer` now reads `source`.
    ///
    /// The edge goes to the tail of both the observer's source list and the
    /// source's observer list.
    pub(crate) fn link(&mut self, observer: NodeId, source: NodeId) -> EdgeId {
        let id = EdgeId::from_index(self.edges.insert(Edge::new(source, observer)));

        let prev_source = self.computation(observer).last_source;
        self.edge_mut(id).prev_source = prev_source;
        match prev_source {
            Some(prev) => self.edge_mut(prev).next_source = Some(id),
            None => self.computation_mut(observer).first_source = Some(id),
        }
        self.computation_mut(observer).last_source = Some(id);

        let prev_observer = self.node(source).last_observer;
        self.edge_mut(id).prev_observer = prev_observer;
        match prev_observer {
            Some(prev) => self.edge_mut(prev).next_observer = Some(id),
            None => self.node_mut(source).first_observer = Some(id),
        }
        self.node_mut(source).last_observer = Some(id);

        self.stats.edges_linked += 1;
        id
    }

    /// Remove an edge from both lists it belongs to.
    pub(crate) fn unlink(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.remove(id.index()) else {
            return;
        };

        match edge.next_source {
            Some(next) => self.edge_mut(next).prev_source = edge.prev_source,
            None => self.computation_mut(edge.observer).last_source = edge.prev_source,
        }
        match edge.prev_source {
            Some(prev) => self.edge_mut(prev).next_source = edge.next_source,
            None => self.computation_mut(edge.observer).first_source = edge.next_source,
        }

        match edge.next_observer {
            Some(next) => self.edge_mut(next).prev_observer = edge.prev_observer,
            None => self.node_mut(edge.source).last_observer = edge.prev_observer,
        }
        match edge.prev_observer {
            Some(prev) => self.edge_mut(prev).next_observer = edge.next_observer,
            None => self.node_mut(edge.source).first_observer = edge.next_observer,
        }

        self.stats.edges_unlinked += 1;
    }

    /// Observer edges of a node, head to tail.
    pub(crate) fn observer_edges(&self, id: NodeId) -> EdgeSnapshot {
        let mut out = EdgeSnapshot::new();
        let mut cursor = self.node(id).first_observer;
        while let Some(edge_id) = cursor {
            out.push(edge_id);
            cursor = self.edges.get(edge_id.index()).and_then(|e| e.next_observer);
        }
        out
    }

    /// Source nodes of a computation in read order. Repeated reads show up
    /// as repeated entries.
    pub(crate) fn sources(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.computation(id).first_source;
        while let Some(edge) = cursor.and_then(|e| self.edge(e)) {
            out.push(edge.source);
            cursor = edge.next_source;
        }
        out
    }

    /// Observer nodes of a node in link order.
    pub(crate) fn observers(&self, id: NodeId) -> Vec<NodeId> {
        self.observer_edges(id)
            .into_iter()
            .filter_map(|edge| self.edge(edge).map(|e| e.observer))
            .collect()
    }

    pub(crate) fn record_evaluation(&mut self) {
        self.stats.evaluations += 1;
    }

    pub(crate) fn record_pass(&mut self) {
        self.stats.passes += 1;
    }

    /// Current counters.
    pub(crate) fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            ..self.stats
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

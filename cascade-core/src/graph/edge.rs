//! Graph Edges
//!
//! A dependency is recorded as a pair of list entries: one in the observing
//! computation's source list and one in the observed node's observer list.
//! Both halves live in the same arena slot, so they always exist together
//! and either list can unlink the pair in O(1) without scanning.

use super::arena::Index;
use super::node::NodeId;

/// Identifier for a source/observer edge pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(Index);

impl EdgeId {
    pub(crate) fn from_index(index: Index) -> Self {
        Self(index)
    }

    pub(crate) fn index(&self) -> Index {
        self.0
    }
}

/// `observer` reads `source`.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub(crate) source: NodeId,
    pub(crate) observer: NodeId,

    // Links within `observer`'s source list.
    pub(crate) prev_source: Option<EdgeId>,
    pub(crate) next_source: Option<EdgeId>,

    // Links within `source`'s observer list.
    pub(crate) prev_observer: Option<EdgeId>,
    pub(crate) next_observer: Option<EdgeId>,
}

impl Edge {
    pub(crate) fn new(source: NodeId, observer: NodeId) -> Self {
        Self {
            source,
            observer,
            prev_source: None,
            next_source: None,
            prev_observer: None,
            next_observer: None,
        }
    }
}

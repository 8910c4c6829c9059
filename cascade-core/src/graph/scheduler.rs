//! Update Scheduler
//!
//! The scheduler brings the graph back to a consistent state after a
//! transaction wrote some cells. It ensures every affected computation is
//! evaluated once, after all of its changed dependencies.
//!
//! # Algorithm
//!
//! A pass is two depth-first walks over observer edges, starting at the
//! cells written in the transaction (the roots):
//!
//! 1. **Mark.** Every reachable node gets `mark_for_check` and a `pending`
//!    count of marked inbound edges, i.e. its in-degree within the affected
//!    subgraph. A node already on the mark stack is skipped, which keeps
//!    cycles from recursing forever.
//!
//! 2. **Propagate.** Walking an edge decrements the observer's `pending`
//!    count. Only when it reaches zero is the observer entered: recomputed
//!    if one of its sources changed, then walked itself. This counting gate
//!    is what stops a node with two paths to a changed ancestor (the
//!    diamond) from running twice. A branch whose value did not change
//!    still decrements its observers but never makes them stale.
//!
//! An observer that is still on the propagate stack when it is reached
//! again sits on a cycle and is flagged `conflict`. Once the conflicted
//! node's walk finishes it is re-evaluated, its observers are marked again
//! and the walk repeats. That re-walk is the only cycle handling: a cycle
//! whose values never settle is not detected.
//!
//! A computation evaluated earlier in the pass may have started reading a
//! node that was still waiting for its turn, and so saw its previous value.
//! That edge did not exist during the mark phase. If the node then changes,
//! the observer is marked on the spot and entered again.
//!
//! Watchers of changed nodes are collected, not called. The runtime calls
//! them after the whole pass, so no side effect sees a half-updated graph.
//! A watcher reached again in the same pass is queued once, at its latest
//! position.
//!
//! Both walks use explicit stacks instead of recursion so arbitrarily deep
//! graphs cannot overflow the call stack.

use std::cell::RefMut;

use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use super::edge::EdgeId;
use super::node::{NodeId, Watcher, WatcherId};
use super::{EdgeSnapshot, Graph};

/// What the scheduler needs from its owner.
///
/// Re-evaluation runs user code that reads the graph, so the scheduler
/// never holds the graph across a call to [`PassHost::reevaluate`].
pub(crate) trait PassHost {
    /// Borrow the graph for a short, user-code-free step.
    fn graph(&self) -> RefMut<'_, Graph>;

    /// Run a computation's expression once and store the result.
    ///
    /// Returns whether the stored value changed.
    fn reevaluate(&self, node: NodeId) -> bool;
}

/// One node on the propagate stack.
struct Frame {
    node: NodeId,
    /// Observer edges as they were when the walk (re)started.
    edges: EdgeSnapshot,
    pos: usize,
    changed: bool,
    /// A change round whose watchers were held back by a conflict.
    notify_pending: bool,
}

impl Frame {
    fn new(graph: &Graph, node: NodeId) -> Self {
        Self {
            node,
            edges: graph.observer_edges(node),
            pos: 0,
            changed: graph.node(node).flags.changed,
            notify_pending: false,
        }
    }
}

/// Runs propagation passes.
pub(crate) struct Propagator {
    frames: Vec<Frame>,
    effects: IndexMap<WatcherId, Watcher>,
    release_idle: bool,
}

/// Queue `watchers`, moving any already queued in this pass to the back.
fn queue(effects: &mut IndexMap<WatcherId, Watcher>, watchers: &IndexMap<WatcherId, Watcher>) {
    for (&id, watcher) in watchers {
        effects.shift_remove(&id);
        effects.insert(id, watcher.clone());
    }
}

impl Propagator {
    /// Mark and propagate from `roots`, which must all carry the `changed`
    /// flag. Roots are walked in the order given.
    ///
    /// Returns the watchers to dispatch, each at most once, in push order.
    pub(crate) fn run<H: PassHost + ?Sized>(
        host: &H,
        roots: &[NodeId],
        release_idle: bool,
    ) -> Vec<Watcher> {
        {
            let mut graph = host.graph();
            graph.record_pass();
            graph.mark_roots(roots);
        }

        let mut pass = Self {
            frames: Vec::new(),
            effects: IndexMap::new(),
            release_idle,
        };

        for &root in roots {
            let ready = {
                let mut graph = host.graph();
                let node = graph.node_mut(root);
                node.pending = node.pending.saturating_sub(1);
                node.pending == 0 && node.flags.mark_for_check
            };
            if ready {
                pass.enter(host, root);
                pass.drive(host);
            }
        }

        pass.effects.into_values().collect()
    }

    /// Start propagating a node whose pending count reached zero.
    fn enter<H: PassHost + ?Sized>(&mut self, host: &H, id: NodeId) {
        let evaluate = {
            let mut graph = host.graph();
            let node = graph.node_mut(id);
            assert!(
                node.flags.mark_for_check,
                "node {id} propagated without being marked for check"
            );
            debug_assert_eq!(node.pending, 0, "node {id} entered with pending sources");

            node.flags.propagating = true;
            if node.flags.stale && node.is_lazy() {
                // Lazy nodes stay stale until pulled; their watchers still hear
                // about the change.
                node.flags.changed = true;
                false
            } else {
                node.flags.stale && node.is_computation()
            }
        };

        if evaluate {
            let changed = host.reevaluate(id);
            let mut graph = host.graph();
            let node = graph.node_mut(id);
            node.flags.changed |= changed;
            node.flags.stale = false;
        }

        let mut graph = host.graph();
        graph.node_mut(id).flags.mark_for_check = false;
        let frame = Frame::new(&graph, id);
        drop(graph);
        self.frames.push(frame);
    }

    fn drive<H: PassHost + ?Sized>(&mut self, host: &H) {
        while let Some(frame) = self.frames.last_mut() {
            if let Some(&edge) = frame.edges.get(frame.pos) {
                frame.pos += 1;
                let changed = frame.changed;
                let ready = host.graph().visit_observer(edge, changed);
                if let Some(next) = ready {
                    self.enter(host, next);
                }
                continue;
            }

            let id = frame.node;
            let mut graph = host.graph();
            let node = graph.node_mut(id);
            let conflict = node.flags.conflict;
            if frame.changed {
                node.flags.changed = false;
                if conflict {
                    frame.notify_pending = true;
                } else {
                    frame.notify_pending = false;
                    queue(&mut self.effects, &node.watchers);
                }
            }

            if conflict {
                node.flags.conflict = false;
                assert!(
                    !node.is_lazy(),
                    "lazy computation {id} is part of a dependency cycle"
                );
                drop(graph);

                debug!(node = %id, "re-evaluating conflicted computation");
                let changed = host.reevaluate(id);

                let mut graph = host.graph();
                graph.node_mut(id).flags.changed |= changed;
                graph.mark_observers(id);
                let restarted = Frame {
                    notify_pending: frame.notify_pending,
                    ..Frame::new(&graph, id)
                };
                *frame = restarted;
                continue;
            }

            let notify = frame.notify_pending;
            self.frames.pop();
            if notify {
                queue(&mut self.effects, &node.watchers);
            }
            node.flags.propagating = false;

            let idle = node.is_computation() && !node.has_observers() && node.watchers.is_empty();
            if idle && self.release_idle {
                trace!(node = %id, "releasing sources of unobserved computation");
                graph.cleanup_sources(id, None);
                graph.node_mut(id).flags.stale = true;
            }
        }
    }
}

impl Graph {
    /// Mark phase for a whole transaction.
    fn mark_roots(&mut self, roots: &[NodeId]) {
        for &root in roots {
            let node = self.node_mut(root);
            node.pending += 1;
            if !node.flags.mark_for_check {
                node.flags.mark_for_check = true;
                self.mark_observers(root);
            }
        }
    }

    /// Mark everything reachable from `start` and count marked inbound
    /// edges. Observers are visited tail to head.
    pub(crate) fn mark_observers(&mut self, start: NodeId) {
        self.node_mut(start).flags.marking = true;
        let mut stack: SmallVec<[(NodeId, Option<EdgeId>); 16]> =
            smallvec![(start, self.node(start).last_observer)];

        while let Some(top) = stack.last_mut() {
            let (node, cursor) = *top;
            let Some(edge_id) = cursor else {
                self.node_mut(node).flags.marking = false;
                stack.pop();
                continue;
            };

            let edge = self
                .edge(edge_id)
                .expect("observer list points at a removed edge");
            let observer = edge.observer;
            top.1 = edge.prev_observer;

            let target = self.node_mut(observer);
            if target.flags.marking || target.flags.propagating {
                // Already on a walk stack: a cycle back into it.
                continue;
            }
            target.pending += 1;
            if target.flags.mark_for_check {
                continue;
            }
            target.flags.mark_for_check = true;
            target.flags.marking = true;
            let last = target.last_observer;
            stack.push((observer, last));
        }
    }

    /// Resolve one marked inbound edge of the edge's observer.
    ///
    /// Returns the observer if this was its last pending edge.
    fn visit_observer(&mut self, edge: EdgeId, changed: bool) -> Option<NodeId> {
        // Edges removed since the snapshot was taken belong to observers that
        // have already been evaluated.
        let observer = self.edge(edge)?.observer;
        let node = self.node_mut(observer);

        if node.flags.propagating {
            if changed {
                node.flags.conflict = true;
            }
            return None;
        }
        if !node.flags.mark_for_check {
            // Linked after the mark phase: the observer read the value this
            // node had before the pass.
            if !changed || !node.is_computation() {
                return None;
            }
            debug!(node = %observer, "re-entering observer linked during the pass");
            node.flags.stale = true;
            node.flags.mark_for_check = true;
            return Some(observer);
        }

        if changed && node.is_computation() {
            node.flags.stale = true;
        }
        debug_assert!(node.pending > 0, "node {observer} resolved more edges than marked");
        node.pending = node.pending.saturating_sub(1);
        (node.pending == 0).then_some(observer)
    }
}

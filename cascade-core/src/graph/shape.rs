//! Dependency Shape Tracking
//!
//! Decides, per computation, how its source edges are re-collected when it
//! runs again:
//!
//! | Shape         | Before the run         | On each read                      | After the run        |
//! |---------------|------------------------|-----------------------------------|----------------------|
//! | `Fixed`       | nothing                | record only on the first run      | seal                 |
//! | `Unstable`    | drop every source edge | append an edge                    | nothing              |
//! | `Speculative` | rewind the cursor      | compare with the cursor edge      | trim unread tail     |
//!
//! Most computations read the same sources in the same order every time,
//! so the speculative regime usually finishes with zero edge churn. The
//! first read that disagrees with the recorded order tears the rest of the
//! list down and switches the computation to the unstable regime for good.

use tracing::debug;

use super::edge::EdgeId;
use super::node::{DepsShape, NodeId};
use super::Graph;

impl Graph {
    /// Prepare a computation's edge list for a run.
    pub(crate) fn begin_collect(&mut self, id: NodeId) {
        if self.computation(id).shape == DepsShape::Unstable {
            self.cleanup_sources(id, None);
        }
        let state = self.computation_mut(id);
        state.cursor = state.first_source;
    }

    /// Record that the running computation `observer` read `source`.
    pub(crate) fn record_access(&mut self, observer: NodeId, source: NodeId) {
        let state = self.computation(observer);
        if state.shape == DepsShape::Unstable {
            self.link(observer, source);
            return;
        }
        if !state.is_verifying() {
            return;
        }

        let Some(expected) = state.cursor else {
            // Past the recorded list: this run reads more than the last one.
            self.link(observer, source);
            return;
        };

        let edge = self
            .edge(expected)
            .expect("dependency cursor points at a removed edge");
        if edge.source == source {
            let next = edge.next_source;
            self.computation_mut(observer).cursor = next;
            return;
        }

        let keep_until = edge.prev_source;
        let state = self.computation_mut(observer);
        state.cursor = None;
        if state.shape == DepsShape::Speculative {
            state.shape = DepsShape::Unstable;
            debug!(node = %observer, "dependency order changed, switching to unstable tracking");
        }
        self.cleanup_sources(observer, keep_until);
        self.link(observer, source);
    }

    /// Finish a run: drop recorded sources this run never reached and seal
    /// fixed computations.
    pub(crate) fn finish_collect(&mut self, id: NodeId) {
        let state = self.computation(id);
        if state.is_verifying() {
            if let Some(unread) = state.cursor {
                let keep_until = self.edge(unread).and_then(|e| e.prev_source);
                self.cleanup_sources(id, keep_until);
            }
        }

        let state = self.computation_mut(id);
        state.cursor = None;
        if state.shape == DepsShape::Fixed {
            state.sealed = true;
        }
    }

    /// Unlink source edges from the tail back to, but not including,
    /// `until`. With `until == None` every source edge goes.
    ///
    /// A fixed computation stripped of all its sources is unsealed so its
    /// next run collects them again.
    pub(crate) fn cleanup_sources(&mut self, id: NodeId, until: Option<EdgeId>) {
        while let Some(last) = self.computation(id).last_source {
            if Some(last) == until {
                break;
            }
            self.unlink(last);
        }

        let state = self.computation_mut(id);
        if state.first_source.is_none() && state.shape == DepsShape::Fixed {
            state.sealed = false;
        }
    }
}

//! Evaluator
//!
//! Runs collect expressions with dependency recording and implements reads.
//!
//! A computation is evaluated two ways:
//!
//! - **Pull** ([`estimate`]): a stale computation is read outside a pass.
//!   It is recomputed on the spot, repeating while it keeps invalidating
//!   itself by reading its own value, until two runs agree.
//! - **Push** ([`reevaluate`]): the scheduler recomputes a computation once
//!   during a pass and reports whether its value changed.
//!
//! No graph borrow is held while user code runs.

use std::any::Any;
use std::mem;

use tracing::trace;

use crate::graph::{Collected, NodeId, Suspension, Value};

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// A collect expression borrowed for one evaluation.
pub(crate) type Expr<'a> = &'a dyn Fn(Option<&dyn Any>) -> Collected;

/// Result of reading a node.
pub(crate) struct Access {
    pub(crate) value: Option<Value>,
    /// The reader is a suspended computation and the node is mid-suspension.
    pub(crate) pending: bool,
}

/// Run `expr` once for `id` with dependency recording and return the value
/// to store.
fn run(rt: &Runtime, id: NodeId, expr: Expr<'_>) -> Option<Value> {
    let (previous, cancel) = {
        let mut graph = rt.graph.borrow_mut();
        graph.begin_collect(id);
        graph.record_evaluation();
        let node = graph.node_mut(id);
        let previous = node.value.clone();
        let suspense = node
            .computation_state_mut()
            .and_then(|state| state.suspense.as_mut());
        let cancel = match suspense {
            Some(suspense) => {
                let cancel = suspense.cancel.take();
                node.flags.suspending = true;
                cancel
            }
            None => None,
        };
        (previous, cancel)
    };

    let ctx = ReactiveContext::enter(id);
    if let Some(cancel) = cancel {
        cancel();
    }
    let outcome = expr(previous.as_deref());

    let value = {
        let mut graph = rt.graph.borrow_mut();
        let node = graph.node_mut(id);
        let value = match outcome {
            Ok(value) => {
                node.flags.suspending = false;
                Some(value)
            }
            Err(Suspension { fallback, cancel }) => {
                let suspense = node
                    .computation_state_mut()
                    .and_then(|state| state.suspense.as_mut());
                let fallback = match suspense {
                    Some(suspense) => {
                        suspense.cancel = cancel;
                        fallback.or_else(|| suspense.fallback.clone())
                    }
                    None => fallback,
                };
                fallback.or(previous)
            }
        };
        graph.finish_collect(id);
        value
    };
    drop(ctx);

    trace!(node = %id, "evaluated computation");
    value
}

/// Bring a stale computation up to date outside of a pass.
///
/// Repeats while the run marks the node stale again through a self-read and
/// produces a new value each time. A self-referential expression that never
/// converges loops forever.
pub(crate) fn estimate(rt: &Runtime, id: NodeId, expr: Expr<'_>) {
    {
        let mut graph = rt.graph.borrow_mut();
        let node = graph.node_mut(id);
        assert!(node.flags.stale, "node {id} estimated without being stale");
        node.flags.estimating = true;
    }

    loop {
        rt.graph.borrow_mut().node_mut(id).flags.stale = false;
        let value = run(rt, id, expr);

        let mut graph = rt.graph.borrow_mut();
        let node = graph.node_mut(id);
        let (settled, discarded) = if !node.flags.stale {
            (true, mem::replace(&mut node.value, value))
        } else if node.holds(value.as_ref()) {
            node.flags.stale = false;
            (true, value)
        } else {
            (false, mem::replace(&mut node.value, value))
        };
        if settled {
            node.flags.estimating = false;
        }
        drop(graph);
        drop(discarded);

        if settled {
            break;
        }
    }
}

/// Recompute a computation during a pass. Returns whether its value changed.
pub(crate) fn reevaluate(rt: &Runtime, id: NodeId) -> bool {
    let collect = rt
        .graph
        .borrow()
        .computation(id)
        .collect
        .clone()
        .unwrap_or_else(|| panic!("computation {id} has no expression to re-run"));
    let value = run(rt, id, &*collect);

    let mut graph = rt.graph.borrow_mut();
    let node = graph.node_mut(id);
    if node.holds(value.as_ref()) {
        drop(graph);
        drop(value);
        return false;
    }
    let previous = mem::replace(&mut node.value, value);
    drop(graph);
    drop(previous);
    true
}

/// Read a node on behalf of the current evaluator.
pub(crate) fn access(rt: &Runtime, id: NodeId) -> Access {
    let current = ReactiveContext::current();

    let expr = {
        let mut graph = rt.graph.borrow_mut();
        if let Some(current) = current {
            assert!(
                !graph.node(id).is_lazy(),
                "lazy computation {id} read inside the evaluation of {current}"
            );
            graph.record_access(current, id);
        }

        let node = graph.node_mut(id);
        if !node.is_computation() {
            None
        } else if node.flags.estimating {
            // Self-read while converging: the previous value, and another round.
            assert!(
                node.value.is_some(),
                "computation {id} was read through a dependency cycle before it had a value; \
                 give it an initial value"
            );
            node.flags.stale = true;
            None
        } else if node.flags.mark_for_check || !node.flags.stale {
            // Mid-pass the previous value is the only consistent one.
            None
        } else {
            let collect = graph.computation(id).collect.clone();
            Some(collect.unwrap_or_else(|| panic!("lazy computation {id} read without a pull")))
        }
    };

    if let Some(collect) = expr {
        estimate(rt, id, &*collect);
    }

    let graph = rt.graph.borrow();
    let node = graph.node(id);
    let pending = current.is_some_and(|current| {
        current != id && node.flags.suspending && graph.node(current).is_suspense()
    });
    Access {
        value: node.value.clone(),
        pending,
    }
}

/// Downcast an erased node value.
pub(crate) fn downcast<T: Clone + 'static>(id: NodeId, value: Option<Value>) -> T {
    value
        .as_deref()
        .and_then(|value| value.downcast_ref::<T>())
        .cloned()
        .unwrap_or_else(|| panic!("node {id} holds no value of the expected type"))
}

//! Reactive Primitives
//!
//! This module implements the user-facing side of the engine: cells,
//! memos, lazy computations and watchers, together with the thread-local
//! runtime that drives them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is the read half of a mutable cell; its [`Setter`] writes
//! it. Reading a signal inside a computation's expression makes the
//! computation depend on it.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result and re-evaluates
//! only when one of its dependencies changed. A suspended memo
//! ([`Memo::suspended`]) may defer to a fallback while a dependency is not
//! ready.
//!
//! ## Lazy computations
//!
//! A [`Lazy`] is never recomputed by propagation. Its watchers learn that
//! it went stale and its owner pulls the new value explicitly.
//!
//! ## Effects
//!
//! An [`Effect`] is a watcher registration: a callback that runs after a
//! propagation pass changed the watched node.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically: the runtime keeps a stack of
//! the computations being evaluated and records an edge on every read.
//! Writes are grouped into transactions; each outermost transaction runs
//! one propagation pass over the graph in [`crate::graph`].

mod context;
mod effect;
mod evaluator;
mod lazy;
mod memo;
mod runtime;
mod signal;
mod suspense;
mod traits;

pub use context::untrack;
pub use effect::{dispose, Effect};
pub use lazy::Lazy;
pub use memo::{Memo, MemoOptions};
pub use runtime::{batch, Runtime};
pub use signal::{signal, Setter, Signal};
pub use suspense::{Pending, Suspend};
pub use traits::{combine, Reactive};

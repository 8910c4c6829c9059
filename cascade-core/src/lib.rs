//! Cascade Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Mutable cells, cached derived computations and lazy computations
//! - Automatic dependency tracking with fixed, unstable and speculative
//!   dependency shapes
//! - Glitch-free propagation: every affected computation runs at most once
//!   per transaction, after all of its changed dependencies
//! - Tolerance of self- and mutually-referential computations
//! - Synchronous suspense with fallback values and cancel handles
//!
//! The engine is single-threaded and synchronous. Each thread owns an
//! independent runtime.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node and edge storage, dependency-shape tracking and the
//!   mark/propagate scheduler
//! - `reactive`: typed handles, evaluation, transactions and watchers
//! - `config`: runtime configuration
//! - `error`: protocol-violation errors
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use cascade_core::reactive::{signal, Memo, Reactive};
//!
//! // Create a cell
//! let (count, set_count) = signal(1);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Memo::new(move |_| c.get() * 2);
//!
//! // Watch it
//! let seen = Rc::new(Cell::new(0));
//! let seen_clone = seen.clone();
//! let _effect = doubled.watch(move |&v| seen_clone.set(v)).unwrap();
//!
//! // Update the cell: the watcher runs once with the new value
//! set_count.set(5).unwrap();
//! assert_eq!(seen.get(), 10);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{ReactiveError, ReactiveResult};
pub use graph::{DepsShape, GraphStats, NodeId, WatcherId};

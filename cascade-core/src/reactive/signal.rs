//! Signal Implementation
//!
//! A Signal is the read side of a cell, the mutable input of the graph.
//! Writes go through the matching [`Setter`].
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a computation's expression, the runtime
//!    records an edge from the computation to the cell.
//!
//! 2. A write stores the value and queues the cell in the current
//!    transaction, opening one if needed.
//!
//! 3. When the transaction ends, everything reachable from the written
//!    cells is brought up to date and watchers run.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::{value_eq, Node};

use super::evaluator;
use super::runtime::{NodeHandle, Runtime};
use super::traits::{sealed, Reactive};

/// A readable cell.
///
/// # Example
///
/// ```rust,ignore
/// let (count, set_count) = signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (propagates to dependents)
/// set_count.set(5)?;
/// ```
pub struct Signal<T> {
    handle: Rc<NodeHandle>,
    _marker: PhantomData<fn() -> T>,
}

/// Write access to a cell.
pub struct Setter<T> {
    handle: Rc<NodeHandle>,
    _marker: PhantomData<fn(T)>,
}

/// Create a cell and return its read and write halves.
pub fn signal<T>(initial: T) -> (Signal<T>, Setter<T>)
where
    T: Clone + PartialEq + 'static,
{
    let handle = Runtime::create(Node::cell(Rc::new(initial), value_eq::<T>));
    let setter = Setter {
        handle: Rc::clone(&handle),
        _marker: PhantomData,
    };
    (
        Signal {
            handle,
            _marker: PhantomData,
        },
        setter,
    )
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a cell that cannot be written: a constant.
    pub fn new(value: T) -> Self {
        signal(value).0
    }
}

impl<T> Setter<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Write a new value. A value equal to the current one is ignored.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        Runtime::write(self.handle.id(), Rc::new(value), true)
    }

    /// Write a new value and propagate even if it equals the current one.
    pub fn set_unchecked(&self, value: T) -> Result<(), ReactiveError> {
        Runtime::write(self.handle.id(), Rc::new(value), false)
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let id = self.handle.id();
        let current: T = evaluator::downcast(id, Runtime::stored_value(id));
        self.set(f(&current))
    }

    /// A read handle for the same cell.
    pub fn signal(&self) -> Signal<T> {
        Signal {
            handle: Rc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> sealed::Sealed for Signal<T> {
    fn handle(&self) -> &Rc<NodeHandle> {
        &self.handle
    }
}

impl<T> Reactive for Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    type Value = T;
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("id", &self.handle.id()).finish()
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter").field("id", &self.handle.id()).finish()
    }
}

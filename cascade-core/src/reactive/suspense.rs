//! Suspense
//!
//! A suspended computation may find that a value it needs is not ready
//! yet. Instead of unwinding, its expression returns `Err(Suspend)` and the
//! computation stores a fallback until a later pass delivers the real
//! value.
//!
//! Inside a suspended expression, [`Reactive::read`] returns
//! `Err(Pending)` for any node that is itself mid-suspension, and `?`
//! converts that into a [`Suspend`]:
//!
//! ```rust,ignore
//! let profile = Memo::suspended(
//!     move |_| Ok(format!("{} ({})", user.read()?, status.get())),
//!     "loading".to_string(),
//! );
//! ```
//!
//! A suspension can carry a cancel handle. The handle is invoked right
//! before the computation's next run, so at most one pending fallback ever
//! holds on to its resources.
//!
//! [`Reactive::read`]: super::Reactive::read

use std::fmt;
use std::rc::Rc;

use crate::graph::{CancelFn, Suspension, Value};

/// Read-level signal: the node just read is still suspending.
pub struct Pending {
    cancel: Option<CancelFn>,
}

impl Pending {
    /// A pending value with no cancel handle, as returned by
    /// [`Reactive::read`](super::Reactive::read).
    pub fn new() -> Self {
        Self { cancel: None }
    }

    /// A pending value that carries a cancel handle, run before the
    /// suspended computation's next attempt.
    ///
    /// [`Reactive::read`](super::Reactive::read) never attaches one; this
    /// is for pending values built by hand, such as a wrapper around a
    /// request still in flight.
    pub fn with_cancel(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Default for Pending {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl fmt::Display for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value is still pending")
    }
}

impl std::error::Error for Pending {}

/// Expression-level suspension of a suspended computation.
///
/// Without a fallback the computation's own fallback is stored.
pub struct Suspend<T> {
    fallback: Option<T>,
    cancel: Option<CancelFn>,
}

impl<T> Suspend<T> {
    /// Suspend with the computation's own fallback and no cancel handle.
    pub fn new() -> Self {
        Self {
            fallback: None,
            cancel: None,
        }
    }

    /// Store `fallback` instead of the computation's default fallback.
    pub fn with_fallback(fallback: T) -> Self {
        Self {
            fallback: Some(fallback),
            cancel: None,
        }
    }

    /// Set the cancel handle, replacing any previous one.
    pub fn on_cancel(mut self, cancel: impl FnOnce() + 'static) -> Self {
        self.cancel = Some(Box::new(cancel));
        self
    }

    pub(crate) fn erase(self) -> Suspension
    where
        T: 'static,
    {
        Suspension {
            fallback: self.fallback.map(|value| Rc::new(value) as Value),
            cancel: self.cancel,
        }
    }
}

impl<T> Default for Suspend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Pending> for Suspend<T> {
    fn from(pending: Pending) -> Self {
        Self {
            fallback: None,
            cancel: pending.cancel,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Suspend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspend")
            .field("fallback", &self.fallback)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

//! Error types for reactive operations
//!
//! Only protocol violations are errors: the caller did something the
//! engine refuses while a computation is being evaluated. The refused call
//! leaves the graph untouched. Broken internal invariants panic instead.

use thiserror::Error;

/// Result type for reactive operations
pub type ReactiveResult<T> = Result<T, ReactiveError>;

/// Operations refused while a computation is being evaluated
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReactiveError {
    /// A cell was written from inside a computation's expression
    #[error("cannot write a cell while a computation is being evaluated")]
    WriteDuringEvaluation,

    /// A watcher was registered from inside a computation's expression
    #[error("cannot register a watcher while a computation is being evaluated")]
    WatchDuringEvaluation,

    /// A lazy computation was pulled from inside a computation's expression
    #[error("cannot pull a lazy computation while a computation is being evaluated")]
    PullDuringEvaluation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        assert!(ReactiveError::WriteDuringEvaluation
            .to_string()
            .contains("write"));
        assert!(ReactiveError::PullDuringEvaluation
            .to_string()
            .contains("lazy"));
    }
}

//! Error types for jetcal.

use thiserror::Error;

/// jetcal error type.
///
/// Construction-time errors (`NameCollision`, `MissingColumn`, `TypeMismatch`,
/// `GraphFrozen`, `Formula`, `Correction`) surface at the call site that
/// mutated the graph. Runtime errors during a scheduler pass are wrapped in
/// `SchedulerFatal` and abort the whole batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Graph mutation attempted after the scheduler's first run.
    #[error("graph is frozen: {0}")]
    GraphFrozen(String),

    /// A Define name already exists in the node's ancestry.
    #[error("name collision: column '{0}' is already defined (use redefine)")]
    NameCollision(String),

    /// An action handle was dereferenced before `run()` completed.
    #[error("not yet computed: {0}")]
    NotYetComputed(String),

    /// A derived quantity was reached with a zero-magnitude denominator.
    #[error("division domain error: {0}")]
    DivisionDomain(String),

    /// A referenced column does not exist in the node's ancestry or the
    /// source table.
    #[error("missing column: '{0}'")]
    MissingColumn(String),

    /// A column has the wrong shape or element type for the requested use.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Formula parsing or compilation error.
    #[error("formula error: {0}")]
    Formula(String),

    /// Invalid correction specification.
    #[error("correction spec error: {0}")]
    Correction(String),

    /// A worker failed during the batched pass; no partial results survive.
    #[error("scheduler aborted: {0}")]
    SchedulerFatal(#[source] Box<Error>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a worker error into the batch-aborting variant.
    ///
    /// Already-wrapped errors are passed through unchanged so nested merge
    /// steps do not stack wrappers.
    pub fn fatal(err: Error) -> Error {
        match err {
            e @ Error::SchedulerFatal(_) => e,
            e => Error::SchedulerFatal(Box::new(e)),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_does_not_double_wrap() {
        let inner = Error::DivisionDomain("Tag_pt == 0".into());
        let wrapped = Error::fatal(inner);
        let rewrapped = Error::fatal(wrapped);
        match rewrapped {
            Error::SchedulerFatal(inner) => {
                assert!(matches!(*inner, Error::DivisionDomain(_)));
            }
            other => panic!("expected SchedulerFatal, got {other:?}"),
        }
    }
}

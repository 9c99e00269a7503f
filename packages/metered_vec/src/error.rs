use thiserror::Error;

/// Errors surfaced by the metered containers.
///
/// All four kinds propagate to the immediate caller; nothing is retried or
/// downgraded internally, and a failed operation leaves the container in a
/// well-defined (usually unmutated) state.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The quota ledger refused the charge, the requested byte count does not
    /// fit in `usize`, or the heap returned null.
    #[error("memory exhausted: the allocation quota or the underlying heap refused the request")]
    MemoryExhausted,

    /// An operation that would reallocate, free or take ownership action was
    /// invoked on a container borrowing external storage.
    #[error("operation would modify the capacity or ownership of borrowed external storage")]
    ExternalMemoryViolation,

    /// A shape-changing assignment was attempted through an alias whose
    /// element count does not match.
    #[error("element counts differ, and this access is not allowed to change the shape")]
    ConstViewViolation,

    /// An externally supplied value failed kind or shape validation at the
    /// host boundary.
    #[error("external value does not have the expected element kind or shape")]
    InvalidInput,
}

/// A specialized `Result` type for container operations, returning the shared
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

//! Shared error type for every module in this crate.
//!
//! Every fallible operation in this crate reports one of a small, fixed
//! set of failure kinds through `Result<T, Error>` rather than a bare
//! bool, sentinel value, or panic.

/// Result alias used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure kinds surfaced by the slab pool, queue, list, promise/future,
/// thread primitive layer, and work-stealing pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied argument violates a precondition (e.g. a zero
    /// capacity or a zero-sized payload).
    #[error("invalid argument")]
    InvalidArgument,

    /// A slab has no free fragments left to hand out.
    #[error("out of memory: slab exhausted")]
    OutOfMemory,

    /// A queue is empty, or a list/registry lookup found no entry for the
    /// given key.
    #[error("entry not found")]
    NotFound,

    /// A list insert targeted a key that is already present.
    #[error("entry already exists")]
    AlreadyExists,

    /// The structure is not in a state that allows the requested
    /// operation (e.g. operating on an uninitialized promise).
    #[error("invalid state for this operation")]
    BadState,

    /// The requested operation is a published-but-unimplemented
    /// collaborator (priority/affinity accessors, `deque`).
    #[error("operation not supported")]
    NotSupported,

    /// A blocking wait was interrupted before it could complete.
    #[error("operation interrupted")]
    Interrupted,

    /// The underlying OS primitive (thread spawn, signal delivery, ...)
    /// reported a failure; the wrapped value is the raw `errno`.
    #[error("OS error: {0}")]
    Os(i32),
}

impl Error {
    /// Wrap the current value of `errno` as an [`Error::Os`].
    pub(crate) fn from_errno() -> Self {
        Error::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// The wrapped raw OS error code, if this is an [`Error::Os`];
    /// `0` otherwise. Used by the thread trampoline to thread a real
    /// `errno` back through a promise's `isize` payload.
    pub(crate) fn os_code(&self) -> i32 {
        match self {
            Error::Os(code) => *code,
            _ => 0,
        }
    }
}

use thiserror::Error;

/// Errors raised by the pools in this crate.
///
/// Apart from [`InvalidCapacity`][Error::InvalidCapacity], every variant describes a programmer
/// error in the caller: a request that could never be satisfied or a release that does not match
/// the pool's bookkeeping. The plain `acquire()`/`release()` methods panic with these errors,
/// whereas the `checked_*` variants return them so the caller can decide what to do.
///
/// Whenever an operation fails with one of these errors, the state of the pool is left unchanged.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The pool or limiter was configured with a capacity it cannot operate with.
    #[error(
        "invalid capacity: a pool needs at least one slot and non-empty regions \
         (got {slot_count} slots, region size {region_size:?})"
    )]
    InvalidCapacity {
        /// The requested number of slots.
        slot_count: usize,

        /// The requested size of each buffer region, if the pool owns buffers.
        region_size: Option<usize>,
    },

    /// A limiter was asked for more units than it can ever grant.
    #[error("invalid amount: requested {requested} units from a limiter of capacity {capacity}")]
    InvalidAmount {
        /// The number of units requested.
        requested: usize,

        /// The total capacity of the limiter.
        capacity: usize,
    },

    /// A slot index was outside the range owned by the pool.
    #[error("slot index {index} does not belong to the pool [0, {capacity})")]
    OutOfRange {
        /// The offending index.
        index: usize,

        /// The number of slots in the pool.
        capacity: usize,
    },

    /// A slot was released while it was not claimed.
    #[error("slot {index} was already returned to the pool")]
    DoubleRelease {
        /// The index of the slot that was already free.
        index: usize,
    },

    /// A buffer was released to a pool whose storage it does not belong to.
    #[error("released buffer did not originate in this pool")]
    ForeignResource,

    /// A limiter was asked to take back more units than are currently in use.
    #[error("cannot release {released} units when only {in_use} are in use")]
    Underflow {
        /// The number of units the caller tried to release.
        released: usize,

        /// The number of units in use at the time of the release attempt.
        in_use: usize,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Fixed-capacity pools that are safe to share between threads and block when exhausted.
//!
//! This crate provides four pools that share one design: a fixed number of interchangeable
//! resources, an acquire operation that blocks the calling thread until a resource is available,
//! and a release operation that is checked against the pool's own bookkeeping.
//!
//! * [`SlotAllocator`] hands out indices in `[0, capacity)`, each to one holder at a time.
//! * [`FixedBufferPool`] hands out fixed-size byte buffers carved out of one allocation, using a
//!   [`SlotAllocator`] to track which buffers are in use.
//! * [`WeightedLimiter`] is a counting semaphore that grants multi-unit reservations.
//! * [`AllocatingLimiter`] allocates fresh buffers while keeping the total size of the
//!   outstanding buffers under a [`WeightedLimiter`].
//!
//! # Blocking and fairness
//!
//! Uncontended acquire and release are lock-free. When a pool is exhausted, `acquire()` parks the
//! thread until a release makes progress possible. There is no queue: a released resource goes
//! to whichever thread claims it first, so there is no fairness guarantee between waiters but also
//! no head-of-line blocking. There is no timeout or cancellation either; use the non-blocking
//! `try_acquire()` when waiting is not acceptable.
//!
//! # Misuse
//!
//! Releasing something the pool does not consider held (a slot index out of range, a slot that
//! is already free, a buffer from another pool, more limiter units than are in use) is a bug in
//! the caller. The plain `release()` methods panic in that case. The `checked_release()`
//! methods return an [`Error`] instead. Either way, the pool's state is left unchanged.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use bounded_pool::{ClearPolicy, FixedBufferPool};
//!
//! let pool = Arc::new(FixedBufferPool::new(4, 1024, ClearPolicy::Clear)?);
//!
//! let workers = (0..8)
//!     .map(|i| {
//!         let pool = Arc::clone(&pool);
//!
//!         thread::spawn(move || {
//!             // At most 4 of the 8 threads hold a buffer at any one time.
//!             let mut buffer = pool.acquire();
//!             buffer[0] = i;
//!             pool.release(buffer);
//!         })
//!     })
//!     .collect::<Vec<_>>();
//!
//! for worker in workers {
//!     worker.join().unwrap();
//! }
//!
//! assert_eq!(pool.in_use(), 0);
//! # Ok::<(), bounded_pool::Error>(())
//! ```

mod allocating_limiter;
mod buffer_pool;
mod builder;
mod clear_policy;
mod error;
mod limiter;
mod parking;
mod slot_allocator;

pub use allocating_limiter::*;
pub use buffer_pool::*;
pub use builder::*;
pub use clear_policy::*;
pub use error::*;
pub use limiter::*;
pub(crate) use parking::*;
pub use slot_allocator::*;

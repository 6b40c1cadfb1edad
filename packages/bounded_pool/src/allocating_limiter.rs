use crate::{Result, WeightedLimiter};

/// Limits the number of bytes held in buffers allocated through it.
///
/// Each [`acquire()`][Self::acquire] waits until the requested number of bytes fits within the
/// capacity and then allocates a fresh zeroed buffer of exactly that length. Each
/// [`release()`][Self::release] returns as many bytes as the buffer is long.
///
/// # Provenance is not checked
///
/// Only the total byte count is tracked, not which buffers were handed out. Any `Vec<u8>` can be
/// released, including one that did not come from this limiter, and a buffer that was shortened
/// before release returns fewer bytes than it took. Use [`FixedBufferPool`][crate::FixedBufferPool]
/// when buffer ownership needs to be verified.
///
/// # Example
///
/// ```rust
/// use bounded_pool::AllocatingLimiter;
///
/// let limiter = AllocatingLimiter::new(1024)?;
///
/// let buffer = limiter.acquire(1000);
/// assert_eq!(buffer.len(), 1000);
/// assert_eq!(limiter.limiter().available(), 24);
///
/// limiter.release(buffer);
/// assert_eq!(limiter.limiter().in_use(), 0);
/// # Ok::<(), bounded_pool::Error>(())
/// ```
#[derive(Debug)]
pub struct AllocatingLimiter {
    limiter: WeightedLimiter,
}

impl AllocatingLimiter {
    /// Creates a limiter that allows up to `capacity` bytes to be allocated at any given time.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`WeightedLimiter::new()`].
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            limiter: WeightedLimiter::new(capacity)?,
        })
    }

    /// The limiter that accounts for the allocated bytes.
    #[must_use]
    pub fn limiter(&self) -> &WeightedLimiter {
        &self.limiter
    }

    /// Waits until `len` bytes are available, then allocates a zeroed buffer of that length.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity of the limiter.
    #[must_use]
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        self.limiter.acquire(len);
        vec![0; len]
    }

    /// Waits until `len` bytes are available, then allocates a zeroed buffer of that length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`][crate::Error::InvalidAmount] without blocking if `len`
    /// exceeds the capacity of the limiter.
    pub fn checked_acquire(&self, len: usize) -> Result<Vec<u8>> {
        self.limiter.checked_acquire(len)?;
        Ok(vec![0; len])
    }

    /// Allocates a zeroed buffer of `len` bytes if that many bytes are available right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`][crate::Error::InvalidAmount] if `len` exceeds the
    /// capacity of the limiter.
    pub fn try_acquire(&self, len: usize) -> Result<Option<Vec<u8>>> {
        Ok(self.limiter.try_acquire(len)?.then(|| vec![0; len]))
    }

    /// Frees the buffer and returns its length in bytes to the limiter.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is longer than the number of bytes currently in use.
    #[expect(
        clippy::needless_pass_by_value,
        reason = "taking ownership is the point - the buffer is freed here"
    )]
    pub fn release(&self, buffer: Vec<u8>) {
        self.limiter.release(buffer.len());
    }

    /// Frees the buffer and returns its length in bytes to the limiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`][crate::Error::Underflow] if the buffer is longer than the
    /// number of bytes currently in use. The limiter is left unchanged in that case.
    #[expect(
        clippy::needless_pass_by_value,
        reason = "taking ownership is the point - the buffer is freed here"
    )]
    pub fn checked_release(&self, buffer: Vec<u8>) -> Result<()> {
        self.limiter.checked_release(buffer.len())
    }
}

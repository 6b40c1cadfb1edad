/// Determines whether buffer contents survive the trip through a [`FixedBufferPool`][1].
///
/// By default, the pool zeroes every buffer when it is released, so callers always receive
/// all-zero buffers from [`acquire()`][2].
///
/// # Examples
///
/// ```
/// use bounded_pool::{ClearPolicy, FixedBufferPool};
///
/// // The clear policy is set at pool creation time.
/// let pool = FixedBufferPool::builder()
///     .slot_count(4)
///     .region_size(1024)
///     .clear_policy(ClearPolicy::NoClear)
///     .build()?;
///
/// assert_eq!(pool.clear_policy(), ClearPolicy::NoClear);
/// # Ok::<(), bounded_pool::Error>(())
/// ```
///
/// [1]: crate::FixedBufferPool
/// [2]: crate::FixedBufferPool::acquire
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ClearPolicy {
    /// Buffers are zeroed before they become available again. This is the default.
    ///
    /// The cost of zeroing the full region is paid on every release.
    #[default]
    Clear,

    /// Buffers keep whatever contents the previous holder left in them.
    ///
    /// Callers must treat every acquired buffer as dirty.
    NoClear,
}

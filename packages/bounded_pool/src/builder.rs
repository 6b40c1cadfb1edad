use crate::{ClearPolicy, FixedBufferPool, Result};

/// Builder for creating an instance of [`FixedBufferPool`].
///
/// Both the slot count and the region size must be set to non-zero values before building.
///
/// # Examples
///
/// ```
/// use bounded_pool::{ClearPolicy, FixedBufferPool};
///
/// let pool = FixedBufferPool::builder()
///     .slot_count(10)
///     .region_size(1000)
///     .clear_policy(ClearPolicy::Clear)
///     .build()?;
///
/// assert_eq!(pool.slot_count(), 10);
/// assert_eq!(pool.region_size(), 1000);
/// # Ok::<(), bounded_pool::Error>(())
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct FixedBufferPoolBuilder {
    slot_count: usize,
    region_size: usize,
    clear_policy: ClearPolicy,
}

impl FixedBufferPoolBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the number of buffers in the pool.
    pub fn slot_count(mut self, slot_count: usize) -> Self {
        self.slot_count = slot_count;
        self
    }

    /// Sets the size in bytes of each buffer in the pool.
    pub fn region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    /// Sets the [clear policy][ClearPolicy] for the pool. This governs whether
    /// buffer contents are zeroed between holders.
    pub fn clear_policy(mut self, policy: ClearPolicy) -> Self {
        self.clear_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration, allocating all buffers up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`][crate::Error::InvalidCapacity] if the slot count or
    /// the region size is zero, or if the total size of the pool does not fit in memory.
    pub fn build(self) -> Result<FixedBufferPool> {
        FixedBufferPool::new(self.slot_count, self.region_size, self.clear_policy)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn default_builder_is_rejected() {
        assert_eq!(
            FixedBufferPool::builder().build().unwrap_err(),
            Error::InvalidCapacity {
                slot_count: 0,
                region_size: Some(0)
            }
        );
    }

    #[test]
    fn builder_applies_settings() {
        let pool = FixedBufferPool::builder()
            .slot_count(3)
            .region_size(16)
            .clear_policy(ClearPolicy::NoClear)
            .build()
            .unwrap();

        assert_eq!(pool.slot_count(), 3);
        assert_eq!(pool.region_size(), 16);
        assert_eq!(pool.clear_policy(), ClearPolicy::NoClear);
    }

    #[test]
    fn clear_policy_defaults_to_clear() {
        let pool = FixedBufferPool::builder()
            .slot_count(1)
            .region_size(1)
            .build()
            .unwrap();

        assert_eq!(pool.clear_policy(), ClearPolicy::Clear);
    }
}

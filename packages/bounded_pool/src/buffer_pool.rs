use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{ClearPolicy, Error, FixedBufferPoolBuilder, Result, SlotAllocator};

/// A pool of fixed-size byte buffers with a fixed number of slots.
///
/// All buffers are carved out of one contiguous allocation made when the pool is created. Each
/// buffer occupies its own region of `region_size` bytes; regions never overlap and never move
/// for the lifetime of the pool.
///
/// [`acquire()`][Self::acquire] returns a [`PooledBuffer`], which gives exclusive access to one
/// region and returns it to the pool when dropped or passed to [`release()`][Self::release].
/// If every buffer is in use, `acquire()` blocks until one is released.
///
/// # Raw buffers
///
/// A [`PooledBuffer`] borrows the pool. When that is inconvenient, the buffer can be detached
/// via [`PooledBuffer::into_raw()`], which yields a [`RawBuffer`] token that identifies the
/// region by its storage address. Raw buffers must be returned explicitly via
/// [`release_raw()`][Self::release_raw], which matches the token against the regions owned by
/// the pool and rejects tokens that belong to another pool or that were already released.
///
/// # Example
///
/// ```rust
/// use bounded_pool::{ClearPolicy, FixedBufferPool};
///
/// let pool = FixedBufferPool::new(2, 1024, ClearPolicy::Clear)?;
///
/// let mut buffer = pool.acquire();
/// buffer[..5].copy_from_slice(b"hello");
/// assert_eq!(&buffer[..5], b"hello");
///
/// pool.release(buffer);
///
/// // The clear policy guarantees a clean buffer next time.
/// let buffer = pool.acquire();
/// assert!(buffer.iter().all(|&b| b == 0));
/// # Ok::<(), bounded_pool::Error>(())
/// ```
pub struct FixedBufferPool {
    storage: NonNull<u8>,
    layout: Layout,

    region_size: usize,
    clear_policy: ClearPolicy,

    slots: SlotAllocator,

    /// Per-slot release counters. A handle remembers the value at the time it was acquired and a
    /// release must advance the counter from exactly that value. This makes stale raw buffers
    /// (released once already, possibly with the slot handed to someone else since) detectable
    /// and guarantees that at most one release of a given acquisition can ever succeed.
    generations: Box<[AtomicUsize]>,
}

// SAFETY: The pool owns its storage exclusively. Each region is only ever accessed by the holder
// of the slot that owns it, and slot ownership is transferred between threads via atomic
// operations that establish the required happens-before relationships.
unsafe impl Send for FixedBufferPool {}

// SAFETY: See above - shared access to the pool never grants access to a region without first
// claiming its slot, so no two threads can access the same region concurrently.
unsafe impl Sync for FixedBufferPool {}

impl FixedBufferPool {
    /// Creates a pool of `slot_count` buffers, each `region_size` bytes long.
    ///
    /// All buffers are allocated and zeroed up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if either argument is zero or if the total size of the
    /// pool does not fit in memory.
    pub fn new(slot_count: usize, region_size: usize, clear_policy: ClearPolicy) -> Result<Self> {
        let invalid_capacity = || Error::InvalidCapacity {
            slot_count,
            region_size: Some(region_size),
        };

        if slot_count == 0 || region_size == 0 {
            return Err(invalid_capacity());
        }

        let layout = slot_count
            .checked_mul(region_size)
            .and_then(|total_size| Layout::array::<u8>(total_size).ok())
            .ok_or_else(invalid_capacity)?;

        let slots = SlotAllocator::new(slot_count)?;

        // SAFETY: The layout is not zero-sized because both factors are non-zero.
        let storage = NonNull::new(unsafe { alloc_zeroed(layout) }).expect(
            "we do not intend to handle allocation failure as a real possibility - OOM is panic",
        );

        tracing::debug!(
            slot_count,
            region_size,
            ?clear_policy,
            "creating fixed buffer pool"
        );

        Ok(Self {
            storage,
            layout,
            region_size,
            clear_policy,
            slots,
            generations: (0..slot_count).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    /// Starts building a new [`FixedBufferPool`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use bounded_pool::FixedBufferPool;
    ///
    /// let pool = FixedBufferPool::builder()
    ///     .slot_count(8)
    ///     .region_size(4096)
    ///     .build()?;
    ///
    /// assert_eq!(pool.slot_count(), 8);
    /// # Ok::<(), bounded_pool::Error>(())
    /// ```
    pub fn builder() -> FixedBufferPoolBuilder {
        FixedBufferPoolBuilder::new()
    }

    /// The number of buffers in the pool.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.capacity()
    }

    /// The size in bytes of each buffer in the pool.
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Whether buffers are zeroed between holders.
    #[must_use]
    pub fn clear_policy(&self) -> ClearPolicy {
        self.clear_policy
    }

    /// The number of buffers currently held by callers, including detached raw buffers.
    ///
    /// This is a snapshot that may already be outdated by the time it is returned.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.slots.claimed()
    }

    /// Takes a buffer from the pool, blocking until one becomes available.
    ///
    /// With [`ClearPolicy::Clear`], the buffer is all zeros. With [`ClearPolicy::NoClear`], it
    /// contains whatever the previous holder left in it.
    #[must_use]
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let index = self.slots.acquire();
        self.claimed_buffer(index)
    }

    /// Takes a buffer from the pool if one is available, without blocking.
    #[must_use]
    pub fn try_acquire(&self) -> Option<PooledBuffer<'_>> {
        self.slots
            .try_acquire()
            .map(|index| self.claimed_buffer(index))
    }

    /// Returns a buffer to the pool.
    ///
    /// Dropping the buffer has the same effect; this method exists to make the return explicit
    /// and to verify that the buffer belongs to this pool.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was acquired from a different pool. The buffer is still returned to
    /// the pool it came from.
    pub fn release(&self, buffer: PooledBuffer<'_>) {
        if let Err(e) = self.checked_release(buffer) {
            panic!("{e}");
        }
    }

    /// Returns a buffer to the pool, reporting a buffer from a different pool as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignResource`] if the buffer was acquired from a different pool. In
    /// that case this pool is left unchanged and the buffer is returned to the pool it came from.
    pub fn checked_release(&self, buffer: PooledBuffer<'_>) -> Result<()> {
        if !ptr::eq(buffer.pool, self) {
            tracing::warn!(error = %Error::ForeignResource, "rejected buffer release");
            // Dropping returns the buffer to its real owner.
            drop(buffer);
            return Err(Error::ForeignResource);
        }

        // Dropping the handle releases the slot it holds.
        drop(buffer);
        Ok(())
    }

    /// Returns a raw buffer to the pool.
    ///
    /// # Panics
    ///
    /// Panics if the raw buffer does not refer to a region of this pool or if it was already
    /// released.
    pub fn release_raw(&self, buffer: RawBuffer) {
        if let Err(e) = self.checked_release_raw(buffer) {
            panic!("{e}");
        }
    }

    /// Returns a raw buffer to the pool, reporting misuse as an error.
    ///
    /// The raw buffer is matched to its slot by comparing its storage address with the start
    /// address of every region owned by the pool. Contents and length play no part in the match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignResource`] if no region of this pool starts at the raw buffer's
    /// address and [`Error::DoubleRelease`] if the buffer was already released. The pool is left
    /// unchanged in both cases.
    pub fn checked_release_raw(&self, buffer: RawBuffer) -> Result<()> {
        let Some(index) = (0..self.slot_count()).find(|&index| {
            ptr::eq(self.region_ptr(index).cast_const(), buffer.ptr.as_ptr())
        }) else {
            tracing::warn!(error = %Error::ForeignResource, "rejected raw buffer release");
            return Err(Error::ForeignResource);
        };

        self.release_slot(index, buffer.generation).inspect_err(|error| {
            tracing::warn!(%error, "rejected raw buffer release");
        })
    }

    /// Turns a raw buffer back into a [`PooledBuffer`] that is returned to the pool on drop.
    ///
    /// # Safety
    ///
    /// The raw buffer must have been created by [`PooledBuffer::into_raw()`] on a buffer from this
    /// pool. It must not have been released yet and must not have been converted back already;
    /// each raw buffer may be converted back at most once. Neither the raw buffer nor any copy of
    /// it may be passed to [`release_raw()`][Self::release_raw] afterwards, as the returned
    /// [`PooledBuffer`] now owns the claim.
    #[must_use]
    pub unsafe fn buffer_from_raw(&self, buffer: RawBuffer) -> PooledBuffer<'_> {
        // SAFETY: Forwarding guarantee from the caller - the buffer belongs to this pool,
        // so its address is the start of one of our regions.
        let offset = unsafe { buffer.ptr.as_ptr().offset_from(self.storage.as_ptr()) };

        let index = usize::try_from(offset)
            .ok()
            .and_then(|offset| offset.checked_div(self.region_size))
            .expect("raw buffer must originate in this pool");

        debug_assert!(self.slots.is_claimed(index));
        debug_assert_eq!(
            self.generations
                .get(index)
                .map(|generation| generation.load(Ordering::SeqCst)),
            Some(buffer.generation)
        );

        PooledBuffer {
            pool: self,
            index,
            generation: buffer.generation,
            len: buffer.len,
        }
    }

    fn claimed_buffer(&self, index: usize) -> PooledBuffer<'_> {
        let generation = self
            .generations
            .get(index)
            .expect("slot allocator only hands out indices in range")
            .load(Ordering::SeqCst);

        PooledBuffer {
            pool: self,
            index,
            generation,
            len: self.region_size,
        }
    }

    /// Releases the slot at `index` if `generation` identifies its current acquisition.
    fn release_slot(&self, index: usize, generation: usize) -> Result<()> {
        let counter = self
            .generations
            .get(index)
            .ok_or_else(|| Error::OutOfRange {
                index,
                capacity: self.slot_count(),
            })?;

        // Winning this exchange makes us the only party that may touch the region until the
        // slot is freed below. A stale handle finds the counter already advanced.
        if counter
            .compare_exchange(
                generation,
                generation.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(Error::DoubleRelease { index });
        }

        if self.clear_policy == ClearPolicy::Clear {
            // SAFETY: We hold the only claim on this region (see above) and the region is
            // `region_size` bytes long and valid for writes.
            unsafe {
                self.region_ptr(index).write_bytes(0, self.region_size);
            }
        }

        self.slots.checked_release(index)
    }

    fn region_ptr(&self, index: usize) -> *mut u8 {
        let offset = index
            .checked_mul(self.region_size)
            .expect("index is in range, so the offset is within the allocation");

        debug_assert!(offset < self.layout.size());

        // SAFETY: The offset is within the allocation because index < slot_count.
        unsafe { self.storage.as_ptr().add(offset) }
    }
}

impl fmt::Debug for FixedBufferPool {
    #[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBufferPool")
            .field("slot_count", &self.slot_count())
            .field("region_size", &self.region_size)
            .field("clear_policy", &self.clear_policy)
            .field("in_use", &self.in_use())
            .finish_non_exhaustive()
    }
}

impl Drop for FixedBufferPool {
    #[cfg_attr(test, mutants::skip)] // Impractical to test deallocation - Miri will complain if we leak.
    fn drop(&mut self) {
        // SAFETY: We allocated this memory with this layout in `new()`. No buffers can outlive
        // the pool because they borrow it, and raw buffers cannot access memory without it.
        unsafe {
            dealloc(self.storage.as_ptr(), self.layout);
        }
    }
}

/// Exclusive access to one buffer of a [`FixedBufferPool`].
///
/// Dereferences to `[u8]`. The buffer is returned to the pool when dropped.
///
/// The visible length can be reduced via [`truncate()`][Self::truncate] and restored via
/// [`reset_len()`][Self::reset_len]. The underlying storage never changes, so a buffer can never
/// grow beyond the pool's region size.
pub struct PooledBuffer<'a> {
    pool: &'a FixedBufferPool,
    index: usize,
    generation: usize,
    len: usize,
}

impl PooledBuffer<'_> {
    /// The size of the region backing this buffer, which is the maximum visible length.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.region_size
    }

    /// Shortens the visible part of the buffer to `len` bytes.
    ///
    /// Has no effect if `len` is greater than the current length.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Makes the entire region visible again.
    pub fn reset_len(&mut self) {
        self.len = self.pool.region_size;
    }

    /// Detaches the buffer from the pool borrow, returning a token that identifies its region.
    ///
    /// The buffer stays claimed until the token is passed to
    /// [`FixedBufferPool::release_raw()`] or converted back via
    /// [`FixedBufferPool::buffer_from_raw()`]. A token that is simply forgotten leaks the buffer
    /// for the lifetime of the pool.
    #[must_use]
    pub fn into_raw(self) -> RawBuffer {
        let this = ManuallyDrop::new(self);

        RawBuffer {
            ptr: NonNull::new(this.pool.region_ptr(this.index))
                .expect("regions are inside a non-null allocation"),
            len: this.len,
            generation: this.generation,
        }
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: We hold the claim on this region, so nobody else is accessing it, and the
        // region is valid for `len <= region_size` bytes for as long as the pool is borrowed.
        unsafe { std::slice::from_raw_parts(self.pool.region_ptr(self.index), self.len) }
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in `deref()`, plus we have exclusive access to the handle.
        unsafe { std::slice::from_raw_parts_mut(self.pool.region_ptr(self.index), self.len) }
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool
            .release_slot(self.index, self.generation)
            .expect("a live buffer handle always holds the current claim on its slot");
    }
}

impl fmt::Debug for PooledBuffer<'_> {
    #[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("index", &self.index)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// A buffer detached from its [`FixedBufferPool`] via [`PooledBuffer::into_raw()`].
///
/// This is only a token: it identifies the region by the address of its storage and remembers
/// the visible length, but does not grant access to the contents. Return it to the pool via
/// [`FixedBufferPool::release_raw()`] or turn it back into a [`PooledBuffer`] via
/// [`FixedBufferPool::buffer_from_raw()`].
///
/// Copies of the token all refer to the same acquisition; only the first release succeeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
    generation: usize,
}

// SAFETY: The pointer is only used as an identity by the pool; the token itself never
// dereferences it, so moving it between threads is harmless.
unsafe impl Send for RawBuffer {}

// SAFETY: See above.
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    /// The address of the region's storage.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr().cast_const()
    }

    /// The visible length of the buffer at the time it was detached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the visible length of the buffer was zero at the time it was detached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

use std::sync::atomic::{AtomicU8, Ordering};

use crate::{Error, Parking, Result};

const FREE: u8 = 0;
const CLAIMED: u8 = 1;

/// Hands out indices in the range `[0, capacity)`, each to at most one holder at a time.
///
/// The indices are not very useful on their own; typically the allocator is embedded in another
/// type that maps each index to a resource, as [`FixedBufferPool`][crate::FixedBufferPool] does
/// with its buffer regions.
///
/// Acquiring scans the slots in index order and claims the first free one with an atomic
/// compare-and-swap, so uncontended acquire and release never take a lock. When every slot is
/// claimed, [`acquire()`][Self::acquire] parks the calling thread until a slot is released.
///
/// There is no fairness between blocked callers: a released slot goes to whichever thread claims
/// it first, which may be a thread that never had to wait.
///
/// # Example
///
/// ```rust
/// use bounded_pool::SlotAllocator;
///
/// let slots = SlotAllocator::new(2)?;
///
/// let first = slots.acquire();
/// let second = slots.acquire();
/// assert_ne!(first, second);
/// assert!(slots.try_acquire().is_none());
///
/// slots.release(first);
/// assert_eq!(slots.try_acquire(), Some(first));
/// # Ok::<(), bounded_pool::Error>(())
/// ```
#[derive(Debug)]
pub struct SlotAllocator {
    slots: Box<[AtomicU8]>,
    parking: Parking,
}

impl SlotAllocator {
    /// Creates an allocator with `capacity` slots, all of them free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity {
                slot_count: capacity,
                region_size: None,
            });
        }

        tracing::debug!(capacity, "creating slot allocator");

        Ok(Self {
            slots: (0..capacity).map(|_| AtomicU8::new(FREE)).collect(),
            parking: Parking::new(),
        })
    }

    /// The number of slots managed by the allocator.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of slots that are currently claimed.
    ///
    /// This is a snapshot that may already be outdated by the time it is returned if other
    /// threads are concurrently acquiring or releasing slots.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.load(Ordering::SeqCst) == CLAIMED)
            .count()
    }

    /// Whether the slot at `index` is currently claimed.
    ///
    /// Indices outside the allocator's range are never claimed.
    #[must_use]
    pub fn is_claimed(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.load(Ordering::SeqCst) == CLAIMED)
    }

    /// Claims a free slot and returns its index, blocking until one becomes available.
    ///
    /// The returned index must eventually be passed to [`release()`][Self::release], otherwise
    /// the slot remains claimed for the lifetime of the allocator.
    #[must_use]
    pub fn acquire(&self) -> usize {
        self.parking.wait_until(|| self.try_acquire())
    }

    /// Claims a free slot and returns its index, or `None` if every slot is claimed.
    ///
    /// This makes a single pass over all the slots and never blocks.
    #[must_use]
    pub fn try_acquire(&self) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.compare_exchange(FREE, CLAIMED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        })
    }

    /// Returns a previously acquired slot to the allocator.
    ///
    /// If any callers are blocked in [`acquire()`][Self::acquire], one of them is woken up.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or if the slot is not currently claimed. Either case
    /// means the caller has lost track of which slots it owns.
    pub fn release(&self, index: usize) {
        if let Err(e) = self.checked_release(index) {
            panic!("{e}");
        }
    }

    /// Returns a previously acquired slot to the allocator, reporting misuse as an error.
    ///
    /// If any callers are blocked in [`acquire()`][Self::acquire], one of them is woken up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `index` is not in `[0, capacity)` and
    /// [`Error::DoubleRelease`] if the slot is not currently claimed. The allocator is left
    /// unchanged in both cases.
    pub fn checked_release(&self, index: usize) -> Result<()> {
        let Some(slot) = self.slots.get(index) else {
            let error = Error::OutOfRange {
                index,
                capacity: self.capacity(),
            };
            tracing::warn!(%error, "rejected slot release");
            return Err(error);
        };

        // A swap (rather than a load followed by a store) guarantees that two racing releases
        // of the same index cannot both succeed.
        if slot
            .compare_exchange(CLAIMED, FREE, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let error = Error::DoubleRelease { index };
            tracing::warn!(%error, "rejected slot release");
            return Err(error);
        }

        // Capacity grows by exactly one slot, so waking one waiter is enough.
        self.parking.notify_one();

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.parking.waiting()
    }
}

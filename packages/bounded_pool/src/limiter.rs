use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Parking, Result};

/// Limits the number of units of some resource that are in use at the same time.
///
/// This is a counting semaphore that grants reservations of any size up to its capacity. Units
/// are fungible: a release only has to return the same number of units as were acquired, not any
/// particular handle.
///
/// Acquiring units is an optimistic compare-and-swap on the in-use counter that only commits when
/// the request fits. When it does not fit, the caller parks until some units are released. Every
/// release wakes all parked callers, because returning `n` units may satisfy several smaller
/// requests at once and the limiter does not track who is waiting for how much.
///
/// There is no fairness between blocked callers. A large request may keep waiting while a
/// stream of smaller requests is granted.
///
/// # Example
///
/// ```rust
/// use bounded_pool::WeightedLimiter;
///
/// let limiter = WeightedLimiter::new(10)?;
///
/// limiter.acquire(7);
/// assert_eq!(limiter.available(), 3);
/// assert!(!limiter.try_acquire(4)?);
///
/// limiter.release(7);
/// assert_eq!(limiter.in_use(), 0);
/// # Ok::<(), bounded_pool::Error>(())
/// ```
#[derive(Debug)]
pub struct WeightedLimiter {
    capacity: usize,
    in_use: AtomicUsize,
    parking: Parking,
}

impl WeightedLimiter {
    /// Creates a limiter that allows up to `capacity` units to be in use at the same time.
    ///
    /// A capacity of zero is permitted; such a limiter only grants zero-unit requests.
    ///
    /// # Errors
    ///
    /// Every `usize` is a valid capacity, so this does not currently fail. It returns a `Result`
    /// for consistency with the other pools in this crate.
    pub fn new(capacity: usize) -> Result<Self> {
        tracing::debug!(capacity, "creating weighted limiter");

        Ok(Self {
            capacity,
            in_use: AtomicUsize::new(0),
            parking: Parking::new(),
        })
    }

    /// The maximum number of units that may be in use at the same time.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of units currently in use.
    ///
    /// This is a snapshot that may already be outdated by the time it is returned.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// The number of units that could currently be acquired without blocking.
    ///
    /// This is a snapshot that may already be outdated by the time it is returned.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }

    /// Acquires `amount` units, blocking until they are available.
    ///
    /// # Panics
    ///
    /// Panics if `amount` exceeds the capacity of the limiter, as such a request could never
    /// be satisfied.
    pub fn acquire(&self, amount: usize) {
        if let Err(e) = self.checked_acquire(amount) {
            panic!("{e}");
        }
    }

    /// Acquires `amount` units, blocking until they are available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] without blocking if `amount` exceeds the capacity of the
    /// limiter, as such a request could never be satisfied.
    pub fn checked_acquire(&self, amount: usize) -> Result<()> {
        self.validate_amount(amount)?;

        self.parking
            .wait_until(|| self.try_reserve(amount).then_some(()));

        Ok(())
    }

    /// Acquires `amount` units if they are available right now.
    ///
    /// Returns `Ok(false)` if there are not enough units available at the moment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] if `amount` exceeds the capacity of the limiter.
    pub fn try_acquire(&self, amount: usize) -> Result<bool> {
        self.validate_amount(amount)?;

        Ok(self.try_reserve(amount))
    }

    /// Returns `amount` units to the limiter and wakes up every blocked acquirer.
    ///
    /// # Panics
    ///
    /// Panics if more units are released than are currently in use.
    pub fn release(&self, amount: usize) {
        if let Err(e) = self.checked_release(amount) {
            panic!("{e}");
        }
    }

    /// Returns `amount` units to the limiter and wakes up every blocked acquirer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if more units are released than are currently in use. The
    /// limiter is left unchanged in that case.
    pub fn checked_release(&self, amount: usize) -> Result<()> {
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |in_use| {
                in_use.checked_sub(amount)
            })
            .map_err(|in_use| {
                let error = Error::Underflow {
                    released: amount,
                    in_use,
                };
                tracing::warn!(%error, "rejected limiter release");
                error
            })?;

        self.parking.notify_all();

        Ok(())
    }

    fn validate_amount(&self, amount: usize) -> Result<()> {
        if amount > self.capacity {
            let error = Error::InvalidAmount {
                requested: amount,
                capacity: self.capacity,
            };
            tracing::warn!(%error, "rejected limiter acquire");
            return Err(error);
        }

        Ok(())
    }

    /// Commits the reservation if it fits. A lost race against another thread retries with the
    /// fresh value instead of giving up, so `false` always means "not enough units right now".
    fn try_reserve(&self, amount: usize) -> bool {
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |in_use| {
                in_use
                    .checked_add(amount)
                    .filter(|&candidate| candidate <= self.capacity)
            })
            .is_ok()
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.parking.waiting()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use static_assertions::assert_impl_all;
    use testing::{spawn_blocking_call, wait_for, with_watchdog};

    use super::*;

    assert_impl_all!(WeightedLimiter: Send, Sync);

    #[test]
    fn zero_capacity_grants_only_zero() {
        let limiter = WeightedLimiter::new(0).unwrap();

        limiter.acquire(0);
        assert_eq!(limiter.in_use(), 0);

        assert_eq!(
            limiter.checked_acquire(1),
            Err(Error::InvalidAmount {
                requested: 1,
                capacity: 0
            })
        );
    }

    #[test]
    fn oversized_request_fails_fast() {
        let limiter = WeightedLimiter::new(1).unwrap();

        assert_eq!(
            limiter.checked_acquire(2),
            Err(Error::InvalidAmount {
                requested: 2,
                capacity: 1
            })
        );
        assert_eq!(
            limiter.try_acquire(2),
            Err(Error::InvalidAmount {
                requested: 2,
                capacity: 1
            })
        );
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    #[should_panic]
    fn oversized_acquire_panics() {
        WeightedLimiter::new(1).unwrap().acquire(2);
    }

    #[test]
    fn underflow_is_rejected() {
        let limiter = WeightedLimiter::new(1).unwrap();

        assert_eq!(
            limiter.checked_release(2),
            Err(Error::Underflow {
                released: 2,
                in_use: 0
            })
        );

        limiter.acquire(1);
        assert_eq!(
            limiter.checked_release(2),
            Err(Error::Underflow {
                released: 2,
                in_use: 1
            })
        );

        // State is unchanged.
        assert_eq!(limiter.in_use(), 1);
    }

    #[test]
    #[should_panic]
    fn underflow_panics() {
        WeightedLimiter::new(1).unwrap().release(1);
    }

    #[test]
    fn try_acquire_respects_capacity() {
        let limiter = WeightedLimiter::new(10).unwrap();

        assert_eq!(limiter.try_acquire(6), Ok(true));
        assert_eq!(limiter.try_acquire(5), Ok(false));
        assert_eq!(limiter.try_acquire(4), Ok(true));
        assert_eq!(limiter.in_use(), 10);
        assert_eq!(limiter.available(), 0);

        // Releases need not mirror the acquisitions.
        limiter.release(3);
        limiter.release(7);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn full_limiter_blocks_until_release() {
        with_watchdog(|| {
            let limiter = Arc::new(WeightedLimiter::new(10).unwrap());
            limiter.acquire(10);

            let waiter = spawn_blocking_call({
                let limiter = Arc::clone(&limiter);
                move || limiter.acquire(1)
            });

            waiter.assert_blocked_for(Duration::from_millis(10));

            limiter.release(1);
            waiter.join();

            assert_eq!(limiter.in_use(), 10);
        });
    }

    #[test]
    fn one_release_satisfies_several_waiters() {
        with_watchdog(|| {
            let limiter = Arc::new(WeightedLimiter::new(4).unwrap());
            limiter.acquire(4);

            let waiters = (0..4)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    spawn_blocking_call(move || limiter.acquire(1))
                })
                .collect::<Vec<_>>();

            wait_for(|| limiter.waiting() == 4);

            limiter.release(4);

            for waiter in waiters {
                waiter.join();
            }

            assert_eq!(limiter.in_use(), 4);
        });
    }

    #[test]
    fn in_use_stays_within_capacity_under_contention() {
        with_watchdog(|| {
            const CAPACITY: usize = 10;
            const THREADS: usize = 8;
            const ITERATIONS: usize = 1000;

            let limiter = Arc::new(WeightedLimiter::new(CAPACITY).unwrap());
            let observed_max = Arc::new(AtomicUsize::new(0));

            let workers = (0..THREADS)
                .map(|worker| {
                    let limiter = Arc::clone(&limiter);
                    let observed_max = Arc::clone(&observed_max);

                    thread::spawn(move || {
                        let amount = worker % 4 + 1;

                        for _ in 0..ITERATIONS {
                            limiter.acquire(amount);

                            let in_use = limiter.in_use();
                            assert!(in_use >= amount && in_use <= CAPACITY);
                            observed_max.fetch_max(in_use, Ordering::SeqCst);

                            thread::yield_now();
                            limiter.release(amount);
                        }
                    })
                })
                .collect::<Vec<_>>();

            for worker in workers {
                worker.join().unwrap();
            }

            assert!(observed_max.load(Ordering::SeqCst) <= CAPACITY);
            assert_eq!(limiter.in_use(), 0);
        });
    }
}

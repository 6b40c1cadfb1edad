//! Integration tests for `bounded_pool`, exercising the public API across threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use bounded_pool::{
    AllocatingLimiter, ClearPolicy, Error, FixedBufferPool, SlotAllocator, WeightedLimiter,
};
use testing::{spawn_blocking_call, with_watchdog};

const PATIENCE: Duration = Duration::from_millis(10);

#[test]
fn buffer_pool_blocks_when_exhausted_and_rejects_foreign_buffers() {
    with_watchdog(|| {
        let pool = Arc::new(FixedBufferPool::new(10, 1000, ClearPolicy::Clear).unwrap());

        // Take every buffer, keeping them detached so they can outlive this borrow scope.
        let mut held = (0..10)
            .map(|_| pool.acquire().into_raw())
            .collect::<Vec<_>>();
        let got = held.pop().unwrap();

        let eleventh = spawn_blocking_call({
            let pool = Arc::clone(&pool);
            move || pool.acquire().into_raw()
        });

        eleventh.assert_blocked_for(PATIENCE);

        // Modify the buffer we got (shrinking it, as a caller may) and return it.
        // SAFETY: The raw buffer came from this pool and was neither released nor restored.
        let mut buffer = unsafe { pool.buffer_from_raw(got) };
        buffer[0] = 1;
        buffer.truncate(1);
        pool.release(buffer);

        let eleventh = eleventh.join();
        assert_eq!(eleventh.as_ptr(), got.as_ptr());
        held.push(eleventh);

        // A 1000-byte buffer that the pool does not own is rejected.
        let foreign_pool = FixedBufferPool::new(1, 1000, ClearPolicy::Clear).unwrap();
        let foreign = foreign_pool.acquire().into_raw();

        assert_eq!(
            pool.checked_release_raw(foreign),
            Err(Error::ForeignResource)
        );
        assert_eq!(pool.in_use(), 10);

        foreign_pool.release_raw(foreign);
        for raw in held {
            pool.release_raw(raw);
        }
        assert_eq!(pool.in_use(), 0);
    });
}

#[test]
fn buffer_pool_release_twice_is_double_release() {
    let pool = FixedBufferPool::new(1, 64, ClearPolicy::Clear).unwrap();

    let raw = pool.acquire().into_raw();
    pool.release_raw(raw);

    assert_eq!(
        pool.checked_release_raw(raw),
        Err(Error::DoubleRelease { index: 0 })
    );
}

#[test]
fn buffer_pool_with_clear_policy_never_leaks_contents() {
    let pool = FixedBufferPool::new(2, 256, ClearPolicy::Clear).unwrap();

    for round in 1..=10_u8 {
        let mut first = pool.acquire();
        let mut second = pool.acquire();

        assert!(first.iter().chain(second.iter()).all(|&b| b == 0));

        first.fill(round);
        second.fill(round);
    }
}

#[test]
fn slot_allocator_rejects_invalid_use() {
    assert!(matches!(
        SlotAllocator::new(0),
        Err(Error::InvalidCapacity { slot_count: 0, .. })
    ));

    let slots = SlotAllocator::new(1).unwrap();
    assert_eq!(
        slots.checked_release(0),
        Err(Error::DoubleRelease { index: 0 })
    );
    assert_eq!(
        slots.checked_release(1),
        Err(Error::OutOfRange {
            index: 1,
            capacity: 1
        })
    );
}

#[test]
fn slot_allocator_round_trip_on_idle_pool() {
    let slots = SlotAllocator::new(3).unwrap();

    let index = slots.acquire();
    slots.release(index);

    assert_eq!(slots.claimed(), 0);
    assert_eq!(slots.try_acquire(), Some(index));
}

#[test]
fn slot_allocator_get_and_put_under_contention() {
    with_watchdog(|| {
        const CAPACITY: usize = 10;

        let slots = Arc::new(SlotAllocator::new(CAPACITY).unwrap());
        let concurrent = Arc::new(AtomicUsize::new(0));

        let workers = (0..11)
            .map(|_| {
                let slots = Arc::clone(&slots);
                let concurrent = Arc::clone(&concurrent);

                thread::spawn(move || {
                    for _ in 0..1000 {
                        let index = slots.acquire();
                        let holders = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(holders <= CAPACITY);
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        slots.release(index);
                        thread::yield_now();
                    }
                })
            })
            .collect::<Vec<_>>();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(slots.claimed(), 0);
    });
}

#[test]
fn weighted_limiter_blocks_until_units_return() {
    with_watchdog(|| {
        let limiter = Arc::new(WeightedLimiter::new(10).unwrap());

        limiter.acquire(10);

        let waiter = spawn_blocking_call({
            let limiter = Arc::clone(&limiter);
            move || limiter.acquire(1)
        });

        waiter.assert_blocked_for(PATIENCE);

        limiter.release(1);
        waiter.join();

        assert_eq!(limiter.in_use(), 10);
    });
}

#[test]
fn weighted_limiter_rejects_invalid_amounts() {
    let limiter = WeightedLimiter::new(1).unwrap();

    assert_eq!(
        limiter.checked_acquire(2),
        Err(Error::InvalidAmount {
            requested: 2,
            capacity: 1
        })
    );
    assert_eq!(
        limiter.checked_release(2),
        Err(Error::Underflow {
            released: 2,
            in_use: 0
        })
    );
}

#[test]
fn allocating_limiter_blocks_until_bytes_return() {
    with_watchdog(|| {
        let limiter = Arc::new(AllocatingLimiter::new(10).unwrap());

        let got = limiter.acquire(10);

        let waiter = spawn_blocking_call({
            let limiter = Arc::clone(&limiter);
            move || limiter.acquire(1)
        });

        waiter.assert_blocked_for(PATIENCE);

        limiter.release(got[..1].to_vec());

        let second = waiter.join();
        assert_eq!(second.len(), 1);
        assert_eq!(limiter.limiter().in_use(), 10);
    });
}

#[test]
fn pools_can_be_shared_with_scoped_threads() {
    with_watchdog(|| {
        let pool = FixedBufferPool::new(2, 8, ClearPolicy::NoClear).unwrap();

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let mut buffer = pool.acquire();
                        buffer[0] = buffer[0].wrapping_add(1);
                    }
                });
            }
        });

        assert_eq!(pool.in_use(), 0);
    });
}

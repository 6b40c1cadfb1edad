use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// The wait primitive shared by the blocking `acquire()` paths of every pool in this crate.
///
/// Waiters park on a condition variable until some releaser tells them to try again. There is no
/// queue and no ordering between waiters: whoever re-checks first after a wakeup wins, which may
/// also be a thread that never parked at all.
///
/// The mutex protects no data. It only orders "waiter is about to sleep" against "releaser is
/// about to notify" so that wakeups cannot be lost. The fast paths on both sides avoid it:
///
/// * A releaser first publishes its state change and then checks `waiting`. If nobody is
///   registered, there is nobody to wake.
/// * A waiter registers itself in `waiting` while holding the mutex and only then performs its
///   final availability check before sleeping.
///
/// All accesses to `waiting` and to the state the callers guard are `SeqCst`, so either the
/// releaser observes the registration (and takes the mutex, which cannot happen until the waiter
/// is asleep) or the waiter's final check observes the released resource.
#[derive(Debug, Default)]
pub(crate) struct Parking {
    waiting: AtomicUsize,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Parking {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Calls `attempt` until it returns `Some`, parking the thread between failed attempts.
    ///
    /// The first attempt is made without touching the mutex. Spurious wakeups are harmless
    /// because every wakeup is followed by another attempt.
    pub(crate) fn wait_until<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> T {
        if let Some(value) = attempt() {
            return value;
        }

        let mut guard = self.lock.lock();

        self.waiting.fetch_add(1, Ordering::SeqCst);

        let value = loop {
            if let Some(value) = attempt() {
                break value;
            }

            tracing::trace!("no capacity available, parking");
            self.condvar.wait(&mut guard);
            tracing::trace!("woken up, re-checking for capacity");
        };

        self.waiting.fetch_sub(1, Ordering::SeqCst);

        value
    }

    /// Wakes up one parked waiter, if there are any.
    ///
    /// Must be called after the state change that the waiters are waiting for has been published.
    pub(crate) fn notify_one(&self) {
        if self.has_waiters() {
            drop(self.lock.lock());
            self.condvar.notify_one();
        }
    }

    /// Wakes up every parked waiter, if there are any.
    ///
    /// Must be called after the state change that the waiters are waiting for has been published.
    pub(crate) fn notify_all(&self) {
        if self.has_waiters() {
            drop(self.lock.lock());
            self.condvar.notify_all();
        }
    }

    fn has_waiters(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) != 0
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing blocking operations of the pools in this workspace.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long any single helper waits for something to happen before declaring a hang.
///
/// Miri is dramatically slower for thread synchronization, so we use a longer timeout there to
/// avoid false positives while still catching real hangs.
fn hang_timeout() -> Duration {
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs a test with a timeout to prevent infinite hangs.
///
/// The pools under test block the calling thread when exhausted, so a bug in the wakeup logic
/// shows up as a test that never finishes. This function runs the test on a separate thread and
/// panics if it does not complete within the timeout (10 seconds, or 60 seconds under Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     // Your test code here
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(hang_timeout()) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {:?} timeout", hang_timeout());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            // Thread panicked, join it to get the panic.
            match test_handle.join() {
                Ok(()) => panic!("Test thread disconnected unexpectedly"),
                Err(e) => std::panic::resume_unwind(e),
            }
        }
    }
}

/// Polls `condition` until it returns `true`.
///
/// Use this to wait until another thread has reached a state that can only be observed
/// indirectly, such as having parked inside a blocking `acquire()`.
///
/// # Panics
///
/// Panics if the condition does not become true within the hang timeout.
pub fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now()
        .checked_add(hang_timeout())
        .expect("hang timeout is small enough to never overflow");

    while !condition() {
        assert!(
            Instant::now() < deadline,
            "condition did not become true within {:?}",
            hang_timeout()
        );

        thread::sleep(Duration::from_millis(1));
    }
}

/// A call that is running on a background thread and may be blocked.
///
/// Created by [`spawn_blocking_call()`]. Use [`assert_blocked_for()`][Self::assert_blocked_for]
/// to verify that the call has not completed yet and [`join()`][Self::join] to wait for it.
#[derive(Debug)]
pub struct BlockingCall<R> {
    rx: mpsc::Receiver<R>,
    handle: JoinHandle<()>,
}

/// Starts `call` on a new thread, returning a handle that can inspect whether it has completed.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use testing::spawn_blocking_call;
///
/// let call = spawn_blocking_call(|| 42);
/// assert_eq!(call.join(), 42);
/// ```
pub fn spawn_blocking_call<F, R>(call: F) -> BlockingCall<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        drop(tx.send(call()));
    });

    BlockingCall { rx, handle }
}

impl<R> BlockingCall<R> {
    /// Asserts that the call does not complete within `patience`.
    ///
    /// # Panics
    ///
    /// Panics if the call completes (or panics) before `patience` has elapsed.
    pub fn assert_blocked_for(&self, patience: Duration) {
        match self.rx.recv_timeout(patience) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(_) => panic!("call completed but was expected to stay blocked for {patience:?}"),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                panic!("call panicked while it was expected to stay blocked")
            }
        }
    }

    /// Waits for the call to complete and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the call does not complete within the hang timeout. If the call itself
    /// panicked, the panic is propagated to the caller.
    pub fn join(self) -> R {
        match self.rx.recv_timeout(hang_timeout()) {
            Ok(result) => {
                self.handle.join().expect("call thread should not panic");
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                panic!("call did not complete within {:?}", hang_timeout());
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(()) => panic!("call thread disconnected unexpectedly"),
                Err(e) => std::panic::resume_unwind(e),
            },
        }
    }
}

//! # Channel Counter
//!
//! Tracks in-flight work for one class of jobs. Waiting for a drain blocks on
//! a condition variable instead of polling.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// In-flight counter with a blocking "wait until zero".
#[derive(Debug, Default)]
pub struct ChannelCounter {
    in_flight: AtomicUsize,
    mutex: Mutex<()>,
    drained: Condvar,
}

impl ChannelCounter {
    /// Creates an idle counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more job in flight.
    #[inline]
    pub fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Records one job finished, waking waiters when the count hits zero.
    pub fn finish(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "channel counter underflow");
        if previous == 1 {
            // Taking the mutex orders this notify after any waiter's check.
            let _guard = self.mutex.lock();
            self.drained.notify_all();
        }
    }

    /// Jobs currently in flight.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// True if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Blocks until the in-flight count reaches zero.
    pub fn wait_idle(&self) {
        if self.is_idle() {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.is_idle() {
            self.drained.wait(&mut guard);
        }
    }

    /// Returns a guard that calls [`finish`](Self::finish) when dropped,
    /// including during unwinding.
    #[must_use]
    pub fn finish_on_drop(&self) -> FinishGuard<'_> {
        FinishGuard { counter: self }
    }
}

/// Calls [`ChannelCounter::finish`] on drop.
#[derive(Debug)]
pub struct FinishGuard<'a> {
    counter: &'a ChannelCounter,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.counter.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_idle_wait_returns_immediately() {
        let counter = ChannelCounter::new();
        counter.wait_idle();
        assert!(counter.is_idle());
    }

    #[test]
    fn test_wait_blocks_until_finished() {
        let counter = Arc::new(ChannelCounter::new());
        counter.begin();
        counter.begin();

        let worker = {
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                counter.finish();
                std::thread::sleep(Duration::from_millis(5));
                counter.finish();
            })
        };

        counter.wait_idle();
        assert_eq!(counter.in_flight(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn test_finish_guard() {
        let counter = ChannelCounter::new();
        counter.begin();
        {
            let _guard = counter.finish_on_drop();
            assert_eq!(counter.in_flight(), 1);
        }
        assert!(counter.is_idle());
    }
}

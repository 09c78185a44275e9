//! # Ordering Lock
//!
//! A ticket counter that hands a shared resource from one system to the next
//! in a fixed order.
//!
//! ```text
//! position 0: wait(0) -> use component -> next()   counter 0 -> 1
//! position 1: wait(1) -> use component -> next()   counter 1 -> 2
//! position 2: wait(2) -> use component -> next()   counter 2 -> 3
//! ```
//!
//! Waiting spins. Hold times are expected to be short and the set of
//! participants is fixed at registration time.

use std::sync::atomic::{AtomicI32, Ordering};

/// Counter value of a disabled lock.
pub const DISABLED_LOCK: i32 = -1;

/// Spins before a waiter starts yielding its time slice.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Monotonic ticket counter.
///
/// Invariant: while enabled, the counter only increases until the next
/// [`reset`](Self::reset), and [`wait`](Self::wait) at position `k` returns
/// only once the counter equals `k`.
#[derive(Debug, Default)]
pub struct OrderingLock {
    counter: AtomicI32,
}

impl OrderingLock {
    /// Creates an enabled lock at position 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicI32::new(0),
        }
    }

    /// Creates a disabled lock.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            counter: AtomicI32::new(DISABLED_LOCK),
        }
    }

    /// Current counter value.
    #[inline]
    #[must_use]
    pub fn position(&self) -> i32 {
        self.counter.load(Ordering::Acquire)
    }

    /// True if the lock is disabled.
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.position() == DISABLED_LOCK
    }

    /// Blocks until the counter reaches `position`. No-op while disabled.
    pub fn wait(&self, position: i32) {
        let mut spins = 0u32;
        loop {
            let current = self.counter.load(Ordering::Acquire);
            if current == position || current == DISABLED_LOCK {
                return;
            }
            if spins < SPINS_BEFORE_YIELD {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Advances the counter by one. No-op while disabled.
    pub fn next(&self) {
        let _ = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != DISABLED_LOCK).then_some(current + 1)
            });
    }

    /// Puts the counter back at 0 for a new frame. Also re-enables the lock.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Release);
    }

    /// Disables the lock until the next [`reset`](Self::reset).
    pub fn disable(&self) {
        self.counter.store(DISABLED_LOCK, Ordering::Release);
    }

    /// Waits for `position` and returns a guard that calls
    /// [`next`](Self::next) when dropped.
    #[must_use = "the turn ends as soon as the guard is dropped"]
    pub fn turn(&self, position: i32) -> LockTurn<'_> {
        self.wait(position);
        LockTurn { lock: self }
    }
}

/// A held turn on an [`OrderingLock`].
#[derive(Debug)]
pub struct LockTurn<'a> {
    lock: &'a OrderingLock,
}

impl Drop for LockTurn<'_> {
    fn drop(&mut self) {
        self.lock.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_wait_at_current_position_returns() {
        let lock = OrderingLock::new();
        lock.wait(0);
        lock.next();
        lock.wait(1);
        assert_eq!(lock.position(), 1);
    }

    #[test]
    fn test_reset() {
        let lock = OrderingLock::new();
        lock.next();
        lock.next();
        lock.reset();
        assert_eq!(lock.position(), 0);
    }

    #[test]
    fn test_disabled_is_noop() {
        let lock = OrderingLock::disabled();
        lock.wait(17);
        lock.next();
        assert_eq!(lock.position(), DISABLED_LOCK);

        lock.reset();
        assert!(!lock.is_disabled());
        lock.disable();
        lock.next();
        assert!(lock.is_disabled());
    }

    #[test]
    fn test_turn_guard_advances() {
        let lock = OrderingLock::new();
        {
            let _turn = lock.turn(0);
            assert_eq!(lock.position(), 0);
        }
        assert_eq!(lock.position(), 1);
    }

    #[test]
    fn test_disable_releases_waiter() {
        let lock = Arc::new(OrderingLock::new());
        let waiter = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.wait(5))
        };
        std::thread::sleep(std::time::Duration::from_millis(5));
        lock.disable();
        waiter.join().unwrap();
    }
}

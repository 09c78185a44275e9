//! # Synchronization Primitives
//!
//! Systems run in parallel on the job pool. Most of them touch disjoint data:
//! they read the previous generation and write their own components in the
//! current one. When several systems must write the same component, they
//! agree on a strict order with an [`OrderingLock`]:
//!
//! ```text
//! Frame N:
//!   reset lock          counter = 0
//!   physics   wait(0)   write Position   next()   counter = 1
//!   collision wait(1)   write Position   next()   counter = 2
//! ```

mod ordering_lock;

pub use ordering_lock::{LockTurn, OrderingLock, DISABLED_LOCK};

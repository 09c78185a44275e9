//! # Job System
//!
//! Worker pool shared by the frame pipeline and user code.
//!
//! Channel 0 carries system jobs and channel 1 the end-of-frame state copy.
//! User jobs go on channel 2 and above.

mod channel;
mod scheduler;

pub use channel::{ChannelCounter, FinishGuard};
pub use scheduler::{Job, JobScheduler, CHANNEL_COPY, CHANNEL_SYSTEMS, FIRST_USER_CHANNEL};

//! # Job Scheduler
//!
//! A fixed pool of worker threads pulling from one shared FIFO.
//!
//! ## Architecture
//!
//! ```text
//!   queue(channel, job) ──> [Mutex<VecDeque>] ──> Worker 1 ──┐
//!                                │           ──> Worker 2 ──┼──> channel[c].finish()
//!                                │           ──> Worker N ──┘
//!                                ▼
//!                      channel[c].begin()    wait_channel(c) blocks until zero
//! ```
//!
//! Channels partition the queue for completion tracking only; every job
//! shares the same FIFO order. Channels 0 and 1 belong to the frame pipeline.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::channel::ChannelCounter;
use crate::config::EngineConfig;
use crate::error::{JobError, JobResult};

/// Channel of per-system jobs.
pub const CHANNEL_SYSTEMS: usize = 0;

/// Channel of the end-of-frame state copy.
pub const CHANNEL_COPY: usize = 1;

/// First channel free for user jobs.
pub const FIRST_USER_CHANNEL: usize = 2;

/// A unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A job tagged with its channel.
struct QueuedJob {
    channel: usize,
    job: Job,
}

/// State shared between the scheduler handle and its workers.
struct Shared {
    /// Pending jobs in submission order.
    queue: Mutex<VecDeque<QueuedJob>>,
    /// Signalled on every push and on shutdown.
    not_empty: Condvar,
    /// One in-flight counter per channel.
    channels: Box<[ChannelCounter]>,
    /// Cooperative shutdown flag, checked between jobs.
    shutdown: AtomicBool,
    /// Queue limit, if any.
    max_queued: Option<usize>,
    /// Growth increment for the queue's backing store.
    extension: usize,
    /// Idle park timeout.
    park: Duration,
}

/// Fixed-size worker pool with channelized completion tracking.
///
/// ## Usage
///
/// ```rust,ignore
/// let jobs = JobScheduler::new(&EngineConfig::default())?;
/// for chunk in chunks {
///     jobs.queue(FIRST_USER_CHANNEL, move || process(chunk))?;
/// }
/// jobs.wait_channel(FIRST_USER_CHANNEL)?;
/// ```
pub struct JobScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Starts the worker pool.
    ///
    /// Worker count is `max(min_threads, cores - 1)`, never below one.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Spawn`] if a worker thread cannot be started.
    pub fn new(config: &EngineConfig) -> JobResult<Self> {
        Self::with_workers(config, config.worker_count())
    }

    /// Starts a pool with an exact worker count (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Spawn`] if a worker thread cannot be started.
    pub fn with_workers(config: &EngineConfig, workers: usize) -> JobResult<Self> {
        let channel_count = config.job_channels.max(FIRST_USER_CHANNEL);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.list_extension)),
            not_empty: Condvar::new(),
            channels: (0..channel_count).map(|_| ChannelCounter::new()).collect(),
            shutdown: AtomicBool::new(false),
            max_queued: config.max_queued_jobs,
            extension: config.list_extension.max(1),
            park: Duration::from_micros(config.idle_park_micros.max(1)),
        });

        let worker_count = workers.max(1);
        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(worker_count),
        };
        for index in 0..worker_count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("ember-worker-{index}"))
                .spawn(move || worker_loop(index, &shared))
                .map_err(|e| JobError::Spawn(e.to_string()))?;
            pool.workers.push(handle);
        }

        tracing::info!(
            "Job pool started: {} workers, {} channels",
            worker_count,
            channel_count
        );

        Ok(pool)
    }

    /// Number of worker threads.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of channels, including the reserved ones.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.shared.channels.len()
    }

    /// Jobs waiting in the queue (not yet picked up).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Pre-sizes the queue for `additional` more jobs.
    pub fn reserve(&self, additional: usize) {
        self.shared.queue.lock().reserve(additional);
    }

    /// Queues a user job.
    ///
    /// # Errors
    ///
    /// Fails on a reserved or unknown channel, a full queue, or after shutdown.
    pub fn queue<F>(&self, channel: usize, job: F) -> JobResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if channel < FIRST_USER_CHANNEL {
            return Err(JobError::ReservedChannel(channel));
        }
        self.queue_on(channel, Box::new(job))
    }

    /// Queues a job on any channel, reserved ones included.
    pub(crate) fn queue_on(&self, channel: usize, job: Job) -> JobResult<()> {
        self.push(channel, std::iter::once(job))
    }

    /// Queues every job of `jobs` on one channel, or none of them.
    ///
    /// A refused batch is dropped unrun.
    pub(crate) fn queue_batch(&self, channel: usize, jobs: Vec<Job>) -> JobResult<()> {
        self.push(channel, jobs.into_iter())
    }

    fn push(&self, channel: usize, jobs: impl ExactSizeIterator<Item = Job>) -> JobResult<()> {
        let counter = self.counter(channel)?;
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(JobError::ShuttingDown);
        }

        let count = jobs.len();
        let mut queue = self.shared.queue.lock();
        if let Some(capacity) = self.shared.max_queued {
            if queue.len() + count > capacity {
                tracing::warn!(
                    "{} job(s) refused on channel {}: queue full ({})",
                    count,
                    channel,
                    capacity
                );
                return Err(JobError::QueueFull { capacity });
            }
        }
        if queue.capacity() - queue.len() < count {
            queue.reserve_exact(count.max(self.shared.extension));
        }

        for job in jobs {
            // Counted before it becomes visible so a racing wait cannot miss it.
            counter.begin();
            queue.push_back(QueuedJob { channel, job });
        }
        drop(queue);

        if count == 1 {
            self.shared.not_empty.notify_one();
        } else {
            self.shared.not_empty.notify_all();
        }
        tracing::trace!("Queued {} job(s) on channel {}", count, channel);
        Ok(())
    }

    fn counter(&self, channel: usize) -> JobResult<&ChannelCounter> {
        self.shared
            .channels
            .get(channel)
            .ok_or(JobError::UnknownChannel {
                channel,
                count: self.shared.channels.len(),
            })
    }

    /// Blocks until every job queued on `channel` so far has completed.
    ///
    /// # Errors
    ///
    /// Fails on an unknown channel.
    pub fn wait_channel(&self, channel: usize) -> JobResult<()> {
        self.counter(channel)?.wait_idle();
        tracing::trace!("Channel {} drained", channel);
        Ok(())
    }

    /// Jobs in flight on `channel` (queued or running).
    ///
    /// # Errors
    ///
    /// Fails on an unknown channel.
    pub fn in_flight(&self, channel: usize) -> JobResult<usize> {
        Ok(self.counter(channel)?.in_flight())
    }

    /// True if `channel` has nothing queued or running.
    ///
    /// # Errors
    ///
    /// Fails on an unknown channel.
    pub fn is_channel_idle(&self, channel: usize) -> JobResult<bool> {
        Ok(self.counter(channel)?.is_idle())
    }

    /// Stops and joins every worker. Jobs still queued are dropped unrun.
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _queue = self.shared.queue.lock();
            self.shared.not_empty.notify_all();
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Job worker exited by panic");
            }
        }

        let mut queue = self.shared.queue.lock();
        let dropped = queue.len();
        for queued in queue.drain(..) {
            self.shared.channels[queued.channel].finish();
        }
        tracing::debug!("Job pool stopped, {} queued jobs dropped", dropped);
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("workers", &self.workers.len())
            .field("channels", &self.shared.channels.len())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Worker thread main loop.
fn worker_loop(index: usize, shared: &Shared) {
    tracing::debug!("Worker {} started", index);

    loop {
        let next = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                shared.not_empty.wait_for(&mut queue, shared.park);
            }
        };

        let Some(QueuedJob { channel, job }) = next else {
            break;
        };

        let _finish = shared.channels[channel].finish_on_drop();
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("Job on channel {} panicked (worker {})", channel, index);
        }
    }

    tracing::debug!("Worker {} stopped", index);
}

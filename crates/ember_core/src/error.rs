//! # Error Types
//!
//! Errors raised by registration, structural per-frame calls and the job pool.
//! Hot-path component accessors never return these; they assert instead.

use thiserror::Error;

use crate::ecs::FramePhase;

/// Errors that can occur in the job pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Channels 0 and 1 belong to the frame pipeline.
    #[error("channel {0} is reserved for the frame pipeline")]
    ReservedChannel(usize),

    /// The channel index is past the configured channel count.
    #[error("unknown job channel {channel} (pool has {count} channels)")]
    UnknownChannel {
        /// Requested channel.
        channel: usize,
        /// Configured channel count.
        count: usize,
    },

    /// The queue reached its configured limit.
    #[error("job queue full: capacity {capacity}")]
    QueueFull {
        /// Configured maximum queued jobs.
        capacity: usize,
    },

    /// The pool is shutting down and refuses new work.
    #[error("job pool is shutting down")]
    ShuttingDown,

    /// A worker thread could not be started.
    #[error("failed to spawn job worker: {0}")]
    Spawn(String),
}

/// Errors that can occur in the ECS.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A component kind that was never registered.
    #[error("unknown component kind {0}")]
    UnknownComponent(u32),

    /// Entity types are a 64-bit mask, so at most 64 kinds exist.
    #[error("too many component kinds: {count} registered, max {max}")]
    TooManyComponents {
        /// Count after the rejected registration.
        count: usize,
        /// Hard limit.
        max: usize,
    },

    /// Typed access with a type whose size differs from the registered stride.
    #[error("component kind {kind} has stride {expected}, type is {actual} bytes")]
    ComponentSizeMismatch {
        /// Component kind.
        kind: u32,
        /// Registered stride.
        expected: usize,
        /// Size of the accessing type.
        actual: usize,
    },

    /// Component type alignment exceeds what the byte columns guarantee.
    #[error("component alignment {align} exceeds the supported {max}")]
    ComponentAlignment {
        /// Alignment of the rejected type.
        align: usize,
        /// Supported alignment.
        max: usize,
    },

    /// The same kind appears twice in one entity's initial state.
    #[error("component kind {0} given twice for one entity")]
    DuplicateComponent(u32),

    /// A system id that was never registered.
    #[error("unknown system {0}")]
    UnknownSystem(u32),

    /// Components can only be registered before systems and entities exist.
    #[error("components are already registered")]
    ComponentsAlreadyRegistered,

    /// Systems can only be registered once.
    #[error("systems are already registered")]
    SystemsAlreadyRegistered,

    /// Two or more systems write a kind without sharing an ordering lock.
    #[error("component kind {kind} is written by unordered systems: {systems}")]
    UnorderedWriters {
        /// Contested component kind.
        kind: u32,
        /// Names of the writing systems.
        systems: String,
    },

    /// Ordering positions on one lock must be exactly `0..n`.
    #[error("ordering lock positions must be 0..{count}, got {positions:?}")]
    BadLockPositions {
        /// Number of systems sharing the lock.
        count: usize,
        /// Positions found.
        positions: Vec<i32>,
    },

    /// Initial component bytes do not match the registered stride.
    #[error("initial state for kind {kind} is {actual} bytes, stride is {expected}")]
    InitialStateLength {
        /// Component kind.
        kind: u32,
        /// Registered stride.
        expected: usize,
        /// Supplied byte count.
        actual: usize,
    },

    /// `copy_state` was called while the previous copy is still in flight.
    #[error("state copy already in progress")]
    CopyInProgress,

    /// A frame call arrived in the wrong pipeline phase.
    #[error("invalid frame phase: expected {expected:?}, found {actual:?}")]
    InvalidPhase {
        /// Phase the call requires.
        expected: FramePhase,
        /// Phase the pipeline was in.
        actual: FramePhase,
    },

    /// Job pool failure.
    #[error(transparent)]
    Jobs(#[from] JobError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

/// Result type for job pool operations.
pub type JobResult<T> = Result<T, JobError>;

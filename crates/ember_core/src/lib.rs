//! # Ember Core
//!
//! Entity Component System with a job scheduler, built for real-time loops
//! that run many systems per frame:
//! - Systems run in parallel on a fixed worker pool
//! - Double-buffered components give every system a stable view of last frame
//! - Ordering locks serialize systems that share a component
//!
//! ## Frame Loop
//!
//! 1. **Register** component kinds, then systems, once
//! 2. **Mutate** entities from the frame-driving thread
//! 3. **Run systems** as jobs, reading previous and writing current
//! 4. **Copy state** current into previous and sweep deferred deletions
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{ComponentInit, Ecs, EngineConfig, Position};
//!
//! let mut ecs = Ecs::new(EngineConfig::default())?;
//! let pos = ecs.register_component::<Position>()?;
//! ecs.add_systems(vec![/* ... */])?;
//! ecs.add_entity(&[ComponentInit::of(pos, &Position::new(0.0, 0.0))])?;
//! ecs.step()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod ecs;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod sync;

pub use clock::FrameClock;
pub use config::EngineConfig;
pub use ecs::{
    Component, ComponentInit, ComponentKind, Ecs, EntityId, EntityType, FramePhase, FrameStats,
    FrameView, OrderChain, Position, SystemDescriptor, SystemId, Velocity,
};
pub use error::{EcsError, EcsResult, JobError, JobResult};
pub use jobs::{JobScheduler, FIRST_USER_CHANNEL};
pub use sync::{OrderingLock, DISABLED_LOCK};

//! # Entity Component System
//!
//! Entities, double-buffered component storage, systems and the frame
//! pipeline that runs them on the job pool.
//!
//! ## Design Philosophy
//!
//! - Systems read last frame's data and write this frame's
//! - Component arrays grow by a fixed extension and never shrink
//! - Entity IDs are slot indices with generation counters
//! - Destruction is deferred to the end-of-frame copy

mod component;
mod entity;
mod pipeline;
mod storage;
mod system;
mod world;

pub use component::{
    Component, ComponentInfo, ComponentInit, ComponentKind, ComponentRegistry, Position, Velocity,
    MAX_COMPONENT_KINDS,
};
pub use entity::{EntityId, EntityRecord, EntityRegistry, EntityType};
pub use pipeline::{Ecs, FramePhase, FrameStats};
pub use storage::ComponentStore;
pub use system::{OrderChain, SystemDescriptor, SystemFn, SystemId};
pub use world::{EntityIter, FrameView, World, WorldState};

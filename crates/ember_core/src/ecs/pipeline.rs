//! # Frame Pipeline
//!
//! [`Ecs`] is the explicit context object tying the world, the registered
//! systems and the job pool together.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            FRAME N                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  add / destroy entities      (main thread, write guard)         │
//! │  run_systems()               one job per system on channel 0    │
//! │     systems read previous, write their declared components      │
//! │  copy_state()                one job on channel 1               │
//! │     waits for every system, then current -> previous and sweep  │
//! │  run_systems() of N+1 waits for the copy                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Phases: `Idle -> RunningSystems -> AwaitingSystems -> CopyingState ->
//! AwaitingCopy -> Idle`.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::component::{Component, ComponentInit, ComponentKind};
use super::entity::{EntityId, EntityType};
use super::system::{SystemDescriptor, SystemId, SystemTable};
use super::world::{EntityIter, FrameView, World};
use crate::config::EngineConfig;
use crate::error::{EcsError, EcsResult, JobError};
use crate::jobs::{Job, JobScheduler, CHANNEL_COPY, CHANNEL_SYSTEMS};

/// Where the pipeline is within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FramePhase {
    /// Between frames.
    Idle = 0,
    /// System jobs queued.
    RunningSystems = 1,
    /// Someone is waiting for the systems to finish.
    AwaitingSystems = 2,
    /// The copy job is copying and sweeping.
    CopyingState = 3,
    /// The main thread is waiting for the copy.
    AwaitingCopy = 4,
}

impl FramePhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RunningSystems,
            2 => Self::AwaitingSystems,
            3 => Self::CopyingState,
            4 => Self::AwaitingCopy,
            _ => Self::Idle,
        }
    }
}

/// Counters for the last completed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Number of completed state copies.
    pub frame: u64,
    /// System jobs queued in the frame.
    pub systems_run: usize,
    /// Sum over systems of entities each one visited.
    pub entities_visited: usize,
    /// Entities removed by the copy.
    pub deleted_in_copy: usize,
}

/// State shared with jobs.
struct Shared {
    world: World,
    systems: OnceLock<SystemTable>,
    phase: AtomicU8,
    systems_run: AtomicUsize,
    visited: AtomicUsize,
    frames: AtomicU64,
    stats: Mutex<FrameStats>,
}

impl Shared {
    #[inline]
    fn phase(&self) -> FramePhase {
        FramePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    #[inline]
    fn set_phase(&self, phase: FramePhase) {
        tracing::trace!("Frame phase -> {:?}", phase);
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn advance_phase(&self, from: FramePhase, to: FramePhase) -> bool {
        let moved = self
            .phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            tracing::trace!("Frame phase {:?} -> {:?}", from, to);
        }
        moved
    }

    /// One system's sweep over its matching entities.
    fn run_system(&self, index: usize) {
        let Some(table) = self.systems.get() else {
            return;
        };
        let system = &table.systems[index];

        // The turn is taken before the read guard so a queued writer never
        // waits on a reader that is itself waiting for its turn.
        let _turn = system
            .order
            .map(|(lock, position)| table.locks[lock].turn(position));
        let state = self.world.read();
        let view = FrameView::new(&state, system, table.written);

        let mut visited = 0;
        for id in state.matching(system.required) {
            (system.run)(&view, id);
            visited += 1;
        }
        self.visited.fetch_add(visited, Ordering::Relaxed);
    }

    /// The end-of-frame copy job body.
    fn copy_state(&self) {
        if let Some(table) = self.systems.get() {
            for system in &table.systems {
                system.done.wait_idle();
            }
        }
        self.set_phase(FramePhase::CopyingState);

        let deleted = self.world.write().copy_state();
        let frame = self.frames.fetch_add(1, Ordering::AcqRel) + 1;
        let stats = FrameStats {
            frame,
            systems_run: self.systems_run.swap(0, Ordering::AcqRel),
            entities_visited: self.visited.swap(0, Ordering::AcqRel),
            deleted_in_copy: deleted,
        };
        *self.stats.lock() = stats;
        tracing::trace!(
            "Frame {} copied: {} systems, {} visits, {} deleted",
            frame,
            stats.systems_run,
            stats.entities_visited,
            deleted
        );

        self.set_phase(FramePhase::Idle);
    }
}

/// Clears a system's in-flight marker when its job is dropped, whether the
/// job ran, panicked or was discarded at shutdown.
struct SystemJob {
    shared: Arc<Shared>,
    index: usize,
}

impl SystemJob {
    fn run(&self) {
        self.shared.run_system(self.index);
    }
}

impl Drop for SystemJob {
    fn drop(&mut self) {
        if let Some(table) = self.shared.systems.get() {
            table.systems[self.index].done.finish();
        }
    }
}

/// Entity-component-system context.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut ecs = Ecs::new(EngineConfig::default())?;
/// let pos = ecs.register_component::<Position>()?;
/// let vel = ecs.register_component::<Velocity>()?;
/// ecs.add_systems(vec![movement(pos, vel)])?;
///
/// ecs.add_entity(&[ComponentInit::of(pos, &p), ComponentInit::of(vel, &v)])?;
/// loop {
///     ecs.run_systems()?;
///     ecs.copy_state()?;
/// }
/// ```
pub struct Ecs {
    shared: Arc<Shared>,
    jobs: JobScheduler,
    cursor: Option<usize>,
    stopped: bool,
}

impl Ecs {
    /// Creates a context with a worker pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a failed worker spawn.
    pub fn new(config: EngineConfig) -> EcsResult<Self> {
        config.validate()?;
        let jobs = JobScheduler::new(&config)?;
        Ok(Self::with_scheduler(&config, jobs))
    }

    /// Creates a context with exactly `workers` worker threads.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a failed worker spawn.
    pub fn with_workers(config: EngineConfig, workers: usize) -> EcsResult<Self> {
        config.validate()?;
        let jobs = JobScheduler::with_workers(&config, workers)?;
        Ok(Self::with_scheduler(&config, jobs))
    }

    fn with_scheduler(config: &EngineConfig, jobs: JobScheduler) -> Self {
        let shared = Arc::new(Shared {
            world: World::new(config.initial_entity_capacity, config.list_extension),
            systems: OnceLock::new(),
            phase: AtomicU8::new(FramePhase::Idle as u8),
            systems_run: AtomicUsize::new(0),
            visited: AtomicUsize::new(0),
            frames: AtomicU64::new(0),
            stats: Mutex::new(FrameStats::default()),
        });
        Self {
            shared,
            jobs,
            cursor: None,
            stopped: false,
        }
    }

    /// The worker pool, for user jobs on channels 2 and above.
    #[inline]
    #[must_use]
    pub fn jobs(&self) -> &JobScheduler {
        &self.jobs
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    fn check_components_open(&self) -> EcsResult<()> {
        let state = self.shared.world.read();
        if self.shared.systems.get().is_some() || !state.entities().is_empty() {
            return Err(EcsError::ComponentsAlreadyRegistered);
        }
        Ok(())
    }

    /// Registers one raw kind per byte size, in order.
    ///
    /// # Errors
    ///
    /// Fails after systems or entities exist, or past 64 kinds.
    pub fn add_components(&mut self, sizes: &[usize]) -> EcsResult<Vec<ComponentKind>> {
        self.check_components_open()?;
        let mut state = self.shared.world.write();
        sizes.iter().map(|&size| state.register_raw(size)).collect()
    }

    /// Registers a typed component kind.
    ///
    /// # Errors
    ///
    /// Fails after systems or entities exist, past 64 kinds, or on an
    /// alignment above 8.
    pub fn register_component<T: Component>(&mut self) -> EcsResult<ComponentKind> {
        self.check_components_open()?;
        self.shared.world.write().register::<T>()
    }

    /// Registers every system. Can be called once.
    ///
    /// # Errors
    ///
    /// [`EcsError::SystemsAlreadyRegistered`], unknown kinds, unordered
    /// writers or bad lock positions.
    pub fn add_systems(&mut self, descriptors: Vec<SystemDescriptor>) -> EcsResult<Vec<SystemId>> {
        if self.shared.systems.get().is_some() {
            return Err(EcsError::SystemsAlreadyRegistered);
        }
        let table = SystemTable::build(descriptors, self.shared.world.read().components())?;
        let ids: Vec<SystemId> = table.systems.iter().map(|system| system.id).collect();
        let count = table.len();
        self.shared
            .systems
            .set(table)
            .map_err(|_| EcsError::SystemsAlreadyRegistered)?;
        tracing::debug!("Registered {} systems", count);
        Ok(ids)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.shared.systems.get().map_or(0, SystemTable::len)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Creates an entity. Blocks while system jobs or the copy hold the world.
    ///
    /// # Errors
    ///
    /// Unknown or duplicated kinds, or initial bytes of the wrong length.
    pub fn add_entity(&self, components: &[ComponentInit<'_>]) -> EcsResult<EntityId> {
        self.shared.world.write().add_entity(components)
    }

    /// Flags an entity for removal at the next state copy.
    ///
    /// Returns false for dead, stale or already flagged ids.
    pub fn destroy_entity(&self, id: EntityId) -> bool {
        self.shared.world.read().destroy_entity(id)
    }

    /// Removes every entity now. Returns how many were removed.
    pub fn destroy_all(&self) -> usize {
        let removed = self.shared.world.write().destroy_all();
        tracing::debug!("Destroyed all {} entities", removed);
        removed
    }

    /// True if `id` is live.
    #[must_use]
    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.shared.world.read().entity_exists(id)
    }

    /// Component bitmask of a live entity.
    #[must_use]
    pub fn entity_type(&self, id: EntityId) -> Option<EntityType> {
        self.shared.world.read().entity_type(id)
    }

    /// True if `a == b`, or both are live with equal types.
    #[must_use]
    pub fn same_type(&self, a: EntityId, b: EntityId) -> bool {
        self.shared.world.read().same_type(a, b)
    }

    /// True if `id` is live and owns every kind in `kinds`.
    #[must_use]
    pub fn has_components(&self, id: EntityId, kinds: &[ComponentKind]) -> bool {
        self.shared.world.read().has_components(id, kinds)
    }

    /// True if `id` is live and flagged for removal.
    #[must_use]
    pub fn is_queued_for_deletion(&self, id: EntityId) -> bool {
        self.shared.world.read().is_queued_for_deletion(id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.shared.world.read().entities().len()
    }

    /// Live entities in slot order. Adding entities blocks until the
    /// iterator is dropped.
    #[must_use]
    pub fn iter_entities(&self) -> EntityIter<'_> {
        EntityIter::new(self.shared.world.read())
    }

    /// Starts a cursor walk and returns the first live entity.
    pub fn iter_start(&mut self) -> Option<EntityId> {
        self.cursor = Some(0);
        self.iter_next()
    }

    /// Next live entity of the cursor walk.
    ///
    /// Returns `None` at the end, and before [`iter_start`](Self::iter_start).
    pub fn iter_next(&mut self) -> Option<EntityId> {
        let from = self.cursor?;
        let next = self.shared.world.read().entities().next_live(from);
        match next {
            Some((index, id)) => {
                self.cursor = Some(index + 1);
                Some(id)
            }
            None => {
                self.cursor = None;
                None
            }
        }
    }

    /// Ends the cursor walk.
    pub fn iter_end(&mut self) {
        self.cursor = None;
    }

    // ------------------------------------------------------------------
    // Component access from the frame-driving thread
    // ------------------------------------------------------------------

    /// Current-generation value.
    ///
    /// Waits for any running system sweep to release the world.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    #[must_use]
    pub fn component<T: Component>(&self, kind: ComponentKind, id: EntityId) -> T {
        *self.shared.world.write().component::<T>(kind, id)
    }

    /// Replaces the current-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    pub fn set_component<T: Component>(&self, kind: ComponentKind, id: EntityId, value: T) {
        *self.shared.world.write().component_mut::<T>(kind, id) = value;
    }

    /// Applies `f` to the current-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    pub fn update_component<T, R>(
        &self,
        kind: ComponentKind,
        id: EntityId,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Component,
    {
        f(self.shared.world.write().component_mut::<T>(kind, id))
    }

    /// Copy of the current-generation bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind`.
    #[must_use]
    pub fn component_bytes(&self, kind: ComponentKind, id: EntityId) -> Vec<u8> {
        self.shared.world.write().component_bytes(kind, id).to_vec()
    }

    /// Previous-generation value.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind` or `T` does not match its stride.
    #[must_use]
    pub fn previous<T: Component>(&self, kind: ComponentKind, id: EntityId) -> T {
        *self.shared.world.read().previous::<T>(kind, id)
    }

    /// Copy of the previous-generation bytes.
    ///
    /// # Panics
    ///
    /// Panics if `id` lacks `kind`.
    #[must_use]
    pub fn previous_bytes(&self, kind: ComponentKind, id: EntityId) -> Vec<u8> {
        self.shared.world.read().previous_bytes(kind, id).to_vec()
    }

    // ------------------------------------------------------------------
    // Frame pipeline
    // ------------------------------------------------------------------

    fn ensure_running(&self) -> EcsResult<()> {
        if self.stopped {
            return Err(JobError::ShuttingDown.into());
        }
        Ok(())
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        self.shared.phase()
    }

    /// Statistics of the last completed copy.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        *self.shared.stats.lock()
    }

    /// Queues one job per system on the systems channel.
    ///
    /// Waits for the previous frame's copy first. Ordering locks are reset
    /// before any job is queued. Either every system job is queued or none
    /// is, and a refused frame leaves the phase at `Idle`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidPhase`] unless the previous frame was copied, or a
    /// job pool error such as [`JobError::QueueFull`].
    pub fn run_systems(&self) -> EcsResult<()> {
        self.ensure_running()?;
        self.wait_copy()?;
        let phase = self.phase();
        if phase != FramePhase::Idle {
            return Err(EcsError::InvalidPhase {
                expected: FramePhase::Idle,
                actual: phase,
            });
        }

        let Some(table) = self.shared.systems.get() else {
            self.shared.set_phase(FramePhase::RunningSystems);
            return Ok(());
        };
        for lock in &table.locks {
            lock.reset();
        }

        let batch: Vec<Job> = table
            .queue_order
            .iter()
            .map(|&index| {
                table.systems[index].done.begin();
                let job = SystemJob {
                    shared: Arc::clone(&self.shared),
                    index,
                };
                Box::new(move || job.run()) as Job
            })
            .collect();
        // All or nothing: a refused batch drops every job, which clears the
        // per-system markers again.
        self.jobs.queue_batch(CHANNEL_SYSTEMS, batch)?;
        self.shared
            .systems_run
            .fetch_add(table.len(), Ordering::AcqRel);
        self.shared.set_phase(FramePhase::RunningSystems);
        Ok(())
    }

    /// Blocks until every system job of this frame has finished.
    ///
    /// # Errors
    ///
    /// Job pool errors only.
    pub fn wait_systems(&self) -> EcsResult<()> {
        self.shared
            .advance_phase(FramePhase::RunningSystems, FramePhase::AwaitingSystems);
        self.jobs.wait_channel(CHANNEL_SYSTEMS)?;
        Ok(())
    }

    /// True once `id`'s job for this frame has finished, or if it was never
    /// queued.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`] for an unregistered id.
    pub fn is_system_finished(&self, id: SystemId) -> EcsResult<bool> {
        self.shared
            .systems
            .get()
            .and_then(|table| table.get(id))
            .map(|system| system.done.is_idle())
            .ok_or(EcsError::UnknownSystem(id.raw()))
    }

    /// Blocks until `id`'s job for this frame has finished.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`] for an unregistered id.
    pub fn wait_system_finished(&self, id: SystemId) -> EcsResult<()> {
        let system = self
            .shared
            .systems
            .get()
            .and_then(|table| table.get(id))
            .ok_or(EcsError::UnknownSystem(id.raw()))?;
        system.done.wait_idle();
        Ok(())
    }

    /// Queues the end-of-frame copy.
    ///
    /// The copy job waits for every system job, then copies current into
    /// previous and removes entities flagged for deletion. Returns without
    /// waiting; the next [`run_systems`](Self::run_systems) waits for it.
    ///
    /// # Errors
    ///
    /// [`EcsError::CopyInProgress`] if the previous copy has not completed,
    /// or a job pool error.
    pub fn copy_state(&self) -> EcsResult<()> {
        self.ensure_running()?;
        if !self.jobs.is_channel_idle(CHANNEL_COPY)? {
            return Err(EcsError::CopyInProgress);
        }
        let phase = self.phase();
        if !matches!(
            phase,
            FramePhase::Idle | FramePhase::RunningSystems | FramePhase::AwaitingSystems
        ) {
            return Err(EcsError::InvalidPhase {
                expected: FramePhase::AwaitingSystems,
                actual: phase,
            });
        }

        self.shared.set_phase(FramePhase::AwaitingSystems);
        let shared = Arc::clone(&self.shared);
        self.jobs
            .queue_on(CHANNEL_COPY, Box::new(move || shared.copy_state()))?;
        Ok(())
    }

    /// Blocks until the queued copy has completed.
    ///
    /// # Errors
    ///
    /// Job pool errors only.
    pub fn wait_copy(&self) -> EcsResult<()> {
        self.shared
            .advance_phase(FramePhase::CopyingState, FramePhase::AwaitingCopy);
        self.jobs.wait_channel(CHANNEL_COPY)?;
        Ok(())
    }

    /// Runs one whole frame: systems, then the copy, then waits for both.
    ///
    /// # Errors
    ///
    /// Same as [`run_systems`](Self::run_systems) and
    /// [`copy_state`](Self::copy_state).
    pub fn step(&self) -> EcsResult<FrameStats> {
        self.run_systems()?;
        self.copy_state()?;
        self.wait_copy()?;
        Ok(self.stats())
    }

    /// Stops and joins the worker pool, then drops every entity.
    ///
    /// Idempotent. Frame calls fail with a job pool error afterwards.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.jobs.shutdown();
        let removed = self.shared.world.write().destroy_all();
        self.shared.set_phase(FramePhase::Idle);
        tracing::info!("ECS shut down, {} entities released", removed);
    }
}

impl Drop for Ecs {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Ecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ecs")
            .field("phase", &self.phase())
            .field("systems", &self.system_count())
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

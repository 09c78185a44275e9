//! # Systems
//!
//! A system is a function run once per frame for every entity that owns its
//! required components. Systems are registered together, once, and validated
//! as a set:
//!
//! - Every required or written kind must be registered.
//! - A kind written by more than one system needs all of its writers on the
//!   same [`OrderChain`].
//! - Positions on one chain are exactly `0..n`.
//!
//! Each chain gets an [`OrderingLock`] owned by the system table. The
//! pipeline takes a system's turn around its whole entity sweep, so writers
//! on one chain never overlap.

use std::sync::Arc;

use super::component::{ComponentKind, ComponentRegistry};
use super::entity::{EntityId, EntityType};
use super::world::FrameView;
use crate::error::{EcsError, EcsResult};
use crate::jobs::ChannelCounter;
use crate::sync::OrderingLock;

/// System body, called once per matching entity.
pub type SystemFn = Arc<dyn Fn(&FrameView<'_>, EntityId) + Send + Sync>;

/// Index of a registered system, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SystemId(u32);

impl SystemId {
    /// Wraps a raw index.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Raw index.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Names a chain of systems that run one after another, in position order.
///
/// A chain is only an identity. Clones refer to the same chain; two chains
/// built with the same name are still distinct.
///
/// ```rust,ignore
/// let position_writers = OrderChain::new("position");
/// let physics = SystemDescriptor::new("physics", physics_fn)
///     .writes(&[pos])
///     .ordered_by(&position_writers, 0);
/// let collision = SystemDescriptor::new("collision", collision_fn)
///     .writes(&[pos])
///     .ordered_by(&position_writers, 1);
/// ```
#[derive(Clone)]
pub struct OrderChain {
    name: Arc<str>,
}

impl OrderChain {
    /// Creates a new, distinct chain.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
        }
    }

    /// Chain name, used in logs.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.name, &other.name)
    }
}

impl std::fmt::Debug for OrderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OrderChain").field(&self.name).finish()
    }
}

/// Everything needed to register a system.
///
/// # Example
///
/// ```rust,ignore
/// let movement = SystemDescriptor::new("movement", move |view, entity| {
///     let vel: Velocity = view.previous(velocity, entity);
///     view.update_component(position, entity, |pos: &mut Position| {
///         pos.x += vel.x;
///         pos.y += vel.y;
///     });
/// })
/// .requires(&[position, velocity])
/// .writes(&[position]);
/// ```
#[derive(Clone)]
pub struct SystemDescriptor {
    name: String,
    required: Vec<ComponentKind>,
    writes: Vec<ComponentKind>,
    order: Option<(OrderChain, i32)>,
    run: SystemFn,
}

impl SystemDescriptor {
    /// Creates a descriptor with no requirements.
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&FrameView<'_>, EntityId) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: Vec::new(),
            writes: Vec::new(),
            order: None,
            run: Arc::new(run),
        }
    }

    /// Adds required component kinds.
    #[must_use]
    pub fn requires(mut self, kinds: &[ComponentKind]) -> Self {
        self.required.extend_from_slice(kinds);
        self
    }

    /// Declares component kinds this system writes in the current generation.
    #[must_use]
    pub fn writes(mut self, kinds: &[ComponentKind]) -> Self {
        self.writes.extend_from_slice(kinds);
        self
    }

    /// Places this system at `position` on `chain`.
    #[must_use]
    pub fn ordered_by(mut self, chain: &OrderChain, position: i32) -> Self {
        self.order = Some((chain.clone(), position));
        self
    }
}

impl std::fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("writes", &self.writes)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// A validated system.
pub(crate) struct RegisteredSystem {
    pub(crate) id: SystemId,
    pub(crate) name: String,
    pub(crate) required: EntityType,
    pub(crate) writes: EntityType,
    /// Index into [`SystemTable::locks`] and the turn on that lock.
    pub(crate) order: Option<(usize, i32)>,
    pub(crate) run: SystemFn,
    /// In flight while this system's job is queued or running.
    pub(crate) done: ChannelCounter,
}

/// Every registered system plus the data the pipeline derives from the set.
pub(crate) struct SystemTable {
    pub(crate) systems: Vec<RegisteredSystem>,
    /// Indices in queue order: ordered systems sorted by position.
    pub(crate) queue_order: Vec<usize>,
    /// One lock per chain, private to the pipeline, reset every frame.
    pub(crate) locks: Vec<OrderingLock>,
    /// Union of every system's written kinds.
    pub(crate) written: EntityType,
}

impl SystemTable {
    /// Validates `descriptors` against `registry`.
    pub(crate) fn build(
        descriptors: Vec<SystemDescriptor>,
        registry: &ComponentRegistry,
    ) -> EcsResult<Self> {
        for descriptor in &descriptors {
            for &kind in descriptor.required.iter().chain(&descriptor.writes) {
                if !registry.contains(kind) {
                    return Err(EcsError::UnknownComponent(kind.raw()));
                }
            }
        }

        check_writers(&descriptors, registry)?;
        let chains = check_lock_positions(&descriptors)?;

        let mut written = EntityType::EMPTY;
        let systems: Vec<RegisteredSystem> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let writes = EntityType::from_kinds(&descriptor.writes);
                written = EntityType::from_bits(written.bits() | writes.bits());
                let order = descriptor.order.as_ref().map(|(chain, position)| {
                    let lock = chains
                        .iter()
                        .position(|known| known.same_as(chain))
                        .unwrap_or_default();
                    tracing::debug!(
                        "System {} is turn {} on chain {}",
                        descriptor.name,
                        position,
                        chain.name()
                    );
                    (lock, *position)
                });
                #[allow(clippy::cast_possible_truncation)]
                let id = SystemId(index as u32);
                tracing::debug!(
                    "Registered system {} ({}): requires {:#x}, writes {:#x}",
                    index,
                    descriptor.name,
                    EntityType::from_kinds(&descriptor.required).bits(),
                    writes.bits()
                );
                RegisteredSystem {
                    id,
                    required: EntityType::from_kinds(&descriptor.required),
                    writes,
                    name: descriptor.name,
                    order,
                    run: descriptor.run,
                    done: ChannelCounter::new(),
                }
            })
            .collect();

        let mut queue_order: Vec<usize> = (0..systems.len()).collect();
        queue_order.sort_by_key(|&i| systems[i].order.map_or(-1, |(_, position)| position));

        Ok(Self {
            systems,
            queue_order,
            locks: chains.iter().map(|_| OrderingLock::new()).collect(),
            written,
        })
    }

    /// System by id.
    pub(crate) fn get(&self, id: SystemId) -> Option<&RegisteredSystem> {
        self.systems.get(id.0 as usize)
    }

    pub(crate) fn len(&self) -> usize {
        self.systems.len()
    }
}

/// Every kind with several writers must have them all on one chain.
fn check_writers(descriptors: &[SystemDescriptor], registry: &ComponentRegistry) -> EcsResult<()> {
    for kind in registry.kinds() {
        let writers: Vec<&SystemDescriptor> = descriptors
            .iter()
            .filter(|d| d.writes.contains(&kind))
            .collect();
        if writers.len() < 2 {
            continue;
        }

        let shared_chain = writers[0].order.as_ref().map(|(chain, _)| chain);
        let ordered = shared_chain.is_some_and(|chain| {
            writers.iter().all(|w| {
                w.order
                    .as_ref()
                    .is_some_and(|(other, _)| other.same_as(chain))
            })
        });
        if !ordered {
            let systems = writers
                .iter()
                .map(|w| w.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(EcsError::UnorderedWriters {
                kind: kind.raw(),
                systems,
            });
        }
    }
    Ok(())
}

/// Groups systems by chain and checks each group holds positions `0..n`.
///
/// Returns the distinct chains in first-use order.
fn check_lock_positions(descriptors: &[SystemDescriptor]) -> EcsResult<Vec<OrderChain>> {
    let mut groups: Vec<(OrderChain, Vec<i32>)> = Vec::new();
    for (chain, position) in descriptors.iter().filter_map(|d| d.order.as_ref()) {
        match groups.iter_mut().find(|(known, _)| known.same_as(chain)) {
            Some((_, positions)) => positions.push(*position),
            None => groups.push((chain.clone(), vec![*position])),
        }
    }

    let mut chains = Vec::with_capacity(groups.len());
    for (chain, mut positions) in groups {
        positions.sort_unstable();
        let contiguous = positions
            .iter()
            .enumerate()
            .all(|(i, &p)| usize::try_from(p).is_ok_and(|p| p == i));
        if !contiguous {
            return Err(EcsError::BadLockPositions {
                count: positions.len(),
                positions,
            });
        }
        chains.push(chain);
    }
    Ok(chains)
}

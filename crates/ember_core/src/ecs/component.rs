//! # Component System
//!
//! Components are pure data containers with no behavior. Each registered kind
//! has a fixed byte stride for the lifetime of the program. Kinds can be
//! registered from a Rust type or from a raw byte size.

use bytemuck::{Pod, Zeroable};

use crate::error::{EcsError, EcsResult};
use crate::memory::MAX_ELEMENT_ALIGN;

/// Entity types are a `u64` bitmask, one bit per kind.
pub const MAX_COMPONENT_KINDS: usize = 64;

/// Marker trait for typed ECS components.
///
/// Components must be:
/// - `Pod`: Plain old data, stored as raw bytes
/// - `Default`: Used when no initial value is supplied
/// - Aligned to at most 8 bytes
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Pod + Default + Send + Sync + 'static {}

macro_rules! primitive_components {
    ($($ty:ty),* $(,)?) => {
        $(impl Component for $ty {})*
    };
}

// Scalars, for kinds registered by byte size.
primitive_components!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Index of a registered component kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentKind(u32);

impl ComponentKind {
    /// Wraps a raw kind index. Validity is checked when the kind is used.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Raw kind index.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into per-kind tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// This kind's bit in an [`EntityType`](super::EntityType).
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u64 {
        1u64 << self.0
    }
}

/// Registration record for one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Bytes per component.
    pub size: usize,
    /// Type name, or `"raw"` for byte-size registrations.
    pub name: &'static str,
}

/// Ordered table of registered component kinds.
#[derive(Clone, Debug, Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one kind per byte size, in order.
    ///
    /// # Errors
    ///
    /// Fails if the sizes would exceed [`MAX_COMPONENT_KINDS`].
    pub fn from_sizes(sizes: &[usize]) -> EcsResult<Self> {
        let mut registry = Self::new();
        for &size in sizes {
            registry.register_raw(size)?;
        }
        Ok(registry)
    }

    /// Registers a typed component kind.
    ///
    /// # Errors
    ///
    /// Fails on too many kinds or an alignment above 8.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentKind> {
        let align = std::mem::align_of::<T>();
        if align > MAX_ELEMENT_ALIGN {
            return Err(EcsError::ComponentAlignment {
                align,
                max: MAX_ELEMENT_ALIGN,
            });
        }
        self.push(ComponentInfo {
            size: std::mem::size_of::<T>(),
            name: std::any::type_name::<T>(),
        })
    }

    /// Registers a kind by byte size only.
    ///
    /// # Errors
    ///
    /// Fails if the registry already holds [`MAX_COMPONENT_KINDS`] kinds.
    pub fn register_raw(&mut self, size: usize) -> EcsResult<ComponentKind> {
        self.push(ComponentInfo { size, name: "raw" })
    }

    fn push(&mut self, info: ComponentInfo) -> EcsResult<ComponentKind> {
        if self.infos.len() >= MAX_COMPONENT_KINDS {
            return Err(EcsError::TooManyComponents {
                count: self.infos.len() + 1,
                max: MAX_COMPONENT_KINDS,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        let kind = ComponentKind(self.infos.len() as u32);
        tracing::debug!("Registered component {} ({}): {} bytes", kind.0, info.name, info.size);
        self.infos.push(info);
        Ok(kind)
    }

    /// Number of registered kinds.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// True if `kind` was registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: ComponentKind) -> bool {
        kind.index() < self.infos.len()
    }

    /// Registration record of `kind`.
    #[inline]
    #[must_use]
    pub fn info(&self, kind: ComponentKind) -> Option<&ComponentInfo> {
        self.infos.get(kind.index())
    }

    /// Byte stride of `kind`.
    #[inline]
    #[must_use]
    pub fn size_of(&self, kind: ComponentKind) -> Option<usize> {
        self.info(kind).map(|info| info.size)
    }

    /// Every registered kind, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        #[allow(clippy::cast_possible_truncation)]
        (0..self.infos.len()).map(|i| ComponentKind(i as u32))
    }

    /// Checks that `kind` exists and `T` matches its stride.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] or [`EcsError::ComponentSizeMismatch`].
    pub fn check_type<T: Component>(&self, kind: ComponentKind) -> EcsResult<()> {
        let expected = self
            .size_of(kind)
            .ok_or(EcsError::UnknownComponent(kind.raw()))?;
        let actual = std::mem::size_of::<T>();
        if expected != actual {
            return Err(EcsError::ComponentSizeMismatch {
                kind: kind.raw(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Initial bytes for one component of a new entity.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInit<'a> {
    /// Component kind.
    pub kind: ComponentKind,
    /// Exactly one stride of bytes.
    pub bytes: &'a [u8],
}

impl<'a> ComponentInit<'a> {
    /// Initial state from raw bytes.
    #[inline]
    #[must_use]
    pub const fn raw(kind: ComponentKind, bytes: &'a [u8]) -> Self {
        Self { kind, bytes }
    }

    /// Initial state from a typed value.
    #[inline]
    #[must_use]
    pub fn of<T: Component>(kind: ComponentKind, value: &'a T) -> Self {
        Self {
            kind,
            bytes: bytemuck::bytes_of(value),
        }
    }
}

/// 2D position in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Component for Position {}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 2D velocity in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// X velocity.
    pub x: f32,
    /// Y velocity.
    pub y: f32,
}

impl Component for Velocity {}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_sizes() {
        assert_eq!(std::mem::size_of::<Position>(), 8);
        assert_eq!(std::mem::size_of::<Velocity>(), 8);
    }

    #[test]
    fn test_register_assigns_sequential_kinds() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register::<Position>().unwrap();
        let b = registry.register_raw(4).unwrap();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(registry.size_of(a), Some(8));
        assert_eq!(registry.size_of(b), Some(4));
        assert_eq!(b.bit(), 0b10);
    }

    #[test]
    fn test_sixty_fifth_kind_rejected() {
        let mut registry = ComponentRegistry::from_sizes(&[1; MAX_COMPONENT_KINDS]).unwrap();
        assert_eq!(registry.len(), 64);
        let err = registry.register_raw(1).unwrap_err();
        assert_eq!(
            err,
            EcsError::TooManyComponents {
                count: 65,
                max: 64
            }
        );
    }

    #[test]
    fn test_check_type() {
        let registry = ComponentRegistry::from_sizes(&[8, 4]).unwrap();
        assert!(registry.check_type::<Position>(ComponentKind::from_raw(0)).is_ok());
        assert!(matches!(
            registry.check_type::<Position>(ComponentKind::from_raw(1)),
            Err(EcsError::ComponentSizeMismatch { .. })
        ));
        assert_eq!(
            registry.check_type::<Position>(ComponentKind::from_raw(9)),
            Err(EcsError::UnknownComponent(9))
        );
    }

    #[test]
    fn test_init_of_typed_value() {
        let vel = Velocity::new(1.0, 2.0);
        let init = ComponentInit::of(ComponentKind::from_raw(3), &vel);
        assert_eq!(init.bytes.len(), 8);
        assert_eq!(init.kind.index(), 3);
    }
}

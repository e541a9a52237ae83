// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handles, angles, and coordinate value types.

use core::f64::consts::{PI, TAU};
use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub};

use kurbo::{Affine, Vec2};
use serde::{Deserialize, Serialize};

/// Opaque entity handle.
///
/// Handles are plain integers with no generation; the surrounding runtime is
/// responsible for not reusing them while anything still refers to the old entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identifier of a map (an independent coordinate space).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MapId(pub u32);

impl MapId {
    /// The map of entities that are not part of the simulated world.
    pub const NULLSPACE: Self = Self(0);

    /// Whether this is [`MapId::NULLSPACE`].
    pub const fn is_nullspace(self) -> bool {
        self.0 == 0
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::NULLSPACE
    }
}

/// Integer tile coordinates on a grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TileIndex {
    /// Create a tile index.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rotation in radians.
///
/// Angles are not normalized on construction; use [`Angle::reduced`] when a
/// canonical value is needed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Angle(pub f64);

impl Angle {
    /// No rotation.
    pub const ZERO: Self = Self(0.0);

    /// Construct from radians.
    pub const fn from_radians(theta: f64) -> Self {
        Self(theta)
    }

    /// Construct from degrees.
    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees.to_radians())
    }

    /// Value in radians.
    pub const fn radians(self) -> f64 {
        self.0
    }

    /// Value in degrees.
    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    /// Equivalent angle in `(-π, π]`.
    pub fn reduced(self) -> Self {
        let mut theta = self.0.rem_euclid(TAU);
        if theta > PI {
            theta -= TAU;
        }
        Self(theta)
    }

    /// Whether two angles describe the same rotation within `epsilon` radians.
    pub fn close_to(self, other: Self, epsilon: f64) -> bool {
        (self - other).reduced().0.abs() <= epsilon
    }

    /// Rotate a vector counter-clockwise by this angle.
    pub fn rotate_vec(self, v: Vec2) -> Vec2 {
        let (sin, cos) = self.0.sin_cos();
        Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
    }

    /// Unit vector pointing in this direction.
    pub fn to_vec(self) -> Vec2 {
        Vec2::from_angle(self.0)
    }

    /// Rotation as an affine transform.
    pub fn to_affine(self) -> Affine {
        Affine::rotate(self.0)
    }
}

impl Add for Angle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Angle {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

/// A position relative to a parent entity.
///
/// `parent == None` means the entity is in null-space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCoordinates {
    /// Entity whose local space `position` is expressed in.
    pub parent: Option<EntityId>,
    /// Position in the parent's local space.
    pub position: Vec2,
}

impl EntityCoordinates {
    /// Coordinates relative to `parent`.
    pub const fn new(parent: EntityId, position: Vec2) -> Self {
        Self {
            parent: Some(parent),
            position,
        }
    }

    /// Null-space coordinates.
    pub const NULLSPACE: Self = Self {
        parent: None,
        position: Vec2::ZERO,
    };

    /// Same parent, different position.
    pub const fn with_position(self, position: Vec2) -> Self {
        Self {
            parent: self.parent,
            position,
        }
    }

    /// Whether both coordinates agree within `epsilon`.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.parent == other.parent && (self.position - other.position).hypot() <= epsilon
    }
}

/// A world-space position on a specific map.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapCoordinates {
    /// Map the position lives on.
    pub map: MapId,
    /// Position in the map's space.
    pub position: Vec2,
}

impl MapCoordinates {
    /// Create map coordinates.
    pub const fn new(map: MapId, position: Vec2) -> Self {
        Self { map, position }
    }
}

/// Transform lifecycle of an entity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifeStage {
    /// Spawned; map and grid are not resolved yet.
    #[default]
    Uninitialized,
    /// Map and grid resolved; not yet started.
    Initializing,
    /// Fully reactive to mutation.
    Running,
    /// Being deleted; rejects new children.
    Terminating,
    /// Gone.
    Removed,
}

impl LifeStage {
    /// Whether mutations on this entity emit events.
    pub const fn emits_events(self) -> bool {
        matches!(self, Self::Running | Self::Terminating)
    }
}

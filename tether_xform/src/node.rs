// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-entity transform state.

use core::cell::Cell;

use kurbo::{Affine, Vec2};
use rustc_hash::FxHashSet;

use crate::types::{Angle, EntityCoordinates, EntityId, LifeStage, MapId};

/// What role an entity plays in the hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An ordinary entity.
    Entity,
    /// A tile grid; anchored entities are parented to it.
    Grid,
    /// The root of a map. Maps sit at the origin of their own space.
    Map(MapId),
}

/// Transform of one entity.
///
/// Nodes are owned by the [`TransformGraph`](crate::TransformGraph) and can
/// only be mutated through it; this type exposes read accessors.
#[derive(Clone, Debug)]
pub struct TransformNode {
    pub(crate) kind: NodeKind,
    pub(crate) local_position: Vec2,
    pub(crate) local_rotation: Angle,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: FxHashSet<EntityId>,
    pub(crate) anchored: bool,
    pub(crate) no_local_rotation: bool,
    pub(crate) grid: Option<EntityId>,
    pub(crate) map: MapId,
    pub(crate) map_uid: Option<EntityId>,
    pub(crate) ancestry_resolved: bool,
    // Cached world matrix; `None` means dirty.
    pub(crate) world: Cell<Option<Affine>>,
    pub(crate) prev_position: Vec2,
    pub(crate) prev_rotation: Angle,
    pub(crate) next_position: Option<Vec2>,
    pub(crate) next_rotation: Option<Angle>,
    pub(crate) lerp_parent: Option<EntityId>,
    pub(crate) stage: LifeStage,
}

impl TransformNode {
    pub(crate) fn new(kind: NodeKind, coords: EntityCoordinates, rotation: Angle) -> Self {
        let (position, rotation) = match kind {
            NodeKind::Map(_) => (Vec2::ZERO, Angle::ZERO),
            _ => (coords.position, rotation),
        };
        Self {
            kind,
            local_position: position,
            local_rotation: rotation,
            parent: coords.parent,
            children: FxHashSet::default(),
            anchored: false,
            no_local_rotation: false,
            grid: None,
            map: MapId::NULLSPACE,
            map_uid: None,
            ancestry_resolved: false,
            world: Cell::new(None),
            prev_position: position,
            prev_rotation: rotation,
            next_position: None,
            next_rotation: None,
            lerp_parent: None,
            stage: LifeStage::Uninitialized,
        }
    }

    /// Role of this entity.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether this entity is a grid.
    pub fn is_grid(&self) -> bool {
        self.kind == NodeKind::Grid
    }

    /// Whether this entity is a map root.
    pub fn is_map(&self) -> bool {
        matches!(self.kind, NodeKind::Map(_))
    }

    /// Position in the parent's space.
    pub fn local_position(&self) -> Vec2 {
        self.local_position
    }

    /// Rotation relative to the parent.
    pub fn local_rotation(&self) -> Angle {
        self.local_rotation
    }

    /// Parent entity, `None` in null-space and for maps.
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Local position together with the parent.
    pub fn coordinates(&self) -> EntityCoordinates {
        EntityCoordinates {
            parent: self.parent,
            position: self.local_position,
        }
    }

    /// Direct children.
    pub fn children(&self) -> impl ExactSizeIterator<Item = EntityId> + '_ {
        self.children.iter().copied()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether the entity is bound to a grid tile.
    pub fn anchored(&self) -> bool {
        self.anchored
    }

    /// Whether local rotation changes are ignored.
    pub fn no_local_rotation(&self) -> bool {
        self.no_local_rotation
    }

    /// Nearest grid ancestor (a grid's own grid is itself).
    pub fn grid_uid(&self) -> Option<EntityId> {
        self.grid
    }

    /// Map this entity lives on.
    pub fn map_id(&self) -> MapId {
        self.map
    }

    /// Entity of the map this entity lives on.
    pub fn map_uid(&self) -> Option<EntityId> {
        self.map_uid
    }

    /// Lifecycle stage.
    pub fn life_stage(&self) -> LifeStage {
        self.stage
    }

    /// Local position before the last applied state.
    pub fn prev_position(&self) -> Vec2 {
        self.prev_position
    }

    /// Local rotation before the last applied state.
    pub fn prev_rotation(&self) -> Angle {
        self.prev_rotation
    }

    /// Interpolation target position, if any.
    pub fn next_position(&self) -> Option<Vec2> {
        self.next_position
    }

    /// Interpolation target rotation, if any.
    pub fn next_rotation(&self) -> Option<Angle> {
        self.next_rotation
    }

    /// Parent the interpolation targets are expressed in.
    pub fn lerp_parent(&self) -> Option<EntityId> {
        self.lerp_parent
    }

    /// Local-to-parent matrix. Maps always report identity.
    pub fn local_matrix(&self) -> Affine {
        if self.is_map() {
            return Affine::IDENTITY;
        }
        Affine::translate(self.local_position) * self.local_rotation.to_affine()
    }

    pub(crate) fn clear_lerp(&mut self) {
        self.next_position = None;
        self.next_rotation = None;
        self.lerp_parent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn local_matrix_rotates_then_translates() {
        let n = TransformNode::new(
            NodeKind::Entity,
            EntityCoordinates::new(EntityId(1), Vec2::new(2.0, 0.0)),
            Angle::from_degrees(90.0),
        );
        let p = n.local_matrix() * Point::new(1.0, 0.0);
        assert!((p - Point::new(2.0, 1.0)).hypot() < 1e-12);
    }

    #[test]
    fn maps_ignore_local_state() {
        let n = TransformNode::new(
            NodeKind::Map(MapId(3)),
            EntityCoordinates::new(EntityId(1), Vec2::new(2.0, 5.0)),
            Angle::from_degrees(45.0),
        );
        assert_eq!(n.local_position(), Vec2::ZERO);
        assert_eq!(n.local_matrix(), Affine::IDENTITY);
    }
}

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only view over the transform graph.

use core::fmt;

use kurbo::{Affine, Point, Vec2};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::{Result, TransformError};
use crate::node::TransformNode;
use crate::types::{Angle, EntityCoordinates, EntityId, MapCoordinates, MapId};

/// Read-only capability over every transform.
///
/// Obtained from [`TransformGraph::query`](crate::TransformGraph::query) and
/// meant to be resolved once and handed down to code that does many lookups
/// in a row. All coordinate math lives here; the graph delegates to it.
#[derive(Copy, Clone)]
pub struct TransformQuery<'a> {
    nodes: &'a FxHashMap<EntityId, TransformNode>,
}

impl<'a> TransformQuery<'a> {
    pub(crate) fn new(nodes: &'a FxHashMap<EntityId, TransformNode>) -> Self {
        Self { nodes }
    }

    /// Transform of `entity`, or an error if it has none.
    pub fn get(&self, entity: EntityId) -> Result<&'a TransformNode> {
        self.nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))
    }

    /// Transform of `entity`, if any.
    pub fn try_get(&self, entity: EntityId) -> Option<&'a TransformNode> {
        self.nodes.get(&entity)
    }

    /// Whether `entity` has a transform.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.contains_key(&entity)
    }

    /// Number of transforms.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate every transform.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &'a TransformNode)> + 'a {
        self.nodes.iter().map(|(id, n)| (*id, n))
    }

    /// World-space matrix of `entity`, cached per node.
    ///
    /// Walks up to the nearest ancestor with a clean cache and fills the
    /// caches of every node on the way back down.
    pub fn world_matrix(&self, entity: EntityId) -> Option<Affine> {
        let node = self.try_get(entity)?;
        if let Some(m) = node.world.get() {
            return Some(m);
        }
        let mut chain = vec![node];
        let mut base = Affine::IDENTITY;
        let mut cur = node;
        while let Some(p) = cur.parent {
            if cur.is_map() || chain.len() > self.nodes.len() {
                break;
            }
            let pn = self.try_get(p)?;
            if let Some(m) = pn.world.get() {
                base = m;
                break;
            }
            chain.push(pn);
            cur = pn;
        }
        for n in chain.iter().rev() {
            base = base * n.local_matrix();
            n.world.set(Some(base));
        }
        Some(base)
    }

    /// Inverse of [`world_matrix`](Self::world_matrix).
    pub fn inv_world_matrix(&self, entity: EntityId) -> Option<Affine> {
        self.world_matrix(entity).map(|m| m.inverse())
    }

    /// World position and rotation, by walking the parent chain.
    pub fn world_position_rotation(&self, entity: EntityId) -> Option<(Vec2, Angle)> {
        let node = self.try_get(entity)?;
        if node.is_map() {
            return Some((Vec2::ZERO, Angle::ZERO));
        }
        let mut pos = node.local_position;
        let mut rot = node.local_rotation;
        let mut parent = node.parent;
        let mut steps = 0;
        while let Some(p) = parent {
            let pn = self.try_get(p)?;
            if pn.is_map() || steps > self.nodes.len() {
                break;
            }
            pos = pn.local_rotation.rotate_vec(pos) + pn.local_position;
            rot += pn.local_rotation;
            parent = pn.parent;
            steps += 1;
        }
        Some((pos, rot))
    }

    /// World position.
    pub fn world_position(&self, entity: EntityId) -> Option<Vec2> {
        self.world_position_rotation(entity).map(|(p, _)| p)
    }

    /// World rotation.
    pub fn world_rotation(&self, entity: EntityId) -> Option<Angle> {
        self.world_position_rotation(entity).map(|(_, r)| r)
    }

    /// Position and rotation of `entity` in the local space of `ancestor`.
    ///
    /// Falls back to the inverse world matrix of `ancestor` (with a warning)
    /// if `ancestor` is not actually in the parent chain.
    pub fn relative_position_rotation(
        &self,
        entity: EntityId,
        ancestor: EntityId,
    ) -> Option<(Vec2, Angle)> {
        let node = self.try_get(entity)?;
        let mut pos = node.local_position;
        let mut rot = node.local_rotation;
        let mut parent = node.parent;
        let mut steps = 0;
        while let Some(p) = parent {
            if p == ancestor {
                return Some((pos, rot));
            }
            let pn = self.try_get(p)?;
            if steps > self.nodes.len() {
                break;
            }
            pos = pn.local_rotation.rotate_vec(pos) + pn.local_position;
            rot += pn.local_rotation;
            parent = pn.parent;
            steps += 1;
        }
        if entity == ancestor {
            return Some((Vec2::ZERO, Angle::ZERO));
        }
        warn!(
            ?entity,
            ?ancestor,
            "relative transform requested against a non-ancestor"
        );
        let (world_pos, world_rot) = self.world_position_rotation(entity)?;
        let inv = self.inv_world_matrix(ancestor)?;
        let ancestor_rot = self.world_rotation(ancestor)?;
        Some(((inv * world_pos.to_point()).to_vec2(), world_rot - ancestor_rot))
    }

    /// Whether `ancestor` is a strict ancestor of `entity`.
    pub fn contains_entity(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let mut parent = self.try_get(entity).and_then(|n| n.parent);
        let mut steps = 0;
        while let Some(p) = parent {
            if p == ancestor {
                return true;
            }
            if steps > self.nodes.len() {
                return false;
            }
            parent = self.try_get(p).and_then(|n| n.parent);
            steps += 1;
        }
        false
    }

    /// Map and world position of `entity`.
    pub fn map_coordinates(&self, entity: EntityId) -> Option<MapCoordinates> {
        let node = self.try_get(entity)?;
        let position = self.world_position(entity)?;
        Some(MapCoordinates::new(node.map, position))
    }

    /// Convert parent-relative coordinates to map coordinates.
    pub fn to_map_coordinates(&self, coords: EntityCoordinates) -> Option<MapCoordinates> {
        let Some(parent) = coords.parent else {
            return Some(MapCoordinates::new(MapId::NULLSPACE, coords.position));
        };
        let node = self.try_get(parent)?;
        let m = self.world_matrix(parent)?;
        Some(MapCoordinates::new(
            node.map,
            (m * coords.position.to_point()).to_vec2(),
        ))
    }

    /// Express a world position relative to `parent`.
    pub fn to_coordinates(&self, parent: EntityId, world: Vec2) -> Option<EntityCoordinates> {
        let inv = self.inv_world_matrix(parent)?;
        Some(EntityCoordinates::new(
            parent,
            (inv * world.to_point()).to_vec2(),
        ))
    }

    /// Map a point from `entity`'s local space to world space.
    pub fn local_to_world(&self, entity: EntityId, local: Point) -> Option<Point> {
        self.world_matrix(entity).map(|m| m * local)
    }

    /// Map a point from world space to `entity`'s local space.
    pub fn world_to_local(&self, entity: EntityId, world: Point) -> Option<Point> {
        self.inv_world_matrix(entity).map(|m| m * world)
    }
}

impl fmt::Debug for TransformQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformQuery")
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

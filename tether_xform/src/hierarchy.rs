// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Moving and reparenting transforms.

use kurbo::Vec2;
use tracing::{debug, error, warn};

use crate::config::ErrorPolicy;
use crate::error::{Result, TransformError};
use crate::events::TransformEvent;
use crate::graph::TransformGraph;
use crate::node::NodeKind;
use crate::tiles::MapGrids;
use crate::types::{Angle, EntityCoordinates, EntityId, LifeStage};

impl TransformGraph {
    /// Move `entity` to new parent-relative coordinates.
    ///
    /// With `rotation` set to `None`, a change of parent keeps the entity's
    /// world rotation; otherwise the local rotation is left alone. Entities
    /// with `no_local_rotation` always end up with a zero local rotation. With
    /// `unanchor` set, an anchored entity is released from its tile first.
    ///
    /// Emits `ParentChanged` (when the parent changes) followed by `Moved`.
    /// Requests within the configured epsilons of the current state are no-ops.
    pub fn set_coordinates(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        coords: EntityCoordinates,
        rotation: Option<Angle>,
        unanchor: bool,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        if node.is_map() {
            warn!(?entity, "maps cannot be moved");
            return Ok(());
        }
        let old_coords = node.coordinates();
        let old_rotation = node.local_rotation;
        let old_map = node.map;
        let pinned = node.no_local_rotation;
        let rotation = if pinned { None } else { rotation };
        let parent_changed = coords.parent != old_coords.parent;
        let rotation_changed =
            rotation.is_some_and(|r| !r.close_to(old_rotation, self.config.rotation_epsilon));
        if !parent_changed
            && !rotation_changed
            && (coords.position - old_coords.position).hypot() <= self.config.position_epsilon
        {
            return Ok(());
        }

        if parent_changed && let Some(parent) = coords.parent {
            self.validate_parent(grids, entity, parent)?;
        }

        if unanchor && self.anchored(entity) {
            self.unanchor(grids, entity);
        }

        let new_rotation = match rotation {
            Some(r) => r,
            None if pinned => Angle::ZERO,
            None if parent_changed => match (old_coords.parent, coords.parent) {
                (Some(old), Some(new)) => {
                    let q = self.query();
                    let old_world = q.world_rotation(old).unwrap_or(Angle::ZERO);
                    let new_world = q.world_rotation(new).unwrap_or(Angle::ZERO);
                    old_rotation + old_world - new_world
                }
                _ => old_rotation,
            },
            None => old_rotation,
        };

        if parent_changed {
            if let Some(old) = old_coords.parent
                && let Some(p) = self.nodes.get_mut(&old)
            {
                p.children.remove(&entity);
            }
            if let Some(new) = coords.parent
                && let Some(p) = self.nodes.get_mut(&new)
            {
                p.children.insert(entity);
            }
        }
        let Some(node) = self.nodes.get_mut(&entity) else {
            return Err(TransformError::UnknownEntity(entity));
        };
        node.parent = coords.parent;
        node.local_position = coords.position;
        node.local_rotation = new_rotation;
        if parent_changed {
            self.propagate_ancestry(entity);
        }
        self.invalidate_subtree(entity);

        if parent_changed {
            self.emit(
                entity,
                TransformEvent::ParentChanged {
                    entity,
                    old_parent: old_coords.parent,
                    old_map,
                },
            );
        }
        self.emit(
            entity,
            TransformEvent::Moved {
                entity,
                old_position: old_coords,
                new_position: coords,
                old_rotation,
                new_rotation,
            },
        );
        Ok(())
    }

    /// Check that `parent` may become the parent of `entity`, breaking a cycle
    /// when the error policy allows it.
    fn validate_parent(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        parent: EntityId,
    ) -> Result<()> {
        if parent == entity {
            return self.reject(entity, TransformError::ParentToSelf(entity));
        }
        match self.nodes.get(&parent) {
            None => return self.reject(entity, TransformError::MissingParent { entity, parent }),
            Some(p) if p.stage >= LifeStage::Terminating => {
                return self.reject(entity, TransformError::TerminatingParent { entity, parent });
            }
            Some(_) => {}
        }
        let mut cur = Some(parent);
        let mut steps = 0;
        while let Some(c) = cur {
            let Some(cn) = self.nodes.get(&c) else {
                break;
            };
            if cn.parent == Some(entity) {
                if self.applying_state || self.config.error_policy == ErrorPolicy::Tolerant {
                    warn!(?entity, ?parent, breaking = ?c, "breaking circular hierarchy");
                    self.detach_to_null(grids, c)?;
                    break;
                }
                error!(?entity, ?parent, "attempted to create a circular hierarchy");
                return Err(TransformError::CircularHierarchy { entity, parent });
            }
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
            cur = cn.parent;
        }
        Ok(())
    }

    /// Set the local position. Anchored entities are unanchored.
    pub fn set_local_position(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        position: Vec2,
    ) -> Result<()> {
        let coords = self
            .coordinates(entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        self.set_coordinates(grids, entity, coords.with_position(position), None, true)
    }

    /// Set the local rotation. Ignored for entities with `no_local_rotation`.
    pub fn set_local_rotation(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        rotation: Angle,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        if node.no_local_rotation {
            return Ok(());
        }
        let coords = node.coordinates();
        self.set_coordinates(grids, entity, coords, Some(rotation), false)
    }

    /// Set local position and rotation together.
    ///
    /// The position is ignored while anchored and the rotation is ignored
    /// with `no_local_rotation`.
    pub fn set_local_position_rotation(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        position: Vec2,
        rotation: Angle,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let mut coords = node.coordinates();
        if !node.anchored {
            coords.position = position;
        }
        let rotation = (!node.no_local_rotation).then_some(rotation);
        self.set_coordinates(grids, entity, coords, rotation, false)
    }

    /// Move `entity` so that its world position becomes `world`.
    pub fn set_world_position(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        world: Vec2,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let (local, local_rot) = (node.local_position, node.local_rotation);
        let (cur_world, world_rot) = self
            .world_position_rotation(entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let target = local + (local_rot - world_rot).rotate_vec(world - cur_world);
        self.set_local_position(grids, entity, target)
    }

    /// Rotate `entity` so that its world rotation becomes `rotation`.
    pub fn set_world_rotation(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        rotation: Angle,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let local = node.local_rotation;
        let world = self
            .world_rotation(entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        self.set_local_rotation(grids, entity, rotation - (world - local))
    }

    /// Set world position and rotation together through the parent's inverse transform.
    pub fn set_world_position_rotation(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        position: Vec2,
        rotation: Angle,
    ) -> Result<()> {
        let coords = self
            .coordinates(entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let (local_pos, local_rot) = match coords.parent {
            Some(parent) => {
                let q = self.query();
                let inv = q
                    .inv_world_matrix(parent)
                    .ok_or(TransformError::UnknownEntity(parent))?;
                let parent_rot = q
                    .world_rotation(parent)
                    .ok_or(TransformError::UnknownEntity(parent))?;
                ((inv * position.to_point()).to_vec2(), rotation - parent_rot)
            }
            None => (position, rotation),
        };
        self.set_local_position_rotation(grids, entity, local_pos, local_rot)
    }

    /// Toggle `no_local_rotation`. Enabling it resets the local rotation to zero.
    pub fn set_no_local_rotation(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        value: bool,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        if value && !node.no_local_rotation {
            let coords = node.coordinates();
            self.set_coordinates(grids, entity, coords, Some(Angle::ZERO), false)?;
        }
        if let Some(node) = self.nodes.get_mut(&entity) {
            node.no_local_rotation = value;
        }
        Ok(())
    }

    /// Reparent `entity` while keeping its world position and rotation.
    pub fn set_parent(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        parent: EntityId,
    ) -> Result<()> {
        let world = self
            .world_position(entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let local = match self.inv_world_matrix(parent) {
            Some(inv) => (inv * world.to_point()).to_vec2(),
            // Let validation report the missing parent.
            None => world,
        };
        self.set_coordinates(
            grids,
            entity,
            EntityCoordinates::new(parent, local),
            None,
            true,
        )
    }

    /// Move every child of `old` under `new`, keeping world transforms.
    pub fn reparent_children(
        &mut self,
        grids: &mut dyn MapGrids,
        old: EntityId,
        new: EntityId,
    ) -> Result<()> {
        if old == new {
            error!(?old, "attempted to reparent children to their current parent");
            return Ok(());
        }
        for child in self.children(old) {
            self.set_parent(grids, child, new)?;
        }
        Ok(())
    }

    /// Coordinates of `entity` relative to the grid under it, or its map.
    ///
    /// Returns `None` in null-space.
    pub fn coordinates_on_grid_or_map(
        &self,
        grids: &dyn MapGrids,
        entity: EntityId,
    ) -> Option<EntityCoordinates> {
        let node = self.nodes.get(&entity)?;
        let map_uid = node.map_uid?;
        let world = self.world_position(entity)?;
        let target = self
            .find_grid_at(grids, node.map, world)
            .filter(|g| *g != entity)
            .unwrap_or(map_uid);
        self.query().to_coordinates(target, world)
    }

    /// Parent `entity` to whatever grid it is over, falling back to the map.
    ///
    /// Entities in null-space are detached instead.
    pub fn attach_to_grid_or_map(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        if node.is_map() || node.is_grid() {
            debug!(?entity, "maps and grids are not attached to grids");
            return Ok(());
        }
        let Some(coords) = self.coordinates_on_grid_or_map(grids, entity) else {
            warn!(?entity, "attaching an entity in null-space, detaching instead");
            return self.detach_to_null(grids, entity);
        };
        if coords.parent == self.parent(entity) {
            return Ok(());
        }
        self.set_coordinates(grids, entity, coords, None, true)
    }

    /// Release anchoring and move `entity` into null-space at the origin.
    pub fn detach_to_null(&mut self, grids: &mut dyn MapGrids, entity: EntityId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        if node.is_map() {
            return Ok(());
        }
        node.clear_lerp();
        if node.anchored {
            node.anchored = false;
            let (parent, local) = (node.parent, node.local_position);
            if let Some(grid) = parent
                && let Some(tile) = grids.tile_indices_for(grid, local)
            {
                grids.remove_from_cell(grid, tile, entity);
            }
            self.emit(
                entity,
                TransformEvent::AnchorStateChanged {
                    entity,
                    anchored: false,
                    detaching: true,
                },
            );
        }
        self.set_coordinates(
            grids,
            entity,
            EntityCoordinates::NULLSPACE,
            Some(Angle::ZERO),
            false,
        )
    }

    /// Delete `entity` and its whole subtree, children first.
    ///
    /// Every removed transform is detached to null-space and emits `Removed`.
    pub fn delete(&mut self, grids: &mut dyn MapGrids, entity: EntityId) -> Result<()> {
        if !self.nodes.contains_key(&entity) {
            return Err(TransformError::UnknownEntity(entity));
        }
        let mut order = Vec::new();
        let mut stack = vec![entity];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(&id) {
                n.stage = LifeStage::Terminating;
                stack.extend(n.children.iter().copied());
                order.push(id);
            }
        }
        for id in order.into_iter().rev() {
            self.remove_node(grids, id);
        }
        Ok(())
    }

    fn remove_node(&mut self, grids: &mut dyn MapGrids, entity: EntityId) {
        if let Err(err) = self.detach_to_null(grids, entity) {
            warn!(?entity, %err, "failed to detach removed transform");
        }
        self.events.push(TransformEvent::Removed { entity });
        let Some(node) = self.nodes.remove(&entity) else {
            return;
        };
        // Maps keep their children until now; orphan anything left over.
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }
        if let Some(parent) = node.parent
            && let Some(p) = self.nodes.get_mut(&parent)
        {
            p.children.remove(&entity);
        }
        if let NodeKind::Map(id) = node.kind {
            self.maps.remove(&id);
        }
        self.grid_ids.remove(&entity);
        debug!(?entity, "transform removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::tiles::GridTiles;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).hypot() < 1e-9
    }

    fn world() -> (TransformGraph, GridTiles, EntityId) {
        let mut g = TransformGraph::default();
        let map = EntityId(1);
        g.create_map(map).unwrap();
        (g, GridTiles::new(), map)
    }

    #[test]
    fn world_position_composes_through_rotated_parent() {
        let (mut g, mut tiles, map) = world();
        let (a, b) = (EntityId(2), EntityId(3));
        g.spawn_entity(
            &mut tiles,
            a,
            EntityCoordinates::new(map, Vec2::new(10.0, 0.0)),
            Angle::from_degrees(90.0),
        )
        .unwrap();
        g.spawn_entity(
            &mut tiles,
            b,
            EntityCoordinates::new(a, Vec2::new(1.0, 0.0)),
            Angle::ZERO,
        )
        .unwrap();
        assert!(approx(g.world_position(b).unwrap(), Vec2::new(10.0, 1.0)));
        assert!(g.world_rotation(b).unwrap().close_to(Angle::from_degrees(90.0), 1e-9));
    }

    #[test]
    fn pinned_rotation_stays_zero() {
        let (mut g, mut tiles, map) = world();
        let (a, b, e) = (EntityId(2), EntityId(3), EntityId(4));
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.spawn_entity(
            &mut tiles,
            b,
            EntityCoordinates::new(map, Vec2::new(5.0, 0.0)),
            Angle::from_degrees(90.0),
        )
        .unwrap();
        g.spawn_entity(
            &mut tiles,
            e,
            EntityCoordinates::new(a, Vec2::new(1.0, 0.0)),
            Angle::from_degrees(30.0),
        )
        .unwrap();
        g.set_no_local_rotation(&mut tiles, e, true).unwrap();
        let pinned = |g: &TransformGraph| {
            g.node(e)
                .unwrap()
                .local_rotation()
                .close_to(Angle::ZERO, 1e-12)
        };
        assert!(pinned(&g));

        g.set_parent(&mut tiles, e, b).unwrap();
        assert_eq!(g.parent(e), Some(b));
        assert!(pinned(&g));

        g.set_coordinates(
            &mut tiles,
            e,
            EntityCoordinates::new(a, Vec2::ZERO),
            Some(Angle::from_degrees(45.0)),
            true,
        )
        .unwrap();
        assert_eq!(g.parent(e), Some(a));
        assert!(pinned(&g));

        g.set_coordinates(&mut tiles, e, EntityCoordinates::new(b, Vec2::ZERO), None, true)
            .unwrap();
        assert!(pinned(&g));

        g.set_local_rotation(&mut tiles, e, Angle::from_degrees(60.0))
            .unwrap();
        g.set_local_position_rotation(
            &mut tiles,
            e,
            Vec2::new(2.0, 0.0),
            Angle::from_degrees(10.0),
        )
        .unwrap();
        assert!(pinned(&g));
        assert!(approx(g.node(e).unwrap().local_position(), Vec2::new(2.0, 0.0)));
        // World rotation now comes from the parent alone.
        assert!(g.world_rotation(e).unwrap().close_to(Angle::from_degrees(90.0), 1e-9));

        g.set_no_local_rotation(&mut tiles, e, false).unwrap();
        g.set_local_rotation(&mut tiles, e, Angle::from_degrees(60.0))
            .unwrap();
        let rotation = g.node(e).unwrap().local_rotation();
        assert!(rotation.close_to(Angle::from_degrees(60.0), 1e-12));
        assert!(g.check_invariants(&tiles).is_empty());
    }

    #[test]
    fn set_parent_preserves_world_transform() {
        let (mut g, mut tiles, map) = world();
        let (a, b, c) = (EntityId(2), EntityId(3), EntityId(4));
        g.spawn_entity(
            &mut tiles,
            a,
            EntityCoordinates::new(map, Vec2::new(3.0, 4.0)),
            Angle::from_degrees(30.0),
        )
        .unwrap();
        g.spawn_entity(
            &mut tiles,
            b,
            EntityCoordinates::new(map, Vec2::new(-2.0, 1.0)),
            Angle::from_degrees(-75.0),
        )
        .unwrap();
        g.spawn_entity(
            &mut tiles,
            c,
            EntityCoordinates::new(a, Vec2::new(1.0, 2.0)),
            Angle::from_degrees(10.0),
        )
        .unwrap();
        let (pos, rot) = g.world_position_rotation(c).unwrap();
        g.drain_events();
        g.set_parent(&mut tiles, c, b).unwrap();
        let (pos2, rot2) = g.world_position_rotation(c).unwrap();
        assert!(approx(pos, pos2));
        assert!(rot.close_to(rot2, 1e-9));
        let events = g.drain_events();
        assert!(matches!(
            events.as_slice(),
            [
                TransformEvent::ParentChanged { old_parent: Some(p), .. },
                TransformEvent::Moved { .. }
            ] if *p == a
        ));
        assert!(g.check_invariants(&tiles).is_empty());
    }

    #[test]
    fn set_world_position_moves_in_parent_space() {
        let (mut g, mut tiles, map) = world();
        let (a, b) = (EntityId(2), EntityId(3));
        g.spawn_entity(
            &mut tiles,
            a,
            EntityCoordinates::new(map, Vec2::new(5.0, 5.0)),
            Angle::from_degrees(180.0),
        )
        .unwrap();
        g.spawn_entity(&mut tiles, b, EntityCoordinates::new(a, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.set_world_position(&mut tiles, b, Vec2::new(7.0, 5.0)).unwrap();
        assert!(approx(g.world_position(b).unwrap(), Vec2::new(7.0, 5.0)));
        assert!(approx(g.node(b).unwrap().local_position(), Vec2::new(-2.0, 0.0)));
    }

    #[test]
    fn tiny_moves_are_ignored() {
        let (mut g, mut tiles, map) = world();
        let a = EntityId(2);
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.drain_events();
        g.set_local_position(&mut tiles, a, Vec2::new(1e-9, 0.0)).unwrap();
        assert!(g.drain_events().is_empty());
    }

    #[test]
    fn cycles_are_rejected_under_strict_policy() {
        let (mut g, mut tiles, map) = world();
        let (a, b) = (EntityId(2), EntityId(3));
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.spawn_entity(&mut tiles, b, EntityCoordinates::new(a, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        let err = g.set_parent(&mut tiles, a, b).unwrap_err();
        assert_eq!(err, TransformError::CircularHierarchy { entity: a, parent: b });
        assert_eq!(g.parent(a), Some(map));
        assert!(g.check_invariants(&tiles).is_empty());
    }

    #[test]
    fn cycles_are_broken_under_tolerant_policy() {
        let mut g = TransformGraph::new(GraphConfig::tolerant());
        let mut tiles = GridTiles::new();
        let map = EntityId(1);
        g.create_map(map).unwrap();
        let (a, b) = (EntityId(2), EntityId(3));
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.spawn_entity(&mut tiles, b, EntityCoordinates::new(a, Vec2::new(1.0, 0.0)), Angle::ZERO)
            .unwrap();
        g.set_parent(&mut tiles, a, b).unwrap();
        assert_eq!(g.parent(a), Some(b));
        assert_eq!(g.parent(b), None);
        assert!(g.check_invariants(&tiles).is_empty());
    }

    #[test]
    fn structural_errors_queue_deletion() {
        let (mut g, mut tiles, map) = world();
        let a = EntityId(2);
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        assert_eq!(
            g.set_parent(&mut tiles, a, a),
            Err(TransformError::ParentToSelf(a))
        );
        assert_eq!(
            g.set_parent(&mut tiles, a, EntityId(99)),
            Err(TransformError::MissingParent {
                entity: a,
                parent: EntityId(99)
            })
        );
        assert_eq!(g.take_queued_deletions(), [a, a]);
    }

    #[test]
    fn delete_removes_subtree_children_first() {
        let (mut g, mut tiles, map) = world();
        let (a, b, c) = (EntityId(2), EntityId(3), EntityId(4));
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.spawn_entity(&mut tiles, b, EntityCoordinates::new(a, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.spawn_entity(&mut tiles, c, EntityCoordinates::new(b, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.drain_events();
        g.delete(&mut tiles, a).unwrap();
        let removed: Vec<_> = g
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TransformEvent::Removed { entity } => Some(entity),
                _ => None,
            })
            .collect();
        assert_eq!(removed, [c, b, a]);
        assert_eq!(g.len(), 1);
        assert!(g.children(map).is_empty());
    }

    #[test]
    fn parenting_to_terminating_entity_fails() {
        let (mut g, mut tiles, map) = world();
        let a = EntityId(2);
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO)
            .unwrap();
        g.nodes.get_mut(&map).unwrap().stage = LifeStage::Terminating;
        assert!(matches!(
            g.spawn(EntityId(3), EntityCoordinates::new(map, Vec2::ZERO), Angle::ZERO),
            Err(TransformError::TerminatingParent { .. })
        ));
    }

    #[test]
    fn reparent_children_moves_all() {
        let (mut g, mut tiles, map) = world();
        let (a, b) = (EntityId(2), EntityId(3));
        g.spawn_entity(&mut tiles, a, EntityCoordinates::new(map, Vec2::new(1.0, 0.0)), Angle::ZERO)
            .unwrap();
        g.spawn_entity(&mut tiles, b, EntityCoordinates::new(map, Vec2::new(0.0, 1.0)), Angle::ZERO)
            .unwrap();
        for i in 10..13 {
            g.spawn_entity(
                &mut tiles,
                EntityId(i),
                EntityCoordinates::new(a, Vec2::ZERO),
                Angle::ZERO,
            )
            .unwrap();
        }
        g.reparent_children(&mut tiles, a, b).unwrap();
        assert!(g.children(a).is_empty());
        assert_eq!(g.children(b).len(), 3);
        assert!(approx(g.world_position(EntityId(10)).unwrap(), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn attach_prefers_grid_under_entity() {
        let (mut g, mut tiles, map) = world();
        let grid = EntityId(5);
        let map_id = g.map_id(map);
        g.create_grid(&mut tiles, grid, map_id, Vec2::new(100.0, 0.0), Angle::ZERO)
            .unwrap();
        tiles.add_grid(grid, 1.0);
        tiles.fill(grid, crate::types::TileIndex::new(0, 0), crate::types::TileIndex::new(3, 3));
        let e = EntityId(6);
        g.spawn_entity(
            &mut tiles,
            e,
            EntityCoordinates::new(map, Vec2::new(101.5, 1.5)),
            Angle::ZERO,
        )
        .unwrap();
        g.attach_to_grid_or_map(&mut tiles, e).unwrap();
        assert_eq!(g.parent(e), Some(grid));
        assert_eq!(g.grid_uid(e), Some(grid));
        g.set_world_position(&mut tiles, e, Vec2::new(-50.0, 0.0)).unwrap();
        g.attach_to_grid_or_map(&mut tiles, e).unwrap();
        assert_eq!(g.parent(e), Some(map));
        assert_eq!(g.grid_uid(e), None);
    }
}

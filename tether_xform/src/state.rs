// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replicated transform snapshots.

use kurbo::Vec2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TransformError};
use crate::events::TransformEvent;
use crate::graph::TransformGraph;
use crate::tiles::MapGrids;
use crate::types::{Angle, EntityCoordinates, EntityId};

/// Serializable snapshot of one transform.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    /// Position in the parent's space.
    pub local_position: Vec2,
    /// Rotation relative to the parent.
    pub local_rotation: Angle,
    /// Parent entity, `None` for null-space.
    pub parent: Option<EntityId>,
    /// Whether local rotation changes are ignored.
    pub no_local_rotation: bool,
    /// Whether the entity is bound to a grid tile.
    pub anchored: bool,
}

impl TransformGraph {
    /// Snapshot the transform of `entity`.
    pub fn get_state(&self, entity: EntityId) -> Option<TransformState> {
        let node = self.nodes.get(&entity)?;
        Some(TransformState {
            local_position: node.local_position,
            local_rotation: node.local_rotation,
            parent: node.parent,
            no_local_rotation: node.no_local_rotation,
            anchored: node.anchored,
        })
    }

    /// Apply an authoritative snapshot, plus the one after it for interpolation.
    ///
    /// Cycles introduced by the snapshot are broken rather than rejected.
    /// Anchoring is restored from the snapshot; an anchored state whose parent
    /// is not a grid, or whose tile rejects the entity, leaves it unanchored.
    pub fn apply_state(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        current: &TransformState,
        next: Option<&TransformState>,
    ) -> Result<()> {
        let was = self.applying_state;
        self.applying_state = true;
        let result = self.apply_state_inner(grids, entity, current, next);
        self.applying_state = was;
        result
    }

    fn apply_state_inner(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        cur: &TransformState,
        next: Option<&TransformState>,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?;
        let was_anchored = node.anchored;
        let (prev_position, prev_rotation) = (node.local_position, node.local_rotation);
        let old_parent = node.parent;
        let changed = old_parent != cur.parent
            || (prev_position - cur.local_position).hypot() > self.config.position_epsilon
            || !prev_rotation.close_to(cur.local_rotation, self.config.rotation_epsilon);

        if was_anchored && changed {
            self.remove_registration(grids, entity);
        }
        // Stay flagged while moving so the move itself does not unanchor.
        if let Some(node) = self.nodes.get_mut(&entity) {
            node.anchored |= cur.anchored;
            node.no_local_rotation = cur.no_local_rotation;
        }
        let coords = EntityCoordinates {
            parent: cur.parent,
            position: cur.local_position,
        };
        let rotation = if cur.no_local_rotation {
            Angle::ZERO
        } else {
            cur.local_rotation
        };
        self.set_coordinates(grids, entity, coords, Some(rotation), false)?;

        let mut anchored = cur.anchored;
        if anchored && (changed || !was_anchored) {
            match cur.parent.filter(|p| self.grid_ids.contains(p)) {
                Some(grid) => {
                    let registered = grids
                        .tile_indices_for(grid, cur.local_position)
                        .is_some_and(|tile| grids.add_to_cell(grid, tile, entity));
                    if !registered {
                        warn!(?entity, ?grid, "replicated anchor rejected by tile, unanchoring");
                        anchored = false;
                    }
                }
                None => {
                    warn!(?entity, parent = ?cur.parent, "replicated anchor without a grid parent");
                    anchored = false;
                }
            }
        } else if was_anchored && !anchored && !changed {
            self.remove_registration(grids, entity);
        }

        let Some(node) = self.nodes.get_mut(&entity) else {
            return Err(TransformError::UnknownEntity(entity));
        };
        node.anchored = anchored;
        node.no_local_rotation = cur.no_local_rotation;
        node.prev_position = prev_position;
        node.prev_rotation = prev_rotation;
        match next {
            Some(n) if n.parent == cur.parent => {
                node.next_position = Some(n.local_position);
                node.next_rotation = Some(n.local_rotation);
                node.lerp_parent = n.parent;
            }
            _ => node.clear_lerp(),
        }
        if anchored != was_anchored {
            self.emit(
                entity,
                TransformEvent::AnchorStateChanged {
                    entity,
                    anchored,
                    detaching: false,
                },
            );
        }
        Ok(())
    }

    /// Drop the tile registration of `entity` at its current position.
    fn remove_registration(&mut self, grids: &mut dyn MapGrids, entity: EntityId) {
        let Some(node) = self.nodes.get(&entity) else {
            return;
        };
        if let Some(grid) = node.parent
            && let Some(tile) = grids.tile_indices_for(grid, node.local_position)
        {
            grids.remove_from_cell(grid, tile, entity);
        }
    }
}

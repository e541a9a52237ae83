// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding entities to grid tiles.

use tracing::{error, trace, warn};

use crate::events::TransformEvent;
use crate::graph::TransformGraph;
use crate::tiles::MapGrids;
use crate::types::{Angle, EntityCoordinates, EntityId, TileIndex};

impl TransformGraph {
    /// Anchor `entity` to `tile` on `grid`, snapping it to the tile center.
    ///
    /// Returns `false` if the grid is unknown, the cell rejects the entity, or
    /// the move fails. Anchoring to the tile the entity already holds is a no-op.
    pub fn anchor(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        grid: EntityId,
        tile: TileIndex,
    ) -> bool {
        let Some(node) = self.nodes.get(&entity) else {
            return false;
        };
        let Some(center) = self
            .grid_ids
            .contains(&grid)
            .then(|| grids.tile_center(grid, tile))
            .flatten()
        else {
            warn!(?entity, ?grid, "tried to anchor to something that is not a grid");
            return false;
        };
        if node.anchored {
            let held = node
                .parent
                .filter(|p| *p == grid)
                .and_then(|g| grids.tile_indices_for(g, node.local_position));
            if held == Some(tile) {
                return true;
            }
            self.unanchor(grids, entity);
        }
        if !grids.add_to_cell(grid, tile, entity) {
            trace!(?entity, ?grid, ?tile, "tile rejected anchor");
            return false;
        }
        if let Err(err) = self.set_coordinates(
            grids,
            entity,
            EntityCoordinates::new(grid, center),
            None,
            false,
        ) {
            warn!(?entity, %err, "failed to move entity onto its tile");
            grids.remove_from_cell(grid, tile, entity);
            return false;
        }
        if let Some(node) = self.nodes.get_mut(&entity) {
            node.anchored = true;
        }
        self.emit(
            entity,
            TransformEvent::AnchorStateChanged {
                entity,
                anchored: true,
                detaching: false,
            },
        );
        true
    }

    /// Release `entity` from its tile. Does nothing if it is not anchored.
    pub fn unanchor(&mut self, grids: &mut dyn MapGrids, entity: EntityId) {
        let Some(node) = self.nodes.get_mut(&entity) else {
            return;
        };
        if !node.anchored {
            return;
        }
        node.anchored = false;
        let (parent, local) = (node.parent, node.local_position);
        let cell = parent
            .filter(|p| self.grid_ids.contains(p))
            .and_then(|g| grids.tile_indices_for(g, local).map(|t| (g, t)));
        match cell {
            Some((grid, tile)) => {
                grids.remove_from_cell(grid, tile, entity);
            }
            None => error!(?entity, ?parent, "anchored entity is not parented to a grid"),
        }
        self.emit(
            entity,
            TransformEvent::AnchorStateChanged {
                entity,
                anchored: false,
                detaching: false,
            },
        );
    }

    /// Move an anchored entity to `tile` on `new_grid` without unanchoring it.
    ///
    /// Used when grids split or merge. If the new cell rejects the entity it
    /// is unanchored and left where it was. Returns whether the entity is
    /// anchored on the new grid afterwards.
    pub fn re_anchor(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        new_grid: EntityId,
        tile: TileIndex,
        rotation: Option<Angle>,
    ) -> bool {
        let Some(node) = self.nodes.get(&entity) else {
            return false;
        };
        let Some(old_grid) = node.parent.filter(|_| node.anchored) else {
            warn!(?entity, "re-anchoring an entity that is not anchored");
            return false;
        };
        let (old_coords, old_rotation, old_map) =
            (node.coordinates(), node.local_rotation, node.map);
        let old_tile = grids.tile_indices_for(old_grid, node.local_position);
        let Some(center) = self
            .grid_ids
            .contains(&new_grid)
            .then(|| grids.tile_center(new_grid, tile))
            .flatten()
        else {
            warn!(?entity, ?new_grid, "re-anchoring onto something that is not a grid");
            return false;
        };
        if new_grid != old_grid && self.contains_entity(entity, new_grid) {
            error!(?entity, ?new_grid, "re-anchoring onto a descendant");
            return false;
        }
        if !grids.add_to_cell(new_grid, tile, entity) {
            warn!(?entity, ?new_grid, ?tile, "new tile rejected re-anchored entity");
            self.unanchor(grids, entity);
            return false;
        }
        if let Some(t) = old_tile
            && (old_grid, t) != (new_grid, tile)
        {
            grids.remove_from_cell(old_grid, t, entity);
        }

        let parent_changed = new_grid != old_grid;
        if parent_changed {
            if let Some(p) = self.nodes.get_mut(&old_grid) {
                p.children.remove(&entity);
            }
            if let Some(p) = self.nodes.get_mut(&new_grid) {
                p.children.insert(entity);
            }
        }
        let new_rotation = rotation.unwrap_or(old_rotation);
        let new_coords = EntityCoordinates::new(new_grid, center);
        if let Some(node) = self.nodes.get_mut(&entity) {
            node.parent = Some(new_grid);
            node.local_position = center;
            node.local_rotation = new_rotation;
        }
        if parent_changed {
            self.propagate_ancestry(entity);
        }
        self.invalidate_subtree(entity);

        if parent_changed {
            self.emit(
                entity,
                TransformEvent::ParentChanged {
                    entity,
                    old_parent: Some(old_grid),
                    old_map,
                },
            );
        }
        self.emit(
            entity,
            TransformEvent::Moved {
                entity,
                old_position: old_coords,
                new_position: new_coords,
                old_rotation,
                new_rotation,
            },
        );
        self.emit(
            entity,
            TransformEvent::ReAnchored {
                entity,
                old_grid,
                grid: new_grid,
                tile,
            },
        );
        true
    }
}

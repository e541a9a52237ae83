// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`SpatialWorld`]: the transform graph and its lookup, kept in lockstep.

use core::fmt;

use kurbo::Vec2;
use tether_xform::{
    Angle, EntityCoordinates, EntityId, EventBus, GridTiles, InvariantViolation, MapGrids, MapId,
    Result, SubscriptionId, TileIndex, TransformEvent, TransformGraph, TransformState,
};
use tracing::{debug, warn};

use crate::config::SpatialConfig;
use crate::containers::{ContainerAccess, ContainerRegistry};
use crate::lookup::EntityLookup;
use crate::queries::LookupQuery;
use crate::shapes::Shape;

/// Owns a [`TransformGraph`], its tile occupancy, container membership and the
/// [`EntityLookup`] indexing all of it.
///
/// Every mutation drains the graph's events into the lookup before returning,
/// then forwards them to subscribers, so queries always see the latest state.
/// Entities queued for deletion by rejected structural changes are deleted at
/// the same point.
pub struct SpatialWorld {
    graph: TransformGraph,
    tiles: GridTiles,
    containers: ContainerRegistry,
    lookup: EntityLookup,
    bus: EventBus,
}

impl Default for SpatialWorld {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}

impl SpatialWorld {
    /// Create an empty world.
    pub fn new(config: SpatialConfig) -> Self {
        Self {
            graph: TransformGraph::new(config.graph),
            tiles: GridTiles::new(),
            containers: ContainerRegistry::new(),
            lookup: EntityLookup::new(config.lookup),
            bus: EventBus::new(),
        }
    }

    /// The transform graph.
    pub fn graph(&self) -> &TransformGraph {
        &self.graph
    }

    /// Tile occupancy of every grid.
    pub fn tiles(&self) -> &GridTiles {
        &self.tiles
    }

    /// Container membership.
    pub fn containers(&self) -> &ContainerRegistry {
        &self.containers
    }

    /// The broadphase lookup.
    pub fn lookup(&self) -> &EntityLookup {
        &self.lookup
    }

    /// Query capability over the current state.
    pub fn query(&self) -> LookupQuery<'_> {
        LookupQuery::new(&self.lookup, &self.graph, &self.tiles, &self.containers)
    }

    /// Receive every transform event after the lookup has seen it.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransformEvent) + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Stop delivering events to a subscriber.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Check the graph's structural invariants.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        self.graph.check_invariants(&self.tiles)
    }

    fn run<T>(&mut self, op: impl FnOnce(&mut TransformGraph, &mut GridTiles) -> T) -> T {
        let out = op(&mut self.graph, &mut self.tiles);
        self.flush();
        out
    }

    fn flush(&mut self) {
        loop {
            for event in self.graph.drain_events() {
                self.lookup.handle_event(&self.graph, &self.containers, &event);
                if let TransformEvent::Removed { entity } = event {
                    self.containers.remove(entity);
                    self.containers.remove_owner(entity);
                    self.tiles.remove_grid(entity);
                }
                self.bus.publish(&event);
            }
            let doomed = self.graph.take_queued_deletions();
            if doomed.is_empty() {
                return;
            }
            for entity in doomed {
                if !self.graph.contains(entity) {
                    continue;
                }
                debug!(?entity, "deleting entity queued by a rejected change");
                if let Err(err) = self.graph.delete(&mut self.tiles, entity) {
                    warn!(?entity, %err, "queued deletion failed");
                }
            }
        }
    }

    // --- lifecycle ---

    /// Create a map rooted at `entity`.
    pub fn create_map(&mut self, entity: EntityId) -> Result<MapId> {
        self.run(|g, _| g.create_map(entity))
    }

    /// Create a grid with square tiles of `tile_size` on `map`.
    pub fn create_grid(
        &mut self,
        entity: EntityId,
        map: MapId,
        position: Vec2,
        rotation: Angle,
        tile_size: f64,
    ) -> Result<()> {
        self.tiles.add_grid(entity, tile_size);
        let result = self.run(|g, t| g.create_grid(t, entity, map, position, rotation));
        if result.is_err() && !self.graph.contains(entity) {
            self.tiles.remove_grid(entity);
        }
        result
    }

    /// Spawn, initialize and start an entity.
    pub fn spawn(
        &mut self,
        entity: EntityId,
        coords: EntityCoordinates,
        rotation: Angle,
    ) -> Result<()> {
        self.run(|g, t| g.spawn_entity(t, entity, coords, rotation))
    }

    /// Delete `entity` and its descendants.
    pub fn delete(&mut self, entity: EntityId) -> Result<()> {
        self.run(|g, t| g.delete(t, entity))
    }

    // --- tiles ---

    /// Give a tile a floor.
    pub fn set_tile(&mut self, grid: EntityId, tile: TileIndex) -> bool {
        self.tiles.set_tile(grid, tile)
    }

    /// Floor every tile in the inclusive range.
    pub fn fill_tiles(&mut self, grid: EntityId, from: TileIndex, to: TileIndex) -> bool {
        self.tiles.fill(grid, from, to)
    }

    /// Mark a tile as holding at most one anchored entity.
    pub fn set_tile_exclusive(&mut self, grid: EntityId, tile: TileIndex, exclusive: bool) -> bool {
        self.tiles.set_exclusive(grid, tile, exclusive)
    }

    /// Remove a tile's floor, unanchoring whatever stood on it.
    pub fn clear_tile(&mut self, grid: EntityId, tile: TileIndex) {
        let anchored = self.tiles.anchored_at(grid, tile).to_vec();
        self.run(|g, t| {
            for entity in anchored {
                g.unanchor(t, entity);
            }
            t.clear_tile(grid, tile);
        });
    }

    // --- shapes ---

    /// Give `entity` fixtures or explicit sundry bounds.
    pub fn set_shape(&mut self, entity: EntityId, shape: Shape) {
        self.lookup.set_shape(&self.graph, &self.containers, entity, shape);
    }

    /// Revert `entity` to the default sundry bounds.
    pub fn clear_shape(&mut self, entity: EntityId) -> Option<Shape> {
        self.lookup.clear_shape(&self.graph, &self.containers, entity)
    }

    // --- transforms ---

    /// See [`TransformGraph::set_coordinates`].
    pub fn set_coordinates(
        &mut self,
        entity: EntityId,
        coords: EntityCoordinates,
        rotation: Option<Angle>,
        unanchor: bool,
    ) -> Result<()> {
        self.run(|g, t| g.set_coordinates(t, entity, coords, rotation, unanchor))
    }

    /// See [`TransformGraph::set_local_position`].
    pub fn set_local_position(&mut self, entity: EntityId, position: Vec2) -> Result<()> {
        self.run(|g, t| g.set_local_position(t, entity, position))
    }

    /// See [`TransformGraph::set_local_rotation`].
    pub fn set_local_rotation(&mut self, entity: EntityId, rotation: Angle) -> Result<()> {
        self.run(|g, t| g.set_local_rotation(t, entity, rotation))
    }

    /// See [`TransformGraph::set_local_position_rotation`].
    pub fn set_local_position_rotation(
        &mut self,
        entity: EntityId,
        position: Vec2,
        rotation: Angle,
    ) -> Result<()> {
        self.run(|g, t| g.set_local_position_rotation(t, entity, position, rotation))
    }

    /// See [`TransformGraph::set_world_position`].
    pub fn set_world_position(&mut self, entity: EntityId, world: Vec2) -> Result<()> {
        self.run(|g, t| g.set_world_position(t, entity, world))
    }

    /// See [`TransformGraph::set_world_rotation`].
    pub fn set_world_rotation(&mut self, entity: EntityId, rotation: Angle) -> Result<()> {
        self.run(|g, t| g.set_world_rotation(t, entity, rotation))
    }

    /// See [`TransformGraph::set_world_position_rotation`].
    pub fn set_world_position_rotation(
        &mut self,
        entity: EntityId,
        position: Vec2,
        rotation: Angle,
    ) -> Result<()> {
        self.run(|g, t| g.set_world_position_rotation(t, entity, position, rotation))
    }

    /// See [`TransformGraph::set_no_local_rotation`].
    pub fn set_no_local_rotation(&mut self, entity: EntityId, value: bool) -> Result<()> {
        self.run(|g, t| g.set_no_local_rotation(t, entity, value))
    }

    /// See [`TransformGraph::set_parent`].
    pub fn set_parent(&mut self, entity: EntityId, parent: EntityId) -> Result<()> {
        self.run(|g, t| g.set_parent(t, entity, parent))
    }

    /// See [`TransformGraph::reparent_children`].
    pub fn reparent_children(&mut self, old: EntityId, new: EntityId) -> Result<()> {
        self.run(|g, t| g.reparent_children(t, old, new))
    }

    /// See [`TransformGraph::attach_to_grid_or_map`].
    pub fn attach_to_grid_or_map(&mut self, entity: EntityId) -> Result<()> {
        self.run(|g, t| g.attach_to_grid_or_map(t, entity))
    }

    /// See [`TransformGraph::detach_to_null`].
    pub fn detach_to_null(&mut self, entity: EntityId) -> Result<()> {
        self.run(|g, t| g.detach_to_null(t, entity))
    }

    // --- anchoring ---

    /// See [`TransformGraph::anchor`].
    pub fn anchor(&mut self, entity: EntityId, grid: EntityId, tile: TileIndex) -> bool {
        self.run(|g, t| g.anchor(t, entity, grid, tile))
    }

    /// See [`TransformGraph::unanchor`].
    pub fn unanchor(&mut self, entity: EntityId) {
        self.run(|g, t| g.unanchor(t, entity));
    }

    /// See [`TransformGraph::re_anchor`].
    pub fn re_anchor(
        &mut self,
        entity: EntityId,
        grid: EntityId,
        tile: TileIndex,
        rotation: Option<Angle>,
    ) -> bool {
        self.run(|g, t| g.re_anchor(t, entity, grid, tile, rotation))
    }

    // --- replication ---

    /// See [`TransformGraph::get_state`].
    pub fn get_state(&self, entity: EntityId) -> Option<TransformState> {
        self.graph.get_state(entity)
    }

    /// See [`TransformGraph::apply_state`].
    pub fn apply_state(
        &mut self,
        entity: EntityId,
        current: &TransformState,
        next: Option<&TransformState>,
    ) -> Result<()> {
        self.run(|g, t| g.apply_state(t, entity, current, next))
    }

    // --- containers ---

    /// Put `entity` into `owner`'s container `name`.
    ///
    /// The entity is unanchored and parented to the owner at its origin, and
    /// leaves the broadphase until it is removed again. Returns `Ok(false)` if
    /// the entity is already contained, is the owner, or is an ancestor of it.
    pub fn insert_into_container(
        &mut self,
        owner: EntityId,
        name: &str,
        entity: EntityId,
    ) -> Result<bool> {
        if !self.graph.contains(owner) || !self.graph.contains(entity) {
            return Ok(false);
        }
        if self.graph.contains_entity(entity, owner)
            || !self.containers.insert(owner, name, entity)
        {
            return Ok(false);
        }
        let result = self.run(|g, t| {
            g.set_coordinates(
                t,
                entity,
                EntityCoordinates::new(owner, Vec2::ZERO),
                Some(Angle::ZERO),
                true,
            )
        });
        if let Err(err) = result {
            self.containers.remove(entity);
            return Err(err);
        }
        self.lookup.sync_recursive(&self.graph, &self.containers, entity);
        debug!(?entity, ?owner, name, "entity inserted into container");
        Ok(true)
    }

    /// Take `entity` out of its container, dropping it onto the grid or map
    /// beneath it. Returns `Ok(false)` if it was not contained.
    pub fn remove_from_container(&mut self, entity: EntityId) -> Result<bool> {
        let Some(owner) = self.containers.remove(entity) else {
            return Ok(false);
        };
        self.run(|g, t| g.attach_to_grid_or_map(t, entity))?;
        self.lookup.sync_recursive(&self.graph, &self.containers, entity);
        debug!(?entity, ?owner, "entity removed from container");
        Ok(true)
    }

    /// Whether `entity` is held in a container.
    pub fn is_in_container(&self, entity: EntityId) -> bool {
        self.containers.is_in_container(entity)
    }
}

impl fmt::Debug for SpatialWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialWorld")
            .field("graph", &self.graph)
            .field("tiles", &self.tiles)
            .field("containers", &self.containers)
            .field("lookup", &self.lookup)
            .field("bus", &self.bus)
            .finish()
    }
}

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`TransformGraph`]: the arena of transforms and its lifecycle.

use core::fmt;

use kurbo::{Affine, Point, Vec2};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error};

use crate::config::GraphConfig;
use crate::error::{InvariantViolation, Result, TransformError};
use crate::events::TransformEvent;
use crate::node::{NodeKind, TransformNode};
use crate::query::TransformQuery;
use crate::tiles::MapGrids;
use crate::types::{Angle, EntityCoordinates, EntityId, LifeStage, MapCoordinates, MapId};

/// Hierarchy of entity transforms, rooted at maps.
///
/// The graph owns every [`TransformNode`] and is the only place they are
/// mutated. Mutations queue [`TransformEvent`]s which the owner drains with
/// [`drain_events`](Self::drain_events) once the operation returns.
///
/// Operations that may touch tile occupancy take the occupancy registry as a
/// `&mut dyn MapGrids` argument.
pub struct TransformGraph {
    pub(crate) nodes: FxHashMap<EntityId, TransformNode>,
    pub(crate) maps: FxHashMap<MapId, EntityId>,
    pub(crate) grid_ids: FxHashSet<EntityId>,
    next_map: u32,
    pub(crate) config: GraphConfig,
    pub(crate) events: Vec<TransformEvent>,
    queued_deletions: Vec<EntityId>,
    pub(crate) applying_state: bool,
}

impl Default for TransformGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl TransformGraph {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: FxHashMap::default(),
            maps: FxHashMap::default(),
            grid_ids: FxHashSet::default(),
            next_map: 1,
            config,
            events: Vec::new(),
            queued_deletions: Vec::new(),
            applying_state: false,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Read-only capability over every transform.
    pub fn query(&self) -> TransformQuery<'_> {
        TransformQuery::new(&self.nodes)
    }

    /// Transform of `entity`.
    pub fn node(&self, entity: EntityId) -> Option<&TransformNode> {
        self.nodes.get(&entity)
    }

    /// Whether `entity` has a transform.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.contains_key(&entity)
    }

    /// Number of transforms, maps and grids included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no transforms.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Take the queued events, oldest first.
    pub fn drain_events(&mut self) -> Vec<TransformEvent> {
        core::mem::take(&mut self.events)
    }

    /// Take the entities queued for deletion by structural errors.
    pub fn take_queued_deletions(&mut self) -> Vec<EntityId> {
        core::mem::take(&mut self.queued_deletions)
    }

    // --- lifecycle ---

    /// Create a new map root and return its id.
    pub fn create_map(&mut self, entity: EntityId) -> Result<MapId> {
        if self.nodes.contains_key(&entity) {
            return Err(TransformError::AlreadyExists(entity));
        }
        let id = MapId(self.next_map);
        self.next_map += 1;
        let mut node =
            TransformNode::new(NodeKind::Map(id), EntityCoordinates::NULLSPACE, Angle::ZERO);
        node.map = id;
        node.map_uid = Some(entity);
        node.ancestry_resolved = true;
        node.stage = LifeStage::Initializing;
        self.nodes.insert(entity, node);
        self.maps.insert(id, entity);
        debug!(?entity, map = ?id, "map created");
        self.startup_node(entity);
        Ok(id)
    }

    /// Create a running grid on `map`.
    pub fn create_grid(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        map: MapId,
        position: Vec2,
        rotation: Angle,
    ) -> Result<()> {
        let map_uid = self.map_entity(map).ok_or(TransformError::UnknownMap(map))?;
        self.insert_node(
            entity,
            NodeKind::Grid,
            EntityCoordinates::new(map_uid, position),
            rotation,
        )?;
        self.grid_ids.insert(entity);
        self.initialize(grids, entity)?;
        self.startup(grids, entity)
    }

    /// Spawn, initialize and start an ordinary entity.
    pub fn spawn_entity(
        &mut self,
        grids: &mut dyn MapGrids,
        entity: EntityId,
        coords: EntityCoordinates,
        rotation: Angle,
    ) -> Result<()> {
        self.spawn(entity, coords, rotation)?;
        self.initialize(grids, entity)?;
        self.startup(grids, entity)
    }

    /// Give `entity` a transform without resolving its ancestry.
    ///
    /// The parent must already exist, but it does not need to be initialized.
    pub fn spawn(
        &mut self,
        entity: EntityId,
        coords: EntityCoordinates,
        rotation: Angle,
    ) -> Result<()> {
        self.insert_node(entity, NodeKind::Entity, coords, rotation)
    }

    fn insert_node(
        &mut self,
        entity: EntityId,
        kind: NodeKind,
        coords: EntityCoordinates,
        rotation: Angle,
    ) -> Result<()> {
        if self.nodes.contains_key(&entity) {
            return Err(TransformError::AlreadyExists(entity));
        }
        if let Some(parent) = coords.parent {
            if parent == entity {
                return self.reject(entity, TransformError::ParentToSelf(entity));
            }
            match self.nodes.get(&parent) {
                None => {
                    return self.reject(entity, TransformError::MissingParent { entity, parent });
                }
                Some(p) if p.stage >= LifeStage::Terminating => {
                    return self
                        .reject(entity, TransformError::TerminatingParent { entity, parent });
                }
                Some(_) => {}
            }
        }
        self.nodes
            .insert(entity, TransformNode::new(kind, coords, rotation));
        if let Some(parent) = coords.parent
            && let Some(p) = self.nodes.get_mut(&parent)
        {
            p.children.insert(entity);
        }
        Ok(())
    }

    /// Resolve map and grid, tolerating ancestors that are not initialized yet.
    ///
    /// Entities flagged as anchored (for example by an applied state) are
    /// re-registered in their tile, or unanchored if that is impossible.
    pub fn initialize(&mut self, grids: &mut dyn MapGrids, entity: EntityId) -> Result<()> {
        let node = self.nodes.get(&entity).ok_or(TransformError::UnknownEntity(entity))?;
        if node.stage != LifeStage::Uninitialized {
            return Ok(());
        }
        if let Some(parent) = node.parent {
            match self.nodes.get(&parent) {
                None => {
                    return self.reject(entity, TransformError::MissingParent { entity, parent });
                }
                Some(p) if p.stage >= LifeStage::Terminating => {
                    return self.reject(
                        entity,
                        TransformError::TerminatingParent { entity, parent },
                    );
                }
                Some(_) => {}
            }
        }
        self.resolve_ancestry(entity);
        if let Some(node) = self.nodes.get_mut(&entity) {
            node.stage = LifeStage::Initializing;
        }
        if self.nodes.get(&entity).is_some_and(|n| n.anchored) {
            self.restore_anchor(grids, entity);
        }
        Ok(())
    }

    fn restore_anchor(&mut self, grids: &mut dyn MapGrids, entity: EntityId) {
        let Some(node) = self.nodes.get(&entity) else {
            return;
        };
        let parent = node.parent;
        let local = node.local_position;
        let registered = parent.is_some_and(|grid| {
            self.grid_ids.contains(&grid)
                && grids
                    .tile_indices_for(grid, local)
                    .is_some_and(|tile| grids.add_to_cell(grid, tile, entity))
        });
        if !registered {
            debug!(?entity, "could not re-anchor on initialization, unanchoring");
            if let Some(node) = self.nodes.get_mut(&entity) {
                node.anchored = false;
            }
        }
    }

    /// Mark `entity` as running and emit its startup events.
    pub fn startup(&mut self, grids: &mut dyn MapGrids, entity: EntityId) -> Result<()> {
        let stage = self
            .nodes
            .get(&entity)
            .ok_or(TransformError::UnknownEntity(entity))?
            .stage;
        match stage {
            LifeStage::Uninitialized => {
                self.initialize(grids, entity)?;
            }
            LifeStage::Initializing => {}
            _ => return Ok(()),
        }
        self.startup_node(entity);
        Ok(())
    }

    fn startup_node(&mut self, entity: EntityId) {
        let Some(node) = self.nodes.get_mut(&entity) else {
            return;
        };
        node.stage = LifeStage::Running;
        let anchored = node.anchored;
        if anchored {
            self.events.push(TransformEvent::AnchorStateChanged {
                entity,
                anchored: true,
                detaching: false,
            });
        }
        self.events.push(TransformEvent::ParentChanged {
            entity,
            old_parent: None,
            old_map: MapId::NULLSPACE,
        });
        self.events.push(TransformEvent::Startup { entity });
    }

    /// Resolve map and grid for `entity` and any unresolved ancestors, top-down.
    fn resolve_ancestry(&mut self, entity: EntityId) {
        let mut chain = vec![entity];
        let mut cur = entity;
        while let Some(parent) = self.nodes.get(&cur).and_then(|n| n.parent) {
            match self.nodes.get(&parent) {
                Some(p) if !p.ancestry_resolved && chain.len() <= self.nodes.len() => {
                    chain.push(parent);
                    cur = parent;
                }
                _ => break,
            }
        }
        for id in chain.into_iter().rev() {
            let (map, map_uid, grid) = self.ancestry_of(id);
            if let Some(n) = self.nodes.get_mut(&id) {
                n.map = map;
                n.map_uid = map_uid;
                n.grid = grid;
                n.ancestry_resolved = true;
            }
        }
    }

    /// Map, map entity and grid `entity` should have given its current parent.
    pub(crate) fn ancestry_of(
        &self,
        entity: EntityId,
    ) -> (MapId, Option<EntityId>, Option<EntityId>) {
        let Some(node) = self.nodes.get(&entity) else {
            return (MapId::NULLSPACE, None, None);
        };
        if let NodeKind::Map(id) = node.kind {
            return (id, Some(entity), None);
        }
        let own_grid = node.is_grid().then_some(entity);
        let Some(parent) = node.parent.and_then(|p| self.nodes.get(&p).map(|n| (p, n))) else {
            return (MapId::NULLSPACE, None, own_grid);
        };
        let (pid, pn) = parent;
        let grid = own_grid.or(if pn.is_grid() { Some(pid) } else { pn.grid });
        (pn.map, pn.map_uid, grid)
    }

    /// Re-derive map and grid for `entity`'s whole subtree.
    pub(crate) fn propagate_ancestry(&mut self, entity: EntityId) {
        let mut stack = vec![entity];
        while let Some(id) = stack.pop() {
            let (map, map_uid, grid) = self.ancestry_of(id);
            if let Some(n) = self.nodes.get_mut(&id) {
                n.map = map;
                n.map_uid = map_uid;
                n.grid = grid;
                n.ancestry_resolved = true;
                stack.extend(n.children.iter().copied());
            }
        }
    }

    /// Drop cached world matrices for `entity` and every descendant.
    pub(crate) fn invalidate_subtree(&self, entity: EntityId) {
        let mut stack = vec![entity];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get(&id) {
                n.world.set(None);
                stack.extend(n.children.iter().copied());
            }
        }
    }

    /// Queue `event` if `entity` is far enough along its lifecycle to emit.
    pub(crate) fn emit(&mut self, entity: EntityId, event: TransformEvent) {
        if self
            .nodes
            .get(&entity)
            .is_some_and(|n| n.stage.emits_events())
        {
            self.events.push(event);
        }
    }

    /// Log a structural violation, queue `entity` for deletion, and fail.
    pub(crate) fn reject(&mut self, entity: EntityId, err: TransformError) -> Result<()> {
        error!(?entity, %err, "rejected transform mutation");
        self.queued_deletions.push(entity);
        Err(err)
    }

    // --- lookups ---

    /// Entity of a map.
    pub fn map_entity(&self, map: MapId) -> Option<EntityId> {
        self.maps.get(&map).copied()
    }

    /// Every map id.
    pub fn maps(&self) -> impl Iterator<Item = MapId> + '_ {
        self.maps.keys().copied()
    }

    /// Whether `entity` is a grid.
    pub fn is_grid(&self, entity: EntityId) -> bool {
        self.grid_ids.contains(&entity)
    }

    /// Whether `entity` is a map root.
    pub fn is_map(&self, entity: EntityId) -> bool {
        self.nodes.get(&entity).is_some_and(TransformNode::is_map)
    }

    /// Grids currently on `map`.
    pub fn grids_on_map(&self, map: MapId) -> impl Iterator<Item = EntityId> + '_ {
        self.grid_ids
            .iter()
            .copied()
            .filter(move |g| self.nodes.get(g).is_some_and(|n| n.map == map))
    }

    /// Parent of `entity`.
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.nodes.get(&entity).and_then(|n| n.parent)
    }

    /// Direct children of `entity`, empty if it has no transform.
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.nodes
            .get(&entity)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Map of `entity`, null-space if unknown.
    pub fn map_id(&self, entity: EntityId) -> MapId {
        self.nodes.get(&entity).map_or(MapId::NULLSPACE, |n| n.map)
    }

    /// Map entity of `entity`.
    pub fn map_uid(&self, entity: EntityId) -> Option<EntityId> {
        self.nodes.get(&entity).and_then(|n| n.map_uid)
    }

    /// Grid of `entity`.
    pub fn grid_uid(&self, entity: EntityId) -> Option<EntityId> {
        self.nodes.get(&entity).and_then(|n| n.grid)
    }

    /// Whether `entity` is anchored.
    pub fn anchored(&self, entity: EntityId) -> bool {
        self.nodes.get(&entity).is_some_and(|n| n.anchored)
    }

    /// Lifecycle stage of `entity`.
    pub fn life_stage(&self, entity: EntityId) -> Option<LifeStage> {
        self.nodes.get(&entity).map(|n| n.stage)
    }

    /// Parent-relative coordinates of `entity`.
    pub fn coordinates(&self, entity: EntityId) -> Option<EntityCoordinates> {
        self.nodes.get(&entity).map(TransformNode::coordinates)
    }

    /// See [`TransformQuery::world_matrix`].
    pub fn world_matrix(&self, entity: EntityId) -> Option<Affine> {
        self.query().world_matrix(entity)
    }

    /// See [`TransformQuery::inv_world_matrix`].
    pub fn inv_world_matrix(&self, entity: EntityId) -> Option<Affine> {
        self.query().inv_world_matrix(entity)
    }

    /// See [`TransformQuery::world_position`].
    pub fn world_position(&self, entity: EntityId) -> Option<Vec2> {
        self.query().world_position(entity)
    }

    /// See [`TransformQuery::world_rotation`].
    pub fn world_rotation(&self, entity: EntityId) -> Option<Angle> {
        self.query().world_rotation(entity)
    }

    /// See [`TransformQuery::world_position_rotation`].
    pub fn world_position_rotation(&self, entity: EntityId) -> Option<(Vec2, Angle)> {
        self.query().world_position_rotation(entity)
    }

    /// See [`TransformQuery::relative_position_rotation`].
    pub fn relative_position_rotation(
        &self,
        entity: EntityId,
        ancestor: EntityId,
    ) -> Option<(Vec2, Angle)> {
        self.query().relative_position_rotation(entity, ancestor)
    }

    /// See [`TransformQuery::contains_entity`].
    pub fn contains_entity(&self, ancestor: EntityId, entity: EntityId) -> bool {
        self.query().contains_entity(ancestor, entity)
    }

    /// See [`TransformQuery::map_coordinates`].
    pub fn map_coordinates(&self, entity: EntityId) -> Option<MapCoordinates> {
        self.query().map_coordinates(entity)
    }

    /// See [`TransformQuery::local_to_world`].
    pub fn local_to_world(&self, entity: EntityId, local: Point) -> Option<Point> {
        self.query().local_to_world(entity, local)
    }

    /// See [`TransformQuery::world_to_local`].
    pub fn world_to_local(&self, entity: EntityId, world: Point) -> Option<Point> {
        self.query().world_to_local(entity, world)
    }

    /// Grid on `map` whose tiles cover `world`, if any.
    pub fn find_grid_at(&self, grids: &dyn MapGrids, map: MapId, world: Vec2) -> Option<EntityId> {
        let q = self.query();
        self.grids_on_map(map).find(|grid| {
            let Some(bounds) = grids.local_bounds(*grid) else {
                return false;
            };
            q.world_to_local(*grid, world.to_point())
                .is_some_and(|local| bounds.contains(local))
        })
    }

    // --- invariants ---

    /// Check every structural invariant, returning all violations found.
    pub fn check_invariants(&self, grids: &dyn MapGrids) -> Vec<InvariantViolation> {
        let mut out = Vec::new();
        for (&id, node) in &self.nodes {
            if let Some(parent) = node.parent {
                match self.nodes.get(&parent) {
                    Some(p) if p.children.contains(&id) => {}
                    _ => out.push(InvariantViolation::ChildLinkMismatch { entity: id, parent }),
                }
            }
            for child in &node.children {
                if self.nodes.get(child).and_then(|c| c.parent) != Some(id) {
                    out.push(InvariantViolation::ChildLinkMismatch {
                        entity: *child,
                        parent: id,
                    });
                }
            }
            let mut steps = 0;
            let mut cur = node.parent;
            while let Some(p) = cur {
                steps += 1;
                if p == id || steps > self.nodes.len() {
                    out.push(InvariantViolation::Cycle(id));
                    break;
                }
                cur = self.nodes.get(&p).and_then(|n| n.parent);
            }
            if node.ancestry_resolved {
                let (map, map_uid, grid) = self.ancestry_of(id);
                if map != node.map || map_uid != node.map_uid {
                    out.push(InvariantViolation::MapMismatch(id));
                }
                if grid != node.grid {
                    out.push(InvariantViolation::GridMismatch(id));
                }
            }
            if node.anchored {
                let registered = node.parent.is_some_and(|grid| {
                    self.grid_ids.contains(&grid)
                        && grids
                            .tile_indices_for(grid, node.local_position)
                            .is_some_and(|tile| grids.anchored_at(grid, tile).contains(&id))
                });
                if !registered {
                    out.push(InvariantViolation::AnchorNotRegistered(id));
                }
            }
            if node.no_local_rotation && !node.local_rotation.close_to(Angle::ZERO, 1e-12) {
                out.push(InvariantViolation::RotationNotPinned(id));
            }
            if let Some(cached) = node.world.get()
                && !affine_approx_eq(self.uncached_world_matrix(id), cached)
            {
                out.push(InvariantViolation::StaleWorldMatrix(id));
            }
        }
        out
    }
}

impl TransformGraph {
    fn uncached_world_matrix(&self, entity: EntityId) -> Affine {
        let mut m = Affine::IDENTITY;
        let mut cur = Some(entity);
        let mut steps = 0;
        while let Some(id) = cur {
            let Some(n) = self.nodes.get(&id) else { break };
            m = n.local_matrix() * m;
            steps += 1;
            if n.is_map() || steps > self.nodes.len() {
                break;
            }
            cur = n.parent;
        }
        m
    }
}

fn affine_approx_eq(a: Affine, b: Affine) -> bool {
    a.as_coeffs()
        .iter()
        .zip(b.as_coeffs())
        .all(|(x, y)| (x - y).abs() <= 1e-9 * (1.0 + x.abs().max(y.abs())))
}

impl fmt::Debug for TransformGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformGraph")
            .field("nodes", &self.nodes.len())
            .field("maps", &self.maps.len())
            .field("grids", &self.grid_ids.len())
            .field("pending_events", &self.events.len())
            .field("queued_deletions", &self.queued_deletions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

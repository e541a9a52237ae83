// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`EntityLookup`]: keeps broadphase proxies in sync with the transform graph.

use core::fmt;

use kurbo::{Affine, Rect};
use rustc_hash::FxHashMap;
use tether_index::Proxy;
use tether_xform::{EntityId, TransformEvent, TransformGraph};
use tracing::{debug, trace};

use crate::broadphase::{Broadphase, FixtureProxy};
use crate::config::LookupConfig;
use crate::containers::ContainerAccess;
use crate::flags::TreeKind;
use crate::shapes::{BodyType, Fixture, Shape, rect_to_aabb, transform_rect_bbox};

#[derive(Clone, Debug)]
struct Registration {
    broadphase: EntityId,
    tree: TreeKind,
    // One per fixture for bodies, a single proxy for sundries.
    proxies: Vec<Proxy>,
}

enum Effective<'a> {
    Fixtures(BodyType, &'a [Fixture]),
    Sundry(Rect),
}

/// Broadphases of every map and grid, and the proxies of every entity in them.
///
/// The lookup does not observe the graph by itself: feed it every
/// [`TransformEvent`] through [`handle_event`](Self::handle_event), and call
/// [`sync_recursive`](Self::sync_recursive) after container membership changes.
/// [`SpatialWorld`](crate::SpatialWorld) does both.
pub struct EntityLookup {
    config: LookupConfig,
    broadphases: FxHashMap<EntityId, Broadphase>,
    shapes: FxHashMap<EntityId, Shape>,
    registrations: FxHashMap<EntityId, Registration>,
}

impl Default for EntityLookup {
    fn default() -> Self {
        Self::new(LookupConfig::default())
    }
}

impl EntityLookup {
    /// Create an empty lookup.
    pub fn new(config: LookupConfig) -> Self {
        Self {
            config,
            broadphases: FxHashMap::default(),
            shapes: FxHashMap::default(),
            registrations: FxHashMap::default(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    // --- broadphases ---

    /// Give `owner` (a map or grid) an empty broadphase. Returns `false` if it already has one.
    pub fn add_broadphase(&mut self, owner: EntityId) -> bool {
        if self.broadphases.contains_key(&owner) {
            return false;
        }
        debug!(?owner, "broadphase created");
        self.broadphases
            .insert(owner, Broadphase::new(owner, self.config.fat_margin));
        true
    }

    /// Drop `owner`'s broadphase along with every registration in it.
    pub fn remove_broadphase(&mut self, owner: EntityId) -> bool {
        if self.broadphases.remove(&owner).is_none() {
            return false;
        }
        self.registrations.retain(|_, r| r.broadphase != owner);
        debug!(?owner, "broadphase removed");
        true
    }

    /// Broadphase owned by `owner`.
    pub fn broadphase(&self, owner: EntityId) -> Option<&Broadphase> {
        self.broadphases.get(&owner)
    }

    /// Whether `owner` has a broadphase.
    pub fn has_broadphase(&self, owner: EntityId) -> bool {
        self.broadphases.contains_key(&owner)
    }

    /// Every broadphase.
    pub fn broadphases(&self) -> impl Iterator<Item = &Broadphase> + '_ {
        self.broadphases.values()
    }

    // --- shapes ---

    /// Register the shape of `entity` and re-sync its proxies.
    pub fn set_shape(
        &mut self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
        shape: Shape,
    ) {
        self.shapes.insert(entity, shape);
        // Fixture count or tree may have changed.
        self.remove_entity(entity);
        self.sync_entity(graph, containers, entity);
    }

    /// Forget the shape of `entity`, falling back to the default sundry box.
    pub fn clear_shape(
        &mut self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
    ) -> Option<Shape> {
        let old = self.shapes.remove(&entity);
        self.remove_entity(entity);
        self.sync_entity(graph, containers, entity);
        old
    }

    /// Registered shape of `entity`.
    pub fn shape(&self, entity: EntityId) -> Option<&Shape> {
        self.shapes.get(&entity)
    }

    fn effective_shape(&self, entity: EntityId) -> Effective<'_> {
        match self.shapes.get(&entity) {
            Some(Shape::Body {
                body_type,
                fixtures,
            }) if !fixtures.is_empty() => Effective::Fixtures(*body_type, fixtures),
            Some(Shape::Sundry { local_bounds }) => Effective::Sundry(*local_bounds),
            _ => {
                let h = self.config.sundry_half_extent;
                Effective::Sundry(Rect::new(-h, -h, h, h))
            }
        }
    }

    /// Local bounds of `entity`'s whole shape, including the default sundry box.
    pub fn local_bounds(&self, entity: EntityId) -> Rect {
        match self.effective_shape(entity) {
            Effective::Fixtures(_, fixtures) => fixtures
                .iter()
                .map(|f| f.local_bounds)
                .reduce(|a, b| a.union(b))
                .unwrap_or(Rect::ZERO),
            Effective::Sundry(r) => r,
        }
    }

    /// World-space bounds of `entity`.
    pub fn world_aabb(&self, graph: &TransformGraph, entity: EntityId) -> Option<Rect> {
        let m = graph.world_matrix(entity)?;
        Some(transform_rect_bbox(m, self.local_bounds(entity)))
    }

    // --- registrations ---

    /// Tree `entity` is currently registered in.
    pub fn registered_tree(&self, entity: EntityId) -> Option<TreeKind> {
        self.registrations.get(&entity).map(|r| r.tree)
    }

    /// Broadphase `entity` is currently registered in.
    pub fn registered_broadphase(&self, entity: EntityId) -> Option<EntityId> {
        self.registrations.get(&entity).map(|r| r.broadphase)
    }

    /// Number of entities with proxies.
    pub fn registered_len(&self) -> usize {
        self.registrations.len()
    }

    /// Nearest ancestor of `entity` that owns a broadphase.
    pub fn find_broadphase(&self, graph: &TransformGraph, entity: EntityId) -> Option<EntityId> {
        let mut cur = graph.parent(entity);
        let mut steps = 0;
        while let Some(p) = cur {
            if self.broadphases.contains_key(&p) {
                return Some(p);
            }
            steps += 1;
            if steps > graph.len() {
                return None;
            }
            cur = graph.parent(p);
        }
        None
    }

    fn in_container_chain(
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
        broadphase: EntityId,
    ) -> bool {
        let mut cur = Some(entity);
        let mut steps = 0;
        while let Some(e) = cur {
            if e == broadphase || steps > graph.len() {
                return false;
            }
            if containers.is_in_container(e) {
                return true;
            }
            steps += 1;
            cur = graph.parent(e);
        }
        false
    }

    fn tree_for(&self, graph: &TransformGraph, entity: EntityId) -> TreeKind {
        let anchored = graph.anchored(entity);
        match self.effective_shape(entity) {
            Effective::Fixtures(BodyType::Static, _) => TreeKind::Static,
            Effective::Fixtures(..) if anchored => TreeKind::Static,
            Effective::Fixtures(..) => TreeKind::Dynamic,
            Effective::Sundry(_) if anchored => TreeKind::StaticSundries,
            Effective::Sundry(_) => TreeKind::Sundries,
        }
    }

    /// Broadphase and local boxes `entity` should be registered with, if any.
    fn target(
        &self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
    ) -> Option<(EntityId, Vec<Rect>)> {
        let node = graph.node(entity)?;
        if node.is_map() || node.is_grid() || !node.life_stage().emits_events() {
            return None;
        }
        if node.map_id().is_nullspace() {
            return None;
        }
        let broadphase = self.find_broadphase(graph, entity)?;
        if Self::in_container_chain(graph, containers, entity, broadphase) {
            return None;
        }
        let (pos, rot) = graph.relative_position_rotation(entity, broadphase)?;
        let m = Affine::translate(pos) * rot.to_affine();
        let boxes = match self.effective_shape(entity) {
            Effective::Fixtures(_, fixtures) => fixtures
                .iter()
                .map(|f| transform_rect_bbox(m, f.local_bounds))
                .collect(),
            Effective::Sundry(r) => vec![transform_rect_bbox(m, r)],
        };
        Some((broadphase, boxes))
    }

    /// Bring the proxies of `entity` (only) in line with the graph.
    pub fn sync_entity(
        &mut self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
    ) {
        let Some((owner, boxes)) = self.target(graph, containers, entity) else {
            self.remove_entity(entity);
            return;
        };
        debug_assert!(
            graph.parent(entity).is_some(),
            "broadphase entity {entity} has no parent"
        );
        let tree = self.tree_for(graph, entity);
        let multiplier = self.config.displacement_multiplier;
        if let Some(reg) = self.registrations.get(&entity)
            && reg.broadphase == owner
            && reg.tree == tree
            && reg.proxies.len() == boxes.len()
            && let Some(bp) = self.broadphases.get_mut(&owner)
        {
            for (proxy, rect) in reg.proxies.iter().zip(&boxes) {
                let displacement = bp.tight_aabb(tree, *proxy).map_or((0.0, 0.0), |old| {
                    let (ox, oy) = ((old.min_x + old.max_x) * 0.5, (old.min_y + old.max_y) * 0.5);
                    let c = rect.center();
                    ((c.x - ox) * multiplier, (c.y - oy) * multiplier)
                });
                if bp.move_proxy(tree, *proxy, rect_to_aabb(*rect), displacement) {
                    trace!(?entity, ?owner, "proxy left its fattened box");
                }
            }
            return;
        }

        self.remove_entity(entity);
        let fixture_ids: Vec<_> = match self.effective_shape(entity) {
            Effective::Fixtures(_, fixtures) => fixtures.iter().map(|f| f.id).collect(),
            Effective::Sundry(_) => Vec::new(),
        };
        let Some(bp) = self.broadphases.get_mut(&owner) else {
            return;
        };
        let proxies: Vec<Proxy> = if tree.holds_fixtures() {
            fixture_ids
                .into_iter()
                .zip(&boxes)
                .map(|(fixture, rect)| {
                    bp.insert_fixture(tree, rect_to_aabb(*rect), FixtureProxy { entity, fixture })
                })
                .collect()
        } else {
            boxes
                .iter()
                .take(1)
                .map(|rect| bp.insert_sundry(tree, rect_to_aabb(*rect), entity))
                .collect()
        };
        trace!(?entity, ?owner, ?tree, "proxies inserted");
        self.registrations.insert(
            entity,
            Registration {
                broadphase: owner,
                tree,
                proxies,
            },
        );
    }

    /// Sync `entity` and its transform descendants, stopping at grids.
    ///
    /// Grid children are stored grid-local, so they are unaffected by anything
    /// above the grid.
    pub fn sync_recursive(
        &mut self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        entity: EntityId,
    ) {
        if graph.is_map(entity) || graph.is_grid(entity) {
            return;
        }
        let mut stack = vec![entity];
        while let Some(id) = stack.pop() {
            self.sync_entity(graph, containers, id);
            if let Some(node) = graph.node(id) {
                stack.extend(node.children().filter(|c| !graph.is_grid(*c)));
            }
        }
    }

    /// Remove every proxy of `entity`. Returns whether it had any.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        let Some(reg) = self.registrations.remove(&entity) else {
            return false;
        };
        if let Some(bp) = self.broadphases.get_mut(&reg.broadphase) {
            for proxy in reg.proxies {
                bp.remove(reg.tree, proxy);
            }
        }
        trace!(?entity, owner = ?reg.broadphase, "proxies removed");
        true
    }

    /// Apply one transform event.
    pub fn handle_event(
        &mut self,
        graph: &TransformGraph,
        containers: &dyn ContainerAccess,
        event: &TransformEvent,
    ) {
        match *event {
            TransformEvent::Startup { entity } => {
                if graph.is_map(entity) || graph.is_grid(entity) {
                    self.add_broadphase(entity);
                } else {
                    self.sync_recursive(graph, containers, entity);
                }
            }
            TransformEvent::Moved { entity, .. }
            | TransformEvent::ParentChanged { entity, .. }
            | TransformEvent::ReAnchored { entity, .. } => {
                self.sync_recursive(graph, containers, entity);
            }
            TransformEvent::AnchorStateChanged { entity, .. } => {
                self.sync_entity(graph, containers, entity);
            }
            TransformEvent::Removed { entity } => {
                self.remove_entity(entity);
                self.remove_broadphase(entity);
                self.shapes.remove(&entity);
            }
        }
    }
}

impl fmt::Debug for EntityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLookup")
            .field("broadphases", &self.broadphases.len())
            .field("shapes", &self.shapes.len())
            .field("registered", &self.registrations.len())
            .field("config", &self.config)
            .finish()
    }
}

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Region queries over the broadphases of a map.

use core::fmt;

use kurbo::{Point, Rect, Vec2};
use rustc_hash::FxHashSet;
use tether_xform::{Angle, EntityId, MapCoordinates, MapGrids, MapId, TileIndex, TransformGraph};

use crate::containers::ContainerAccess;
use crate::flags::LookupFlags;
use crate::lookup::EntityLookup;
use crate::shapes::{RotatedBox, rect_to_aabb, rects_overlap, transform_rect_bbox};

/// Shrink applied to tile bounds so a tile query does not pick up neighbors
/// that merely touch its edges.
const TILE_INSET: f64 = 1e-3;

/// Read-only capability for spatial queries.
///
/// Bundles the lookup with the graph, tile occupancy and container membership
/// it needs. Build one per batch of queries; results are snapshots.
#[derive(Copy, Clone)]
pub struct LookupQuery<'a> {
    lookup: &'a EntityLookup,
    graph: &'a TransformGraph,
    grids: &'a dyn MapGrids,
    containers: &'a dyn ContainerAccess,
}

enum Region {
    World(Rect),
    Rotated(RotatedBox),
}

impl Region {
    fn world_bounds(&self) -> Rect {
        match self {
            Self::World(r) => *r,
            Self::Rotated(b) => b.bounding_rect(),
        }
    }
}

impl<'a> LookupQuery<'a> {
    /// Bundle the pieces a query needs.
    pub fn new(
        lookup: &'a EntityLookup,
        graph: &'a TransformGraph,
        grids: &'a dyn MapGrids,
        containers: &'a dyn ContainerAccess,
    ) -> Self {
        Self {
            lookup,
            graph,
            grids,
            containers,
        }
    }

    // --- regions ---

    /// Grids on `map` whose tile bounds overlap the world rectangle.
    pub fn find_grids_intersecting(&self, map: MapId, world: Rect) -> Vec<EntityId> {
        if map.is_nullspace() {
            return Vec::new();
        }
        self.graph
            .grids_on_map(map)
            .filter(|grid| {
                let Some(local) = self.grids.local_bounds(*grid) else {
                    return false;
                };
                self.graph
                    .world_matrix(*grid)
                    .is_some_and(|m| rects_overlap(transform_rect_bbox(m, local), world))
            })
            .collect()
    }

    /// Owners of the broadphases a world rectangle on `map` may touch: the
    /// overlapping grids followed by the map itself.
    pub fn find_broadphases_intersecting(&self, map: MapId, world: Rect) -> Vec<EntityId> {
        let Some(map_uid) = self.graph.map_entity(map) else {
            return Vec::new();
        };
        let mut out: Vec<_> = self
            .find_grids_intersecting(map, world)
            .into_iter()
            .filter(|g| self.lookup.has_broadphase(*g))
            .collect();
        if self.lookup.has_broadphase(map_uid) {
            out.push(map_uid);
        }
        out
    }

    /// Visit every entity a region of `map` may hold, without exact filtering
    /// of rotated regions or container expansion. Returns `false` if stopped.
    fn visit_region(
        &self,
        map: MapId,
        region: &Region,
        flags: LookupFlags,
        visit: &mut dyn FnMut(EntityId) -> bool,
    ) -> bool {
        let world = region.world_bounds();
        for owner in self.find_broadphases_intersecting(map, world) {
            let Some(inv) = self.graph.inv_world_matrix(owner) else {
                continue;
            };
            let local = match region {
                Region::World(r) => transform_rect_bbox(inv, *r),
                Region::Rotated(b) => b.bounds_in(inv),
            };
            if let Some(bp) = self.lookup.broadphase(owner)
                && !bp.query(rect_to_aabb(local), flags, visit)
            {
                return false;
            }
            if flags.contains(LookupFlags::STATIC)
                && self.graph.is_grid(owner)
                && !self.grids.anchored_entities(owner, local, visit)
            {
                return false;
            }
        }
        true
    }

    fn passes_exact(&self, region: &Region, flags: LookupFlags, entity: EntityId) -> bool {
        match region {
            Region::Rotated(b) if !flags.approximate() => self
                .lookup
                .world_aabb(self.graph, entity)
                .is_some_and(|aabb| b.intersects_rect(aabb)),
            _ => true,
        }
    }

    fn collect_region(
        &self,
        map: MapId,
        region: &Region,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let mut out = FxHashSet::default();
        if map.is_nullspace() {
            return out;
        }
        self.visit_region(map, region, flags, &mut |e| {
            if self.passes_exact(region, flags, e) {
                out.insert(e);
            }
            true
        });
        self.expand_contained(&mut out, flags);
        out
    }

    fn any_in_region(
        &self,
        map: MapId,
        region: &Region,
        flags: LookupFlags,
        ignore: Option<EntityId>,
    ) -> bool {
        if map.is_nullspace() {
            return false;
        }
        let mut found = false;
        self.visit_region(map, region, flags, &mut |e| {
            if Some(e) != ignore && self.passes_exact(region, flags, e) {
                found = true;
                return false;
            }
            true
        });
        if found || !flags.contains(LookupFlags::CONTAINED) {
            return found;
        }
        // Contained entities only reach the result through expansion.
        let mut all = self.collect_region(map, region, flags);
        if let Some(e) = ignore {
            all.remove(&e);
        }
        !all.is_empty()
    }

    /// Add everything held in containers of the entities found, recursively,
    /// along with the transform descendants of what was added.
    fn expand_contained(&self, out: &mut FxHashSet<EntityId>, flags: LookupFlags) {
        if !flags.contains(LookupFlags::CONTAINED) {
            return;
        }
        let mut stack: Vec<EntityId> = out.iter().copied().collect();
        while let Some(e) = stack.pop() {
            if self.containers.has_containers(e) {
                for container in self.containers.containers(e) {
                    for held in &container.contents {
                        if out.insert(*held) {
                            stack.push(*held);
                        }
                    }
                }
            }
            if (self.containers.is_in_container(e) || self.is_inside_container(e))
                && let Some(node) = self.graph.node(e)
            {
                for child in node.children() {
                    if out.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    fn is_inside_container(&self, entity: EntityId) -> bool {
        let mut cur = self.graph.parent(entity);
        let mut steps = 0;
        while let Some(p) = cur {
            if self.containers.is_in_container(p) {
                return true;
            }
            steps += 1;
            if steps > self.graph.len() {
                return false;
            }
            cur = self.graph.parent(p);
        }
        false
    }

    // --- box queries ---

    /// Entities on `map` overlapping a world rectangle.
    pub fn entities_intersecting(
        &self,
        map: MapId,
        world: Rect,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        self.collect_region(map, &Region::World(world), flags)
    }

    /// Whether any entity on `map` other than `ignore` overlaps a world rectangle.
    pub fn any_entities_intersecting(
        &self,
        map: MapId,
        world: Rect,
        flags: LookupFlags,
        ignore: Option<EntityId>,
    ) -> bool {
        self.any_in_region(map, &Region::World(world), flags, ignore)
    }

    /// Entities on `map` overlapping a rotated world box.
    ///
    /// Exact queries test each candidate's world bounds against the box itself;
    /// approximate queries stop at its axis-aligned bounds.
    pub fn entities_intersecting_rotated(
        &self,
        map: MapId,
        bounds: RotatedBox,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        self.collect_region(map, &Region::Rotated(bounds), flags)
    }

    /// Whether any entity on `map` overlaps a rotated world box.
    pub fn any_entities_intersecting_rotated(
        &self,
        map: MapId,
        bounds: RotatedBox,
        flags: LookupFlags,
        ignore: Option<EntityId>,
    ) -> bool {
        self.any_in_region(map, &Region::Rotated(bounds), flags, ignore)
    }

    /// Entities overlapping the world bounds of `entity`, excluding itself.
    pub fn entities_intersecting_entity(
        &self,
        entity: EntityId,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let Some(aabb) = self.lookup.world_aabb(self.graph, entity) else {
            return FxHashSet::default();
        };
        let mut out = self.entities_intersecting(self.graph.map_id(entity), aabb, flags);
        out.remove(&entity);
        out
    }

    /// Entities whose bounds contain a map position.
    pub fn entities_intersecting_coords(
        &self,
        coords: MapCoordinates,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let p = coords.position;
        self.entities_intersecting(coords.map, Rect::new(p.x, p.y, p.x, p.y), flags)
    }

    // --- range queries ---

    fn range_box(center: Vec2, range: f64) -> Rect {
        Rect::new(center.x - range, center.y - range, center.x + range, center.y + range)
    }

    /// Entities within `range` of a map position, approximated by a square.
    pub fn entities_in_range(
        &self,
        coords: MapCoordinates,
        range: f64,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        self.entities_intersecting(coords.map, Self::range_box(coords.position, range), flags)
    }

    /// Whether anything other than `ignore` is within `range` of a map position.
    pub fn any_entities_in_range(
        &self,
        coords: MapCoordinates,
        range: f64,
        flags: LookupFlags,
        ignore: Option<EntityId>,
    ) -> bool {
        let bounds = Self::range_box(coords.position, range);
        self.any_entities_intersecting(coords.map, bounds, flags, ignore)
    }

    /// Entities within `range` of `entity`, excluding itself.
    pub fn entities_in_range_of(
        &self,
        entity: EntityId,
        range: f64,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let Some(coords) = self.graph.map_coordinates(entity) else {
            return FxHashSet::default();
        };
        let mut out = self.entities_in_range(coords, range, flags);
        out.remove(&entity);
        out
    }

    /// Entities within `range` whose world position lies in an arc.
    ///
    /// The arc is centered on `direction` and spans `arc_width` in total.
    /// Entities exactly at the origin are included.
    pub fn entities_in_arc(
        &self,
        coords: MapCoordinates,
        range: f64,
        direction: Angle,
        arc_width: Angle,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let half = arc_width.radians().abs() * 0.5;
        let mut out = self.entities_in_range(coords, range, flags);
        out.retain(|e| {
            let Some(pos) = self.graph.world_position(*e) else {
                return false;
            };
            let delta = pos - coords.position;
            if delta.hypot2() <= f64::EPSILON {
                return true;
            }
            let angle = Angle::from_radians(delta.y.atan2(delta.x));
            (angle - direction).reduced().radians().abs() <= half
        });
        out
    }

    // --- tile queries ---

    /// Grid-local bounds of a tile.
    pub fn tile_local_bounds(&self, grid: EntityId, tile: TileIndex) -> Option<Rect> {
        self.grids.tile_local_bounds(grid, tile)
    }

    /// World-space box covered by a tile, following the grid's rotation.
    pub fn tile_world_bounds(&self, grid: EntityId, tile: TileIndex) -> Option<RotatedBox> {
        let local = self.tile_local_bounds(grid, tile)?;
        let m = self.graph.world_matrix(grid)?;
        let rot = self.graph.world_rotation(grid)?;
        Some(RotatedBox::from_rect(m, local, rot))
    }

    /// Entities in `grid`'s broadphase overlapping a tile, plus (with
    /// [`LookupFlags::STATIC`]) entities anchored to it.
    pub fn entities_intersecting_tile(
        &self,
        grid: EntityId,
        tile: TileIndex,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        self.entities_intersecting_tiles(grid, core::iter::once(tile), flags)
    }

    /// Union of [`entities_intersecting_tile`](Self::entities_intersecting_tile)
    /// over several tiles.
    pub fn entities_intersecting_tiles(
        &self,
        grid: EntityId,
        tiles: impl IntoIterator<Item = TileIndex>,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let mut out = FxHashSet::default();
        if self.graph.map_id(grid).is_nullspace() {
            return out;
        }
        for tile in tiles {
            let Some(bounds) = self.tile_local_bounds(grid, tile) else {
                continue;
            };
            let local = bounds.inset(-TILE_INSET);
            self.visit_local(grid, local, flags, &mut |e| {
                out.insert(e);
                true
            });
        }
        self.expand_contained(&mut out, flags);
        out
    }

    fn visit_local(
        &self,
        owner: EntityId,
        local: Rect,
        flags: LookupFlags,
        visit: &mut dyn FnMut(EntityId) -> bool,
    ) -> bool {
        if let Some(bp) = self.lookup.broadphase(owner)
            && !bp.query(rect_to_aabb(local), flags, visit)
        {
            return false;
        }
        if flags.contains(LookupFlags::STATIC) && self.graph.is_grid(owner) {
            return self.grids.anchored_entities(owner, local, visit);
        }
        true
    }

    /// Entities in one broadphase overlapping a rectangle in its owner's local space.
    pub fn local_entities_intersecting(
        &self,
        owner: EntityId,
        local: Rect,
        flags: LookupFlags,
    ) -> FxHashSet<EntityId> {
        let mut out = FxHashSet::default();
        self.visit_local(owner, local, flags, &mut |e| {
            out.insert(e);
            true
        });
        self.expand_contained(&mut out, flags);
        out
    }

    /// World bounds of `entity`.
    pub fn world_aabb(&self, entity: EntityId) -> Option<Rect> {
        self.lookup.world_aabb(self.graph, entity)
    }

    /// World position of `entity` as a point.
    pub fn world_point(&self, entity: EntityId) -> Option<Point> {
        self.graph.world_position(entity).map(Vec2::to_point)
    }
}

impl fmt::Debug for LookupQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupQuery")
            .field("lookup", self.lookup)
            .field("graph", self.graph)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Rect, Vec2};
    use tether_xform::{Angle, EntityCoordinates, EntityId, MapCoordinates, MapId, TileIndex};

    use crate::flags::LookupFlags;
    use crate::world::SpatialWorld;

    const MAP: EntityId = EntityId(1);
    const GRID: EntityId = EntityId(2);

    fn world() -> (SpatialWorld, MapId) {
        let mut w = SpatialWorld::default();
        let map = w.create_map(MAP).unwrap();
        w.create_grid(GRID, map, Vec2::new(10.0, 0.0), Angle::ZERO, 1.0)
            .unwrap();
        w.fill_tiles(GRID, TileIndex::new(0, 0), TileIndex::new(4, 4));
        (w, map)
    }

    #[test]
    fn broadphases_list_grids_before_the_map() {
        let (w, map) = world();
        let q = w.query();
        assert_eq!(
            q.find_broadphases_intersecting(map, Rect::new(9.0, 0.0, 12.0, 2.0)),
            vec![GRID, MAP]
        );
        assert_eq!(
            q.find_broadphases_intersecting(map, Rect::new(-5.0, -5.0, -4.0, -4.0)),
            vec![MAP]
        );
        let nowhere = q.find_grids_intersecting(MapId::NULLSPACE, Rect::new(9.0, 0.0, 12.0, 2.0));
        assert!(nowhere.is_empty());
    }

    #[test]
    fn neighbouring_tiles_do_not_share_entities() {
        let (mut w, _) = world();
        let e = EntityId(10);
        w.spawn(e, EntityCoordinates::new(GRID, Vec2::new(1.5, 1.5)), Angle::ZERO)
            .unwrap();
        assert!(w.anchor(e, GRID, TileIndex::new(1, 1)));
        let q = w.query();
        let on = q.entities_intersecting_tile(GRID, TileIndex::new(1, 1), LookupFlags::DEFAULT);
        let next = q.entities_intersecting_tile(GRID, TileIndex::new(2, 1), LookupFlags::DEFAULT);
        assert!(on.contains(&e));
        assert!(!next.contains(&e));
        let both = q.entities_intersecting_tiles(
            GRID,
            [TileIndex::new(0, 0), TileIndex::new(1, 1)],
            LookupFlags::DEFAULT,
        );
        assert!(both.contains(&e));
    }

    #[test]
    fn tile_world_bounds_follow_the_grid() {
        let (mut w, _) = world();
        w.set_world_rotation(GRID, Angle::from_degrees(90.0)).unwrap();
        let q = w.query();
        let tile = q.tile_world_bounds(GRID, TileIndex::new(0, 0)).unwrap();
        // Local (0.5, 0.5) rotated a quarter turn about the grid origin.
        assert!((tile.center - Point::new(9.5, 0.5)).hypot() < 1e-9);
        assert!(tile.contains(Point::new(9.2, 0.8)));
        assert!(!tile.contains(Point::new(10.5, 0.5)));
        assert_eq!(
            q.tile_local_bounds(GRID, TileIndex::new(0, 0)),
            Some(Rect::new(0.0, 0.0, 1.0, 1.0))
        );
    }

    #[test]
    fn entity_queries_skip_the_entity_itself() {
        let (mut w, map) = world();
        let (a, b) = (EntityId(10), EntityId(11));
        for (e, x) in [(a, -3.0), (b, -2.8)] {
            w.spawn(e, EntityCoordinates::new(MAP, Vec2::new(x, 0.0)), Angle::ZERO)
                .unwrap();
        }
        let q = w.query();
        let near_a = q.entities_in_range_of(a, 0.5, LookupFlags::DEFAULT);
        assert!(near_a.contains(&b));
        assert!(!near_a.contains(&a));
        let at_a = MapCoordinates::new(map, Vec2::new(-3.0, 0.0));
        assert!(q.any_entities_in_range(at_a, 0.1, LookupFlags::DEFAULT, None));
        assert!(!q.any_entities_in_range(at_a, 0.1, LookupFlags::ALL_TREES, Some(a)));
    }
}

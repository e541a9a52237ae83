// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid tile occupancy.
//!
//! Anchored entities are registered in the cell of the grid tile they sit
//! on. The transform graph talks to occupancy through the [`MapGrids`] trait;
//! [`GridTiles`] is the in-memory implementation used by the rest of the workspace.

use core::fmt;

use kurbo::{Rect, Vec2};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{EntityId, TileIndex};

/// Tile-occupancy registry consumed by anchoring.
pub trait MapGrids {
    /// Edge length of a grid's square tiles, or `None` if `grid` is not registered.
    fn tile_size(&self, grid: EntityId) -> Option<f64>;

    /// Register `entity` in a tile cell. Returns `false` if the cell rejects it.
    fn add_to_cell(&mut self, grid: EntityId, tile: TileIndex, entity: EntityId) -> bool;

    /// Remove `entity` from a tile cell. Returns `false` if it was not registered there.
    fn remove_from_cell(&mut self, grid: EntityId, tile: TileIndex, entity: EntityId) -> bool;

    /// Entities registered in a tile cell.
    fn anchored_at(&self, grid: EntityId, tile: TileIndex) -> &[EntityId];

    /// Visit entities anchored on any tile overlapping `local` (grid-local space).
    /// The visitor returns `false` to stop; the return value reports whether
    /// the visit ran to completion.
    fn anchored_entities(
        &self,
        grid: EntityId,
        local: Rect,
        visit: &mut dyn FnMut(EntityId) -> bool,
    ) -> bool;

    /// Grid-local bounds of every non-empty tile, or `None` if the grid has no tiles.
    fn local_bounds(&self, grid: EntityId) -> Option<Rect>;

    /// Tile containing a grid-local position.
    fn tile_indices_for(&self, grid: EntityId, local: Vec2) -> Option<TileIndex> {
        let size = self.tile_size(grid)?;
        Some(tile_at(local, size))
    }

    /// Grid-local position of a tile's center.
    fn tile_center(&self, grid: EntityId, tile: TileIndex) -> Option<Vec2> {
        let size = self.tile_size(grid)?;
        Some(Vec2::new(
            (f64::from(tile.x) + 0.5) * size,
            (f64::from(tile.y) + 0.5) * size,
        ))
    }

    /// Grid-local bounds of a single tile.
    fn tile_local_bounds(&self, grid: EntityId, tile: TileIndex) -> Option<Rect> {
        let size = self.tile_size(grid)?;
        let x0 = f64::from(tile.x) * size;
        let y0 = f64::from(tile.y) * size;
        Some(Rect::new(x0, y0, x0 + size, y0 + size))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Tile coordinates beyond i32 are outside any supported grid."
)]
fn tile_at(local: Vec2, size: f64) -> TileIndex {
    TileIndex::new(
        (local.x / size).floor() as i32,
        (local.y / size).floor() as i32,
    )
}

/// Inclusive tile range covered by a local rectangle.
fn tile_range(local: Rect, size: f64) -> (TileIndex, TileIndex) {
    let lo = tile_at(Vec2::new(local.x0, local.y0), size);
    let mut hi = tile_at(Vec2::new(local.x1, local.y1), size);
    // A max edge that lies exactly on a tile boundary does not reach into the next tile.
    if local.x1 > local.x0 && (local.x1 / size).fract() == 0.0 {
        hi.x -= 1;
    }
    if local.y1 > local.y0 && (local.y1 / size).fract() == 0.0 {
        hi.y -= 1;
    }
    (lo, TileIndex::new(hi.x.max(lo.x), hi.y.max(lo.y)))
}

#[derive(Clone, Debug, Default)]
struct TileCell {
    exclusive: bool,
    anchored: Vec<EntityId>,
}

#[derive(Clone, Debug)]
struct GridData {
    tile_size: f64,
    tiles: FxHashMap<TileIndex, TileCell>,
}

/// In-memory tile occupancy for every grid.
///
/// A tile must exist (have a floor, via [`GridTiles::set_tile`]) before
/// anything can anchor to it. Exclusive tiles accept a single occupant.
#[derive(Clone, Default)]
pub struct GridTiles {
    grids: FxHashMap<EntityId, GridData>,
}

impl GridTiles {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grid with the given tile size. Re-registering keeps existing tiles.
    pub fn add_grid(&mut self, grid: EntityId, tile_size: f64) {
        self.grids
            .entry(grid)
            .and_modify(|g| g.tile_size = tile_size)
            .or_insert_with(|| GridData {
                tile_size,
                tiles: FxHashMap::default(),
            });
    }

    /// Forget a grid and all its tiles.
    pub fn remove_grid(&mut self, grid: EntityId) -> bool {
        self.grids.remove(&grid).is_some()
    }

    /// Whether `grid` is registered.
    pub fn is_grid(&self, grid: EntityId) -> bool {
        self.grids.contains_key(&grid)
    }

    /// Give a tile a floor so entities can anchor to it.
    pub fn set_tile(&mut self, grid: EntityId, tile: TileIndex) -> bool {
        let Some(g) = self.grids.get_mut(&grid) else {
            return false;
        };
        g.tiles.entry(tile).or_default();
        true
    }

    /// Fill every tile in the inclusive rectangle `from..=to`.
    pub fn fill(&mut self, grid: EntityId, from: TileIndex, to: TileIndex) -> bool {
        let Some(g) = self.grids.get_mut(&grid) else {
            return false;
        };
        for y in from.y.min(to.y)..=from.y.max(to.y) {
            for x in from.x.min(to.x)..=from.x.max(to.x) {
                g.tiles.entry(TileIndex::new(x, y)).or_default();
            }
        }
        true
    }

    /// Mark a tile as accepting at most one occupant.
    pub fn set_exclusive(&mut self, grid: EntityId, tile: TileIndex, exclusive: bool) -> bool {
        match self.grids.get_mut(&grid).and_then(|g| g.tiles.get_mut(&tile)) {
            Some(cell) => {
                cell.exclusive = exclusive;
                true
            }
            None => false,
        }
    }

    /// Remove a tile's floor, returning the entities that were anchored to it.
    ///
    /// The caller is expected to unanchor those entities.
    pub fn clear_tile(&mut self, grid: EntityId, tile: TileIndex) -> Vec<EntityId> {
        self.grids
            .get_mut(&grid)
            .and_then(|g| g.tiles.remove(&tile))
            .map(|cell| cell.anchored)
            .unwrap_or_default()
    }

    /// Whether a tile has a floor.
    pub fn has_tile(&self, grid: EntityId, tile: TileIndex) -> bool {
        self.grids
            .get(&grid)
            .is_some_and(|g| g.tiles.contains_key(&tile))
    }

    /// Iterate the registered grids.
    pub fn grids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.grids.keys().copied()
    }
}

impl MapGrids for GridTiles {
    fn tile_size(&self, grid: EntityId) -> Option<f64> {
        self.grids.get(&grid).map(|g| g.tile_size)
    }

    fn add_to_cell(&mut self, grid: EntityId, tile: TileIndex, entity: EntityId) -> bool {
        let Some(cell) = self.grids.get_mut(&grid).and_then(|g| g.tiles.get_mut(&tile)) else {
            trace!(?grid, ?tile, ?entity, "no floor to anchor to");
            return false;
        };
        if cell.anchored.contains(&entity) {
            return true;
        }
        if cell.exclusive && !cell.anchored.is_empty() {
            trace!(?grid, ?tile, ?entity, "exclusive tile already occupied");
            return false;
        }
        cell.anchored.push(entity);
        true
    }

    fn remove_from_cell(&mut self, grid: EntityId, tile: TileIndex, entity: EntityId) -> bool {
        let Some(cell) = self.grids.get_mut(&grid).and_then(|g| g.tiles.get_mut(&tile)) else {
            return false;
        };
        let before = cell.anchored.len();
        cell.anchored.retain(|e| *e != entity);
        cell.anchored.len() != before
    }

    fn anchored_at(&self, grid: EntityId, tile: TileIndex) -> &[EntityId] {
        self.grids
            .get(&grid)
            .and_then(|g| g.tiles.get(&tile))
            .map_or(&[][..], |cell| cell.anchored.as_slice())
    }

    fn anchored_entities(
        &self,
        grid: EntityId,
        local: Rect,
        visit: &mut dyn FnMut(EntityId) -> bool,
    ) -> bool {
        let Some(g) = self.grids.get(&grid) else {
            return true;
        };
        let (lo, hi) = tile_range(local, g.tile_size);
        let span = i64::from(hi.x - lo.x + 1) * i64::from(hi.y - lo.y + 1);
        if span > i64::try_from(g.tiles.len()).unwrap_or(i64::MAX) {
            // Sparse grid: scanning the occupied tiles is cheaper than the range.
            for (tile, cell) in &g.tiles {
                if tile.x < lo.x || tile.x > hi.x || tile.y < lo.y || tile.y > hi.y {
                    continue;
                }
                for e in &cell.anchored {
                    if !visit(*e) {
                        return false;
                    }
                }
            }
            return true;
        }
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let Some(cell) = g.tiles.get(&TileIndex::new(x, y)) else {
                    continue;
                };
                for e in &cell.anchored {
                    if !visit(*e) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn local_bounds(&self, grid: EntityId) -> Option<Rect> {
        let g = self.grids.get(&grid)?;
        let mut tiles = g.tiles.keys();
        let first = tiles.next()?;
        let (lo, hi) = tiles.fold((*first, *first), |(lo, hi), t| {
            (
                TileIndex::new(lo.x.min(t.x), lo.y.min(t.y)),
                TileIndex::new(hi.x.max(t.x), hi.y.max(t.y)),
            )
        });
        let s = g.tile_size;
        Some(Rect::new(
            f64::from(lo.x) * s,
            f64::from(lo.y) * s,
            f64::from(hi.x + 1) * s,
            f64::from(hi.y + 1) * s,
        ))
    }
}

impl fmt::Debug for GridTiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiles: usize = self.grids.values().map(|g| g.tiles.len()).sum();
        f.debug_struct("GridTiles")
            .field("grids", &self.grids.len())
            .field("tiles", &tiles)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: EntityId = EntityId(10);

    fn grid() -> GridTiles {
        let mut tiles = GridTiles::new();
        tiles.add_grid(G, 1.0);
        tiles.fill(G, TileIndex::new(0, 0), TileIndex::new(4, 4));
        tiles
    }

    #[test]
    fn anchoring_requires_a_floor() {
        let mut tiles = grid();
        assert!(tiles.add_to_cell(G, TileIndex::new(2, 2), EntityId(1)));
        assert!(!tiles.add_to_cell(G, TileIndex::new(9, 9), EntityId(1)));
        assert_eq!(tiles.anchored_at(G, TileIndex::new(2, 2)), [EntityId(1)]);
    }

    #[test]
    fn exclusive_tiles_reject_second_occupant() {
        let mut tiles = grid();
        let t = TileIndex::new(1, 1);
        tiles.set_exclusive(G, t, true);
        assert!(tiles.add_to_cell(G, t, EntityId(1)));
        assert!(!tiles.add_to_cell(G, t, EntityId(2)));
        assert!(tiles.add_to_cell(G, t, EntityId(1)), "re-adding is idempotent");
        assert!(tiles.remove_from_cell(G, t, EntityId(1)));
        assert!(tiles.add_to_cell(G, t, EntityId(2)));
    }

    #[test]
    fn tile_math() {
        let mut tiles = GridTiles::new();
        tiles.add_grid(G, 2.0);
        assert_eq!(
            tiles.tile_indices_for(G, Vec2::new(-0.5, 3.9)),
            Some(TileIndex::new(-1, 1))
        );
        assert_eq!(
            tiles.tile_center(G, TileIndex::new(3, 2)),
            Some(Vec2::new(7.0, 5.0))
        );
        assert_eq!(tiles.local_bounds(G), None);
        tiles.set_tile(G, TileIndex::new(-1, 0));
        tiles.set_tile(G, TileIndex::new(2, 3));
        assert_eq!(tiles.local_bounds(G), Some(Rect::new(-2.0, 0.0, 6.0, 8.0)));
    }

    #[test]
    fn anchored_entities_respects_tile_edges() {
        let mut tiles = grid();
        tiles.add_to_cell(G, TileIndex::new(1, 1), EntityId(1));
        tiles.add_to_cell(G, TileIndex::new(2, 1), EntityId(2));
        let mut seen = Vec::new();
        tiles.anchored_entities(G, Rect::new(1.2, 1.2, 2.0, 1.8), &mut |e| {
            seen.push(e);
            true
        });
        assert_eq!(seen, [EntityId(1)]);
    }
}

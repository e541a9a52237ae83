// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tether Lookup: broadphase entity lookup over a `tether_xform` hierarchy.
//!
//! - Every map and grid owns a [`Broadphase`] of four proxy trees, stored in
//!   the owner's local space: dynamic and static fixtures, and "sundries"
//!   (entities without physics), anchored or free.
//! - An entity is indexed in the broadphase of its nearest map or grid ancestor,
//!   unless it sits inside a container.
//! - [`LookupQuery`] answers region queries in world space: rectangles, rotated
//!   boxes, ranges, arcs and tiles. [`LookupFlags`] pick the trees, exact versus
//!   fattened bounds, and whether container contents are expanded.
//!
//! ## API overview
//!
//! - [`SpatialWorld`]: owns the graph, tiles, containers and lookup, and keeps
//!   them consistent after every mutation. Start here.
//! - [`EntityLookup`]: the broadphases themselves, driven by
//!   [`TransformEvent`](tether_xform::TransformEvent)s.
//! - [`Shape`]: fixtures or explicit bounds attached to an entity.
//! - [`SpatialConfig`]: graph and broadphase tuning, loadable from TOML.
//!
//! ```
//! use kurbo::{Rect, Vec2};
//! use tether_lookup::{LookupFlags, SpatialWorld};
//! use tether_xform::{Angle, EntityCoordinates, EntityId, TileIndex};
//!
//! let mut world = SpatialWorld::default();
//! let map_entity = EntityId(1);
//! let map = world.create_map(map_entity).unwrap();
//!
//! let grid = EntityId(2);
//! world
//!     .create_grid(grid, map, Vec2::new(10.0, 0.0), Angle::ZERO, 1.0)
//!     .unwrap();
//! world.fill_tiles(grid, TileIndex::new(0, 0), TileIndex::new(7, 7));
//!
//! let lamp = EntityId(3);
//! world
//!     .spawn(lamp, EntityCoordinates::new(grid, Vec2::new(2.2, 3.7)), Angle::ZERO)
//!     .unwrap();
//! assert!(world.anchor(lamp, grid, TileIndex::new(2, 3)));
//!
//! let near = world.query().entities_intersecting(
//!     map,
//!     Rect::new(12.0, 3.0, 13.0, 4.0),
//!     LookupFlags::DEFAULT,
//! );
//! assert!(near.contains(&lamp));
//!
//! // Moving the grid carries its contents without touching their proxies.
//! world.set_world_position(grid, Vec2::new(-10.0, 0.0)).unwrap();
//! let moved = world.query().entities_intersecting(
//!     map,
//!     Rect::new(-8.0, 3.0, -7.0, 4.0),
//!     LookupFlags::DEFAULT,
//! );
//! assert!(moved.contains(&lamp));
//! ```

mod broadphase;
mod config;
mod containers;
mod flags;
mod lookup;
mod queries;
mod shapes;
mod world;

pub use broadphase::{Broadphase, FixtureProxy};
pub use config::{ConfigError, LookupConfig, SpatialConfig};
pub use containers::{Container, ContainerAccess, ContainerRegistry};
pub use flags::{LookupFlags, TreeKind};
pub use lookup::EntityLookup;
pub use queries::LookupQuery;
pub use shapes::{
    BodyType, Fixture, FixtureId, RotatedBox, Shape, rects_overlap, transform_rect_bbox,
};
pub use world::SpatialWorld;

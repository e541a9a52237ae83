// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tether Xform: a Kurbo-native hierarchy of entity transforms.
//!
//! - Every entity has a position and rotation relative to its parent; parents form a
//!   forest rooted at maps. Entities without a parent live in null-space.
//! - World matrices are cached per node and invalidated for whole subtrees on change.
//! - Entities can be anchored to the tiles of a grid, snapping them to the tile center.
//! - Mutations emit [`TransformEvent`]s which higher layers (the broadphase in
//!   `tether_lookup`) consume to keep their indices in sync.
//!
//! ## API overview
//!
//! - [`TransformGraph`]: owns every [`TransformNode`] and performs all mutation.
//! - [`TransformQuery`]: read-only view for repeated coordinate math.
//! - [`MapGrids`]: tile occupancy consumed by anchoring; [`GridTiles`] implements it.
//! - [`TransformState`]: snapshot used for replication, see [`TransformGraph::apply_state`].
//! - [`GraphConfig`]: error policy and movement epsilons.
//!
//! ## Lifecycle
//!
//! Transforms go through [`TransformGraph::spawn`], [`TransformGraph::initialize`], and
//! [`TransformGraph::startup`]. Only running (or terminating) entities emit events.
//! [`TransformGraph::spawn_entity`] performs all three steps.
//!
//! ```
//! use kurbo::Vec2;
//! use tether_xform::{Angle, EntityCoordinates, EntityId, GridTiles, TileIndex, TransformGraph};
//!
//! let mut graph = TransformGraph::default();
//! let mut tiles = GridTiles::new();
//!
//! let map_entity = EntityId(1);
//! let map = graph.create_map(map_entity).unwrap();
//!
//! let grid = EntityId(2);
//! graph
//!     .create_grid(&mut tiles, grid, map, Vec2::new(10.0, 0.0), Angle::ZERO)
//!     .unwrap();
//! tiles.add_grid(grid, 1.0);
//! tiles.fill(grid, TileIndex::new(0, 0), TileIndex::new(7, 7));
//!
//! let crate_entity = EntityId(3);
//! graph
//!     .spawn_entity(
//!         &mut tiles,
//!         crate_entity,
//!         EntityCoordinates::new(map_entity, Vec2::new(12.2, 3.7)),
//!         Angle::ZERO,
//!     )
//!     .unwrap();
//!
//! assert!(graph.anchor(&mut tiles, crate_entity, grid, TileIndex::new(2, 3)));
//! assert_eq!(graph.parent(crate_entity), Some(grid));
//! assert_eq!(graph.world_position(crate_entity), Some(Vec2::new(12.5, 3.5)));
//! ```
//!
//! ## Errors
//!
//! Parenting an entity to itself, to a missing entity, or to an entity being deleted fails
//! with a [`TransformError`] and queues the entity for deletion
//! (see [`TransformGraph::take_queued_deletions`]). Cycles fail under
//! [`ErrorPolicy::Strict`] and are broken under [`ErrorPolicy::Tolerant`] or while
//! applying replicated state.

mod anchoring;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
mod hierarchy;
pub mod node;
pub mod query;
pub mod state;
pub mod tiles;
pub mod types;

pub use config::{ErrorPolicy, GraphConfig};
pub use error::{InvariantViolation, Result, TransformError};
pub use events::{EventBus, SubscriptionId, TransformEvent};
pub use graph::TransformGraph;
pub use node::{NodeKind, TransformNode};
pub use query::TransformQuery;
pub use state::TransformState;
pub use tiles::{GridTiles, MapGrids};
pub use types::{
    Angle, EntityCoordinates, EntityId, LifeStage, MapCoordinates, MapId, TileIndex,
};

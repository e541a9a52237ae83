// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid anchoring.
//!
//! Anchor a few entities to a grid, spin the grid, and watch their world positions
//! follow while their local state stays put.
//!
//! Run:
//! - `cargo run -p tether_demos --example grid_anchoring`
//! - `RUST_LOG=tether_xform=debug cargo run -p tether_demos --example grid_anchoring`

use kurbo::{Rect, Vec2};
use tether_lookup::{LookupFlags, SpatialWorld};
use tether_xform::{Angle, EntityCoordinates, EntityId, TileIndex, TransformEvent};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut world = SpatialWorld::default();
    world.subscribe(|ev| {
        if let TransformEvent::AnchorStateChanged { entity, anchored, .. } = ev {
            println!("  event: {entity} anchored={anchored}");
        }
    });

    let map = world.create_map(EntityId(1)).unwrap();
    let station = EntityId(2);
    world
        .create_grid(station, map, Vec2::ZERO, Angle::ZERO, 1.0)
        .unwrap();
    world.fill_tiles(station, TileIndex::new(0, 0), TileIndex::new(9, 9));

    let consoles = [EntityId(10), EntityId(11), EntityId(12)];
    for (i, console) in consoles.iter().enumerate() {
        let x = 2.0 + i as f64 * 3.0;
        world
            .spawn(*console, EntityCoordinates::new(station, Vec2::new(x, 2.2)), Angle::ZERO)
            .unwrap();
        let tile = TileIndex::new(x as i32, 2);
        assert!(world.anchor(*console, station, tile));
    }

    // A second console on an exclusive tile is refused.
    world.set_tile_exclusive(station, TileIndex::new(2, 2), true);
    let spare = EntityId(13);
    world
        .spawn(spare, EntityCoordinates::new(station, Vec2::new(2.4, 2.6)), Angle::ZERO)
        .unwrap();
    let refused = !world.anchor(spare, station, TileIndex::new(2, 2));
    println!("second console refused on (2, 2): {refused}");

    for step in 0..4 {
        let angle = Angle::from_degrees(step as f64 * 30.0);
        world
            .set_world_position_rotation(station, Vec2::new(step as f64 * 5.0, 0.0), angle)
            .unwrap();
        println!("station at {:.0} degrees", angle.degrees());
        for console in consoles {
            let world_pos = world.graph().world_position(console).unwrap();
            let local = world.graph().coordinates(console).unwrap().position;
            println!("  {console}: local {local:?} world ({:.2}, {:.2})", world_pos.x, world_pos.y);
        }
        let first = world.graph().world_position(consoles[0]).unwrap();
        let around = Rect::new(first.x - 0.3, first.y - 0.3, first.x + 0.3, first.y + 0.3);
        let hits = world
            .query()
            .entities_intersecting(map, around, LookupFlags::STATIC_SUNDRIES);
        println!("  anchored entities near the first console: {}", hits.len());
    }

    world.unanchor(consoles[1]);
    assert!(world.check_invariants().is_empty());
}

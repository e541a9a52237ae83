// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Containers and queries.
//!
//! Put items into nested containers and compare plain lookups with ones that
//! expand container contents.
//!
//! Run:
//! - `cargo run -p tether_demos --example container_lookup`

use kurbo::{Rect, Vec2};
use tether_lookup::{BodyType, Fixture, LookupFlags, Shape, SpatialConfig, SpatialWorld};
use tether_xform::{Angle, EntityCoordinates, EntityId, MapCoordinates};

fn main() {
    tracing_subscriber::fmt::init();

    let config = SpatialConfig::from_toml_str(
        r#"
        [lookup]
        fat_margin = 0.05
        "#,
    )
    .unwrap();
    let mut world = SpatialWorld::new(config);
    let floor = EntityId(1);
    let map = world.create_map(floor).unwrap();

    let crate_box = EntityId(10);
    let toolbox = EntityId(11);
    let wrench = EntityId(12);
    world.set_shape(
        crate_box,
        Shape::Body {
            body_type: BodyType::Static,
            fixtures: vec![Fixture::new(0, Rect::new(-0.5, -0.5, 0.5, 0.5))],
        },
    );
    for (id, x) in [(crate_box, 0.0), (toolbox, 3.0), (wrench, 4.0)] {
        world
            .spawn(id, EntityCoordinates::new(floor, Vec2::new(x, 0.0)), Angle::ZERO)
            .unwrap();
    }

    world.insert_into_container(crate_box, "storage", toolbox).unwrap();
    world.insert_into_container(toolbox, "tray", wrench).unwrap();

    let here = MapCoordinates::new(map, Vec2::ZERO);
    let q = world.query();
    let plain = q.entities_in_range(here, 1.0, LookupFlags::DEFAULT);
    let expanded = q.entities_in_range(here, 1.0, LookupFlags::DEFAULT | LookupFlags::CONTAINED);
    println!("in range: {plain:?}");
    println!("in range, with contents: {expanded:?}");

    world.remove_from_container(toolbox).unwrap();
    let after = world.query().entities_in_range(here, 1.0, LookupFlags::DEFAULT);
    println!("after taking the toolbox out: {after:?}");
}

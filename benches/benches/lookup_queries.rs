// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kurbo::{Point, Rect, Vec2};
use tether_lookup::{LookupFlags, RotatedBox, SpatialWorld};
use tether_xform::{Angle, EntityCoordinates, EntityId, MapCoordinates, MapId, TileIndex};

const MAP: EntityId = EntityId(1);
const GRIDS: u64 = 4;
const PER_GRID: u64 = 1024;

/// A map with a few rotated grids, each holding a mix of anchored and loose entities.
fn build_world() -> (SpatialWorld, MapId) {
    let mut world = SpatialWorld::default();
    let map = world.create_map(MAP).unwrap();
    let mut next = 100;
    for g in 0..GRIDS {
        let grid = EntityId(10 + g);
        let origin = Vec2::new(g as f64 * 80.0, 0.0);
        world
            .create_grid(grid, map, origin, Angle::from_degrees(g as f64 * 15.0), 1.0)
            .unwrap();
        world.fill_tiles(grid, TileIndex::new(0, 0), TileIndex::new(63, 63));
        for i in 0..PER_GRID {
            let (x, y) = ((i % 32) as f64 * 2.0 + 0.3, (i / 32) as f64 * 2.0 + 0.7);
            let e = EntityId(next);
            next += 1;
            world
                .spawn(e, EntityCoordinates::new(grid, Vec2::new(x, y)), Angle::ZERO)
                .unwrap();
            if i % 3 == 0 {
                world.anchor(e, grid, TileIndex::new(x as i32, y as i32));
            }
        }
    }
    (world, map)
}

fn bench_region_queries(c: &mut Criterion) {
    let (world, map) = build_world();
    let q = world.query();
    let region = Rect::new(20.0, 10.0, 120.0, 40.0);
    let mut group = c.benchmark_group("lookup");
    group.bench_function("rect_approximate", |b| {
        b.iter(|| q.entities_intersecting(map, region, LookupFlags::DEFAULT));
    });
    group.bench_function("rect_exact", |b| {
        b.iter(|| q.entities_intersecting(map, region, LookupFlags::ALL_TREES));
    });
    let thin = RotatedBox::new(
        Point::new(100.0, 30.0),
        Vec2::new(60.0, 2.0),
        Angle::from_degrees(30.0),
    );
    group.bench_function("rotated_exact", |b| {
        b.iter(|| q.entities_intersecting_rotated(map, thin, LookupFlags::ALL_TREES));
    });
    let origin = MapCoordinates::new(map, Vec2::new(90.0, 30.0));
    group.bench_function("arc", |b| {
        b.iter(|| {
            q.entities_in_arc(
                origin,
                25.0,
                Angle::from_degrees(45.0),
                Angle::from_degrees(60.0),
                LookupFlags::DEFAULT,
            )
        });
    });
    group.bench_function("any_miss", |b| {
        b.iter(|| {
            black_box(q.any_entities_intersecting(
                map,
                Rect::new(-500.0, -500.0, -400.0, -400.0),
                LookupFlags::DEFAULT,
                None,
            ))
        });
    });
    group.finish();
}

// Moving a grid must not touch the proxies of anything on it.
fn bench_grid_move(c: &mut Criterion) {
    let (mut world, _) = build_world();
    let grid = EntityId(10);
    let mut step = 0.0;
    c.bench_function("move_loaded_grid", |b| {
        b.iter(|| {
            step += 0.5;
            world.set_world_position(grid, Vec2::new(step, 0.0)).unwrap();
        });
    });
}

criterion_group!(benches, bench_region_queries, bench_grid_move);
criterion_main!(benches);

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Randomized checks of hierarchy invariants.

use kurbo::Vec2;
use proptest::prelude::*;
use tether_xform::{
    Angle, EntityCoordinates, EntityId, GraphConfig, GridTiles, TileIndex, TransformGraph,
};

const MAP: EntityId = EntityId(1);
const GRID: EntityId = EntityId(2);
const FIRST: u64 = 10;
const COUNT: u64 = 12;

#[derive(Clone, Debug)]
enum Op {
    Reparent(u64, u64),
    Move(u64, f64, f64),
    Rotate(u64, f64),
    Anchor(u64, i32, i32),
    Detach(u64),
    Attach(u64),
    SetNoLocalRotation(u64, bool),
}

fn op() -> impl Strategy<Value = Op> {
    let id = FIRST..FIRST + COUNT;
    prop_oneof![
        (id.clone(), FIRST - 2..FIRST + COUNT).prop_map(|(a, b)| Op::Reparent(a, b)),
        (id.clone(), -20.0..20.0, -20.0..20.0).prop_map(|(a, x, y)| Op::Move(a, x, y)),
        (id.clone(), -4.0..4.0).prop_map(|(a, r)| Op::Rotate(a, r)),
        (id.clone(), 0..8, 0..8).prop_map(|(a, x, y)| Op::Anchor(a, x, y)),
        id.clone().prop_map(Op::Detach),
        id.clone().prop_map(Op::Attach),
        (id, any::<bool>()).prop_map(|(a, v)| Op::SetNoLocalRotation(a, v)),
    ]
}

fn parent_id(raw: u64) -> EntityId {
    match raw {
        r if r == FIRST - 2 => MAP,
        r if r == FIRST - 1 => GRID,
        r => EntityId(r),
    }
}

fn build(config: GraphConfig) -> (TransformGraph, GridTiles) {
    let mut graph = TransformGraph::new(config);
    let mut tiles = GridTiles::new();
    let map = graph.create_map(MAP).unwrap();
    graph
        .create_grid(&mut tiles, GRID, map, Vec2::new(3.0, -2.0), Angle::from_degrees(30.0))
        .unwrap();
    tiles.add_grid(GRID, 1.0);
    tiles.fill(GRID, TileIndex::new(0, 0), TileIndex::new(7, 7));
    for i in 0..COUNT {
        graph
            .spawn_entity(
                &mut tiles,
                EntityId(FIRST + i),
                EntityCoordinates::new(MAP, Vec2::new(i as f64, 0.0)),
                Angle::ZERO,
            )
            .unwrap();
    }
    (graph, tiles)
}

fn run(graph: &mut TransformGraph, tiles: &mut GridTiles, ops: &[Op]) {
    for op in ops {
        // Errors are part of the exercise; invariants must hold regardless.
        let _ = match *op {
            Op::Reparent(a, b) => graph.set_parent(tiles, EntityId(a), parent_id(b)),
            Op::Move(a, x, y) => graph.set_local_position(tiles, EntityId(a), Vec2::new(x, y)),
            Op::Rotate(a, r) => {
                graph.set_local_rotation(tiles, EntityId(a), Angle::from_radians(r))
            }
            Op::Anchor(a, x, y) => {
                graph.anchor(tiles, EntityId(a), GRID, TileIndex::new(x, y));
                Ok(())
            }
            Op::Detach(a) => graph.detach_to_null(tiles, EntityId(a)),
            Op::Attach(a) => graph.attach_to_grid_or_map(tiles, EntityId(a)),
            Op::SetNoLocalRotation(a, v) => graph.set_no_local_rotation(tiles, EntityId(a), v),
        };
    }
}

proptest! {
    #[test]
    fn invariants_hold_under_random_mutation(ops in prop::collection::vec(op(), 1..60)) {
        let (mut graph, mut tiles) = build(GraphConfig::default());
        run(&mut graph, &mut tiles, &ops);
        let violations = graph.check_invariants(&tiles);
        prop_assert!(violations.is_empty(), "{violations:?}");
        for i in 0..COUNT {
            let Some(node) = graph.node(EntityId(FIRST + i)) else {
                continue;
            };
            if node.no_local_rotation() {
                prop_assert!(node.local_rotation().close_to(Angle::ZERO, 1e-12));
            }
        }
    }

    #[test]
    fn tolerant_policy_keeps_forest(ops in prop::collection::vec(op(), 1..60)) {
        let (mut graph, mut tiles) = build(GraphConfig::tolerant());
        run(&mut graph, &mut tiles, &ops);
        let violations = graph.check_invariants(&tiles);
        prop_assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn world_round_trip(
        x in -50.0..50.0f64,
        y in -50.0..50.0f64,
        r in -3.0..3.0f64,
        wx in -50.0..50.0f64,
        wy in -50.0..50.0f64,
    ) {
        let (mut graph, mut tiles) = build(GraphConfig::default());
        let a = EntityId(FIRST);
        let b = EntityId(FIRST + 1);
        graph.set_local_position(&mut tiles, a, Vec2::new(x, y)).unwrap();
        graph.set_local_rotation(&mut tiles, a, Angle::from_radians(r)).unwrap();
        graph.set_parent(&mut tiles, b, a).unwrap();
        graph.set_world_position(&mut tiles, b, Vec2::new(wx, wy)).unwrap();
        let got = graph.world_position(b).unwrap();
        prop_assert!((got - Vec2::new(wx, wy)).hypot() < 1e-6);
        let m = graph.world_matrix(b).unwrap();
        let via_matrix = (m * kurbo::Point::ORIGIN).to_vec2();
        prop_assert!((via_matrix - got).hypot() < 1e-6);
    }
}

#[test]
fn deletion_of_map_removes_everything() {
    let (mut graph, mut tiles) = build(GraphConfig::default());
    graph.set_parent(&mut tiles, EntityId(FIRST + 1), EntityId(FIRST)).unwrap();
    graph.delete(&mut tiles, MAP).unwrap();
    assert!(graph.is_empty());
    assert_eq!(graph.maps().count(), 0);
    assert!(graph.check_invariants(&tiles).is_empty());
}

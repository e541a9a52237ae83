// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of the transform graph and lookup together.

use kurbo::{Point, Rect, Vec2};
use tether_lookup::{
    BodyType, Fixture, LookupConfig, LookupFlags, RotatedBox, Shape, SpatialConfig, SpatialWorld,
    TreeKind,
};
use tether_xform::{Angle, EntityCoordinates, EntityId, MapCoordinates, MapId, TileIndex};

const MAP: EntityId = EntityId(1);
const GRID: EntityId = EntityId(2);

fn world_with_grid(position: Vec2, rotation: Angle) -> (SpatialWorld, MapId) {
    let mut world = SpatialWorld::new(SpatialConfig {
        lookup: LookupConfig::tight(),
        ..Default::default()
    });
    let map = world.create_map(MAP).unwrap();
    world.create_grid(GRID, map, position, rotation, 1.0).unwrap();
    world.fill_tiles(GRID, TileIndex::new(0, 0), TileIndex::new(7, 7));
    (world, map)
}

fn assert_close(a: Vec2, b: Vec2) {
    assert!((a - b).hypot() < 1e-9, "{a:?} != {b:?}");
}

fn around(p: Vec2, r: f64) -> Rect {
    Rect::new(p.x - r, p.y - r, p.x + r, p.y + r)
}

#[test]
fn anchored_entity_follows_its_grid() {
    let (mut world, map) = world_with_grid(Vec2::ZERO, Angle::ZERO);
    let e = EntityId(10);
    world
        .spawn(e, EntityCoordinates::new(GRID, Vec2::new(3.2, 2.9)), Angle::ZERO)
        .unwrap();
    assert!(world.anchor(e, GRID, TileIndex::new(3, 2)));
    assert_close(world.graph().world_position(e).unwrap(), Vec2::new(3.5, 2.5));
    let before = world.get_state(e).unwrap();

    world
        .set_world_position_rotation(GRID, Vec2::new(5.0, -1.0), Angle::from_degrees(90.0))
        .unwrap();

    // (3.5, 2.5) rotated a quarter turn, then offset by the grid origin.
    assert_close(world.graph().world_position(e).unwrap(), Vec2::new(2.5, 2.5));
    assert_eq!(world.get_state(e), Some(before));
    assert_eq!(world.lookup().registered_tree(e), Some(TreeKind::StaticSundries));

    let q = world.query();
    assert!(q
        .entities_intersecting(map, around(Vec2::new(2.5, 2.5), 0.1), LookupFlags::ALL_TREES)
        .contains(&e));
    assert!(!q
        .entities_intersecting(map, around(Vec2::new(3.5, 2.5), 0.1), LookupFlags::ALL_TREES)
        .contains(&e));
    assert!(world.check_invariants().is_empty());
}

#[test]
fn reparenting_preserves_world_rotation() {
    let (mut world, _) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let (a, b, e) = (EntityId(10), EntityId(11), EntityId(12));
    world
        .spawn(a, EntityCoordinates::new(MAP, Vec2::new(1.0, 0.0)), Angle::from_degrees(30.0))
        .unwrap();
    world
        .spawn(b, EntityCoordinates::new(MAP, Vec2::new(-2.0, 3.0)), Angle::from_degrees(-45.0))
        .unwrap();
    world
        .spawn(e, EntityCoordinates::new(a, Vec2::new(1.0, 1.0)), Angle::from_degrees(10.0))
        .unwrap();

    let (pos, rot) = world.graph().world_position_rotation(e).unwrap();
    assert!(rot.close_to(Angle::from_degrees(40.0), 1e-9));

    world.set_parent(e, b).unwrap();
    assert_eq!(world.graph().parent(e), Some(b));
    let (pos_b, rot_b) = world.graph().world_position_rotation(e).unwrap();
    assert_close(pos_b, pos);
    assert!(rot_b.close_to(rot, 1e-9));

    // Explicit coordinates without a rotation keep the world rotation too.
    world
        .set_coordinates(e, EntityCoordinates::new(a, Vec2::ZERO), None, true)
        .unwrap();
    assert!(world.graph().world_rotation(e).unwrap().close_to(rot, 1e-9));
    assert_eq!(world.lookup().registered_broadphase(e), Some(MAP));
}

#[test]
fn containers_expand_recursively() {
    let (mut world, map) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let (a, b, c, d) = (EntityId(10), EntityId(11), EntityId(12), EntityId(13));
    for (id, x) in [(a, 0.0), (b, 5.0), (c, 6.0)] {
        world
            .spawn(id, EntityCoordinates::new(MAP, Vec2::new(x, 0.0)), Angle::ZERO)
            .unwrap();
    }
    assert_eq!(world.insert_into_container(a, "backpack", b), Ok(true));
    assert_eq!(world.insert_into_container(b, "pouch", c), Ok(true));
    // A plain child of a contained entity is hidden along with it.
    world
        .spawn(d, EntityCoordinates::new(b, Vec2::new(0.25, 0.0)), Angle::ZERO)
        .unwrap();

    assert_eq!(world.lookup().registered_len(), 1);
    let area = around(Vec2::ZERO, 0.5);
    let q = world.query();
    let plain = q.entities_intersecting(map, area, LookupFlags::ALL_TREES);
    assert_eq!(plain.len(), 1);
    assert!(plain.contains(&a));

    let expanded = q.entities_intersecting(
        map,
        area,
        LookupFlags::ALL_TREES | LookupFlags::CONTAINED,
    );
    for id in [a, b, c, d] {
        assert!(expanded.contains(&id), "{id} missing");
    }
    assert!(q.any_entities_intersecting(
        map,
        area,
        LookupFlags::ALL_TREES | LookupFlags::CONTAINED,
        Some(a),
    ));
    assert!(!q.any_entities_intersecting(map, area, LookupFlags::ALL_TREES, Some(a)));
}

#[test]
fn deleting_a_body_removes_its_proxies() {
    let (mut world, map) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let (body, rider) = (EntityId(10), EntityId(11));
    world.set_shape(
        body,
        Shape::Body {
            body_type: BodyType::Dynamic,
            fixtures: vec![
                Fixture::new(0, Rect::new(-1.0, -1.0, 0.0, 0.0)),
                Fixture::new(1, Rect::new(0.0, 0.0, 1.0, 1.0)),
            ],
        },
    );
    world
        .spawn(body, EntityCoordinates::new(MAP, Vec2::new(3.0, 3.0)), Angle::ZERO)
        .unwrap();
    world
        .spawn(rider, EntityCoordinates::new(body, Vec2::new(0.5, 0.5)), Angle::ZERO)
        .unwrap();

    let bp = world.lookup().broadphase(MAP).unwrap();
    assert_eq!(bp.len(TreeKind::Dynamic), 2);
    assert_eq!(bp.len(TreeKind::Sundries), 1);

    world.delete(body).unwrap();
    assert!(!world.graph().contains(rider));
    assert_eq!(world.lookup().registered_len(), 0);
    assert!(world.lookup().broadphase(MAP).unwrap().is_empty());
    assert!(world
        .query()
        .entities_intersecting(map, around(Vec2::new(3.0, 3.0), 2.0), LookupFlags::DEFAULT)
        .is_empty());
}

#[test]
fn arcs_filter_by_direction() {
    let (mut world, map) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let ahead = EntityId(10);
    let beside = EntityId(11);
    let behind = EntityId(12);
    let slightly_off = EntityId(13);
    for (id, p) in [
        (ahead, Vec2::new(1.0, 0.0)),
        (beside, Vec2::new(0.0, 1.0)),
        (behind, Vec2::new(-1.0, 0.0)),
        (slightly_off, Vec2::new(1.0, 0.5)),
    ] {
        world.spawn(id, EntityCoordinates::new(MAP, p), Angle::ZERO).unwrap();
    }
    let origin = MapCoordinates::new(map, Vec2::ZERO);
    let q = world.query();

    let in_range = q.entities_in_range(origin, 2.0, LookupFlags::DEFAULT);
    assert_eq!(in_range.len(), 4);

    let arc = q.entities_in_arc(
        origin,
        2.0,
        Angle::ZERO,
        Angle::from_degrees(90.0),
        LookupFlags::DEFAULT,
    );
    assert!(arc.contains(&ahead) && arc.contains(&slightly_off));
    assert!(!arc.contains(&beside) && !arc.contains(&behind));

    // Facing backwards wraps around ±π.
    let back = q.entities_in_arc(
        origin,
        2.0,
        Angle::from_degrees(180.0),
        Angle::from_degrees(30.0),
        LookupFlags::DEFAULT,
    );
    assert_eq!(back.len(), 1);
    assert!(back.contains(&behind));
}

#[test]
fn rotated_boxes_are_exact_unless_approximate() {
    let (mut world, map) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let (on, off) = (EntityId(10), EntityId(11));
    world
        .spawn(on, EntityCoordinates::new(MAP, Vec2::new(1.0, 1.0)), Angle::ZERO)
        .unwrap();
    world
        .spawn(off, EntityCoordinates::new(MAP, Vec2::new(1.1, -1.2)), Angle::ZERO)
        .unwrap();
    let thin = RotatedBox::new(Point::ORIGIN, Vec2::new(2.0, 0.25), Angle::from_degrees(45.0));
    let q = world.query();

    let exact = q.entities_intersecting_rotated(map, thin, LookupFlags::ALL_TREES);
    assert!(exact.contains(&on));
    assert!(!exact.contains(&off));

    let approximate = q.entities_intersecting_rotated(map, thin, LookupFlags::DEFAULT);
    assert!(approximate.contains(&on) && approximate.contains(&off));
}

#[test]
fn queries_run_in_grid_local_space() {
    let (mut world, map) = world_with_grid(Vec2::new(10.0, 0.0), Angle::from_degrees(90.0));
    let (anchored, loose, neighbor) = (EntityId(10), EntityId(11), EntityId(12));
    for (id, p) in [
        (anchored, Vec2::new(1.5, 1.5)),
        (loose, Vec2::new(1.3, 1.7)),
        (neighbor, Vec2::new(3.5, 1.5)),
    ] {
        world.spawn(id, EntityCoordinates::new(GRID, p), Angle::ZERO).unwrap();
    }
    assert!(world.anchor(anchored, GRID, TileIndex::new(1, 1)));
    assert_eq!(world.lookup().registered_broadphase(loose), Some(GRID));

    let q = world.query();
    let tile = q.entities_intersecting_tile(GRID, TileIndex::new(1, 1), LookupFlags::DEFAULT);
    assert!(tile.contains(&anchored) && tile.contains(&loose));
    assert!(!tile.contains(&neighbor));

    let bounds = q.tile_world_bounds(GRID, TileIndex::new(1, 1)).unwrap();
    let world_pos = world.graph().world_position(anchored).unwrap();
    assert!(bounds.contains(world_pos.to_point()));
    assert_close(world_pos, Vec2::new(8.5, 1.5));

    let found = q.entities_intersecting(map, around(world_pos, 0.1), LookupFlags::ALL_TREES);
    assert!(found.contains(&anchored));
    assert!(!found.contains(&neighbor));
    assert_eq!(q.find_grids_intersecting(map, around(world_pos, 0.1)), [GRID]);
    assert!(q
        .find_grids_intersecting(map, around(Vec2::new(-30.0, 0.0), 1.0))
        .is_empty());
}

#[test]
fn null_space_is_never_indexed() {
    let (mut world, map) = world_with_grid(Vec2::new(40.0, 0.0), Angle::ZERO);
    let e = EntityId(10);
    world
        .spawn(e, EntityCoordinates::new(MAP, Vec2::new(1.0, 1.0)), Angle::ZERO)
        .unwrap();
    assert_eq!(world.lookup().registered_broadphase(e), Some(MAP));

    world.detach_to_null(e).unwrap();
    assert_eq!(world.lookup().registered_len(), 0);
    assert_eq!(world.graph().map_id(e), MapId::NULLSPACE);

    let everywhere = Rect::new(-1e6, -1e6, 1e6, 1e6);
    let q = world.query();
    assert!(q.entities_intersecting(MapId::NULLSPACE, everywhere, LookupFlags::DEFAULT).is_empty());
    assert!(!q.entities_intersecting(map, everywhere, LookupFlags::DEFAULT).contains(&e));

    world
        .set_coordinates(e, EntityCoordinates::new(MAP, Vec2::new(2.0, 2.0)), None, true)
        .unwrap();
    assert_eq!(world.lookup().registered_broadphase(e), Some(MAP));
}

#[test]
fn config_loads_from_toml() {
    let config = SpatialConfig::from_toml_str(
        r#"
        [graph]
        error_policy = "tolerant"

        [lookup]
        fat_margin = 0.0
        displacement_multiplier = 0.0
        "#,
    )
    .unwrap();
    let mut world = SpatialWorld::new(config);
    let map = world.create_map(MAP).unwrap();
    let (a, b) = (EntityId(10), EntityId(11));
    world
        .spawn(a, EntityCoordinates::new(MAP, Vec2::ZERO), Angle::ZERO)
        .unwrap();
    world
        .spawn(b, EntityCoordinates::new(a, Vec2::new(1.0, 0.0)), Angle::ZERO)
        .unwrap();

    let everywhere = Rect::new(-100.0, -100.0, 100.0, 100.0);
    let found = world.query().entities_intersecting(map, everywhere, LookupFlags::DEFAULT);
    assert_eq!(found.len(), 2);

    // Tolerant graphs break cycles by dropping the offending ancestor into null-space.
    world.set_parent(a, b).unwrap();
    assert_eq!(world.graph().parent(b), None);
    assert_eq!(world.graph().parent(a), Some(b));
    assert_eq!(world.graph().map_id(a), MapId::NULLSPACE);
    assert!(world.check_invariants().is_empty());
    assert_eq!(world.lookup().registered_len(), 0);
}

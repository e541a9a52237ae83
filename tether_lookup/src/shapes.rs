// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entity shapes and query regions.

use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use tether_index::Aabb2D;
use tether_xform::Angle;

/// Identifier of a fixture, unique per entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixtureId(pub u32);

/// A physics shape attached to an entity, reduced to its local bounds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Fixture id.
    pub id: FixtureId,
    /// Bounds in the owning entity's local space.
    pub local_bounds: Rect,
}

impl Fixture {
    /// Create a fixture.
    pub fn new(id: u32, local_bounds: Rect) -> Self {
        Self {
            id: FixtureId(id),
            local_bounds,
        }
    }
}

/// How a physics body moves.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves.
    Static,
    /// Moves only when told to.
    Kinematic,
    /// Fully simulated.
    #[default]
    Dynamic,
}

/// What an entity contributes to the broadphase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// A physics body; one proxy per fixture.
    Body {
        /// Body type, which decides between the static and dynamic tree.
        body_type: BodyType,
        /// Fixtures of the body.
        fixtures: Vec<Fixture>,
    },
    /// A bare entity with local bounds.
    Sundry {
        /// Bounds in the entity's local space.
        local_bounds: Rect,
    },
}

impl Shape {
    /// Bounds of the whole shape in local space, or `None` for a body without fixtures.
    pub fn local_bounds(&self) -> Option<Rect> {
        match self {
            Self::Body { fixtures, .. } => fixtures
                .iter()
                .map(|f| f.local_bounds)
                .reduce(|a, b| a.union(b)),
            Self::Sundry { local_bounds } => Some(*local_bounds),
        }
    }
}

/// An oriented box in world space.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    /// Center of the box.
    pub center: Point,
    /// Half of the width and height, before rotation.
    pub half_extents: Vec2,
    /// Rotation about the center.
    pub rotation: Angle,
}

impl RotatedBox {
    /// Create a box from its center, half extents and rotation.
    pub fn new(center: Point, half_extents: Vec2, rotation: Angle) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// A rotated box covering `rect` transformed by `affine`, assuming `affine` is rigid.
    pub fn from_rect(affine: Affine, rect: Rect, rotation: Angle) -> Self {
        Self {
            center: affine * rect.center(),
            half_extents: Vec2::new(rect.width() * 0.5, rect.height() * 0.5),
            rotation,
        }
    }

    /// Box-to-world transform of the unit-centered box.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.center.to_vec2()) * self.rotation.to_affine()
    }

    fn local_rect(&self) -> Rect {
        Rect::new(
            -self.half_extents.x,
            -self.half_extents.y,
            self.half_extents.x,
            self.half_extents.y,
        )
    }

    /// The four corners, counter-clockwise.
    pub fn corners(&self) -> [Point; 4] {
        let m = self.transform();
        let r = self.local_rect();
        [
            m * Point::new(r.x0, r.y0),
            m * Point::new(r.x1, r.y0),
            m * Point::new(r.x1, r.y1),
            m * Point::new(r.x0, r.y1),
        ]
    }

    /// Axis-aligned bounds.
    pub fn bounding_rect(&self) -> Rect {
        transform_rect_bbox(self.transform(), self.local_rect())
    }

    /// Axis-aligned bounds after mapping through `affine`.
    pub fn bounds_in(&self, affine: Affine) -> Rect {
        transform_rect_bbox(affine * self.transform(), self.local_rect())
    }

    /// Whether the box contains `p`. Edges are inclusive.
    pub fn contains(&self, p: Point) -> bool {
        let local = self.transform().inverse() * p;
        local.x.abs() <= self.half_extents.x + 1e-12 && local.y.abs() <= self.half_extents.y + 1e-12
    }

    /// Whether the box overlaps an axis-aligned rectangle, by separating axes.
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        if !self.bounding_rect().overlaps_inclusive(rect) {
            return false;
        }
        let corners = self.corners();
        let rect_corners = [
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x1, rect.y1),
            Point::new(rect.x0, rect.y1),
        ];
        let axis_u = self.rotation.to_vec();
        let axis_v = Vec2::new(-axis_u.y, axis_u.x);
        for axis in [axis_u, axis_v] {
            let (a0, a1) = project(&corners, axis);
            let (b0, b1) = project(&rect_corners, axis);
            if a1 < b0 || b1 < a0 {
                return false;
            }
        }
        true
    }
}

fn project(points: &[Point; 4], axis: Vec2) -> (f64, f64) {
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = p.to_vec2().dot(axis);
        (lo.min(d), hi.max(d))
    })
}

trait RectExt {
    fn overlaps_inclusive(&self, other: Rect) -> bool;
}

impl RectExt for Rect {
    fn overlaps_inclusive(&self, other: Rect) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }
}

/// Axis-aligned bounds of `rect` mapped through `affine`.
pub fn transform_rect_bbox(affine: Affine, rect: Rect) -> Rect {
    let p0 = affine * Point::new(rect.x0, rect.y0);
    let p1 = affine * Point::new(rect.x1, rect.y0);
    let p2 = affine * Point::new(rect.x0, rect.y1);
    let p3 = affine * Point::new(rect.x1, rect.y1);
    let min_x = p0.x.min(p1.x).min(p2.x).min(p3.x);
    let min_y = p0.y.min(p1.y).min(p2.y).min(p3.y);
    let max_x = p0.x.max(p1.x).max(p2.x).max(p3.x);
    let max_y = p0.y.max(p1.y).max(p2.y).max(p3.y);
    Rect::new(min_x, min_y, max_x, max_y)
}

/// Whether two rectangles overlap, edges inclusive.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.overlaps_inclusive(b)
}

pub(crate) fn rect_to_aabb(r: Rect) -> Aabb2D<f64> {
    Aabb2D::new(r.x0, r.y0, r.x1, r.y1)
}

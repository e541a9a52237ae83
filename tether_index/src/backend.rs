// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend trait for spatial indexing implementations.

use crate::types::Aabb2D;
use core::fmt::Debug;

/// Spatial backend abstraction used by [`ProxyTree`](crate::ProxyTree).
///
/// Backends only know about slot numbers and the (fattened) boxes stored for
/// them. Queries are visitor based: the callback returns `true` to keep
/// going and `false` to stop, and the query returns `false` if it was stopped.
pub trait Backend<T: Copy + PartialOrd + Debug> {
    /// Insert a new slot into the spatial structure.
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>);

    /// Update an existing slot's AABB.
    fn update(&mut self, slot: usize, aabb: Aabb2D<T>);

    /// Remove a slot from the spatial structure.
    fn remove(&mut self, slot: usize);

    /// Clear all spatial structures.
    fn clear(&mut self);

    /// Visit slots whose AABB intersects `rect`.
    fn visit_rect(&self, rect: Aabb2D<T>, visit: &mut dyn FnMut(usize) -> bool) -> bool;

    /// Visit slots whose AABB contains the point.
    fn visit_point(&self, x: T, y: T, visit: &mut dyn FnMut(usize) -> bool) -> bool {
        self.visit_rect(Aabb2D::new(x, y, x, y), visit)
    }
}

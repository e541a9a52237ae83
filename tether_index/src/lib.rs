// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tether Index: a handle-based 2D proxy tree for broadphase queries.
//!
//! - Create, move, and destroy axis-aligned bounding boxes (AABBs) with user payloads.
//! - Every proxy keeps a tight box and a fattened box; small movements inside the
//!   fattened box never touch the spatial structure.
//! - Query with a visitor that can stop early, in approximate (fattened) or exact (tight) mode.
//!
//! It is generic over the scalar type `T` and does not depend on any geometry crate.
//! Higher layers (the broadphase in `tether_lookup`) compute region-local AABBs and feed them here.
//!
//! Backends are pluggable via a small trait so you can swap the spatial strategy without API churn.
//!
//! # Example
//!
//! ```rust
//! use tether_index::{Aabb2D, BvhProxyTree, ProxyTree};
//!
//! let mut tree: BvhProxyTree<f64, u32> = ProxyTree::new(0.1);
//! let a = tree.create_proxy(Aabb2D::new(0.0, 0.0, 1.0, 1.0), 1);
//! let _b = tree.create_proxy(Aabb2D::new(4.0, 4.0, 5.0, 5.0), 2);
//!
//! // Move the first proxy far enough to escape its fattened box.
//! assert!(tree.move_proxy(a, Aabb2D::new(10.0, 0.0, 11.0, 1.0), (10.0, 0.0)));
//!
//! let mut hits = Vec::new();
//! tree.query(Aabb2D::new(9.0, -1.0, 12.0, 2.0), false, |_, payload| {
//!     hits.push(*payload);
//!     true
//! });
//! assert_eq!(hits, [1]);
//! ```
//!
//! ## Choosing a backend
//!
//! - `FlatVec`: simplest and smallest, linear scans. Good for very small sets.
//! - `BvhF32`/`BvhF64`: binary hierarchy with SAH-like splits; the default for broadphases.
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for floating-point coordinates.

#![no_std]

extern crate alloc;

pub mod backend;
pub mod backends;
pub mod tree;
pub mod types;

pub use backend::Backend;
pub use backends::bvh::{Bvh, BvhF32, BvhF64};
pub use backends::flatvec::FlatVec;
pub use tree::{BvhProxyTree, FlatProxyTree, Proxy, ProxyTree};
pub use types::{Aabb2D, Scalar};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn payloads<B: Backend<f64>>(tree: &ProxyTree<f64, u32, B>, q: Aabb2D<f64>) -> Vec<u32> {
        let mut out = Vec::new();
        tree.query(q, false, |_, p| {
            out.push(*p);
            true
        });
        out.sort_unstable();
        out
    }

    #[test]
    fn backends_agree_under_churn() {
        let mut flat: FlatProxyTree<f64, u32> = ProxyTree::new(0.25);
        let mut bvh: BvhProxyTree<f64, u32> = ProxyTree::new(0.25);
        let mut handles = Vec::new();
        for i in 0..40_u32 {
            let x = f64::from(i % 8) * 3.0;
            let y = f64::from(i / 8) * 3.0;
            let aabb = Aabb2D::<f64>::from_xywh(x, y, 1.0, 1.0);
            handles.push((flat.create_proxy(aabb, i), bvh.create_proxy(aabb, i)));
        }
        for (i, (f, b)) in handles.iter().enumerate().step_by(3) {
            let shift = 0.75 + i as f64 * 0.1;
            let f_aabb = flat.get_tight_aabb(*f).expect("live");
            let moved = Aabb2D::new(
                f_aabb.min_x + shift,
                f_aabb.min_y,
                f_aabb.max_x + shift,
                f_aabb.max_y,
            );
            flat.move_proxy(*f, moved, (shift, 0.0));
            bvh.move_proxy(*b, moved, (shift, 0.0));
        }
        for (f, b) in handles.iter().skip(1).step_by(5) {
            flat.destroy_proxy(*f);
            bvh.destroy_proxy(*b);
        }
        for q in [
            Aabb2D::new(0.0, 0.0, 5.0, 5.0),
            Aabb2D::new(6.0, 2.0, 14.0, 9.5),
            Aabb2D::new(-10.0, -10.0, 100.0, 100.0),
        ] {
            assert_eq!(payloads(&flat, q), payloads(&bvh, q));
        }
        assert_eq!(flat.len(), bvh.len());
    }
}

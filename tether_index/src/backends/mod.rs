// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend implementations for different spatial strategies.
//!
//! - `flatvec`: flat vector with linear scans (small, simple).
//! - `bvh`: dynamic BVH (`T: Scalar`) with an SAH-like leaf split (aliases: `BvhF32`, `BvhF64`).
//!
//! SAH note
//! --------
//! When a BVH leaf overflows, for a split point `k` along a sorted axis we minimize:
//!
//! `cost(k) = area(LB_k) * k + area(RB_k) * (n - k)`
//!
//! where `LB_k` and `RB_k` are the bounding boxes of the first `k` and remaining `n - k` items.
//! All `k` are evaluated in O(n) per axis using prefix/suffix bounding boxes.
//! Accumulators are widened (`f32`→`f64`) for robust comparisons.
//! Inserts descend towards the child whose area grows least.

pub mod bvh;
pub mod flatvec;

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary bounding hierarchy backend generic over scalar `T: Scalar`.

use alloc::vec;
use alloc::vec::Vec;

use crate::backend::Backend;
use crate::types::{Aabb2D, Scalar, ScalarAcc, area, union_aabb};
use core::fmt::Debug;

/// A dynamic BVH using SAH-like leaf splits and cheapest-growth descent on insert.
pub struct Bvh<T: Scalar> {
    max_leaf: usize,
    root: Option<NodeIdx>,
    arena: Vec<Node<T>>,
    slots: Vec<Option<Aabb2D<T>>>,
}

enum Kind<T: Scalar> {
    Leaf(Vec<(usize, Aabb2D<T>)>),
    Internal { left: NodeIdx, right: NodeIdx },
}

struct Node<T: Scalar> {
    bbox: Aabb2D<T>,
    kind: Kind<T>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(usize);

impl<T: Scalar> Default for Bvh<T> {
    fn default() -> Self {
        Self::with_max_leaf(8)
    }
}

type BvhItems<TS> = Vec<(usize, Aabb2D<TS>)>;

impl<T: Scalar> Bvh<T> {
    /// Create an empty hierarchy whose leaves split once they exceed `max_leaf` items.
    pub fn with_max_leaf(max_leaf: usize) -> Self {
        Self {
            max_leaf: max_leaf.max(2),
            root: None,
            arena: Vec::new(),
            slots: Vec::new(),
        }
    }

    fn bbox_items(items: &[(usize, Aabb2D<T>)]) -> Aabb2D<T> {
        let mut it = items.iter();
        match it.next() {
            Some((_, first)) => it.fold(*first, |acc, (_, bb)| union_aabb(acc, *bb)),
            None => Aabb2D::new(T::zero(), T::zero(), T::zero(), T::zero()),
        }
    }

    fn centroid(bb: &Aabb2D<T>, axis: usize) -> T {
        if axis == 0 {
            T::mid(bb.min_x, bb.max_x)
        } else {
            T::mid(bb.min_y, bb.max_y)
        }
    }

    /// Sort along each axis and pick the `k` minimizing
    /// `area(LB_k) * k + area(RB_k) * (n - k)`.
    fn split_sah(mut items: BvhItems<T>, max_leaf: usize) -> (BvhItems<T>, BvhItems<T>) {
        let n = items.len();
        let min_children = (max_leaf / 2).clamp(1, n / 2);
        let mut best: Option<(ScalarAcc<T>, usize, usize)> = None;
        for axis in 0..2 {
            items.sort_by(|a, b| {
                Self::centroid(&a.1, axis)
                    .partial_cmp(&Self::centroid(&b.1, axis))
                    .unwrap_or(core::cmp::Ordering::Equal)
            });
            let mut prefix: Vec<Aabb2D<T>> = Vec::with_capacity(n);
            for (_, bb) in &items {
                let next = prefix.last().map_or(*bb, |prev| union_aabb(*prev, *bb));
                prefix.push(next);
            }
            let mut suffix: Vec<Aabb2D<T>> = Vec::with_capacity(n);
            for (_, bb) in items.iter().rev() {
                let next = suffix.last().map_or(*bb, |prev| union_aabb(*bb, *prev));
                suffix.push(next);
            }
            suffix.reverse();

            for k in min_children..=(n - min_children) {
                let cost = area(&prefix[k - 1]) * T::acc_from_usize(k)
                    + area(&suffix[k]) * T::acc_from_usize(n - k);
                if best.is_none_or(|(bc, _, _)| cost < bc) {
                    best = Some((cost, axis, k));
                }
            }
        }
        let (axis, k) = best.map_or((0, n / 2), |(_, axis, k)| (axis, k));
        // Items are currently sorted along the last axis; re-sort if the best split used another.
        if axis != 1 {
            items.sort_by(|a, b| {
                Self::centroid(&a.1, axis)
                    .partial_cmp(&Self::centroid(&b.1, axis))
                    .unwrap_or(core::cmp::Ordering::Equal)
            });
        }
        let right = items.split_off(k);
        (items, right)
    }

    fn insert_node(
        arena: &mut Vec<Node<T>>,
        node_idx: usize,
        slot: usize,
        bbox: Aabb2D<T>,
        max_leaf: usize,
    ) {
        let kind = core::mem::replace(&mut arena[node_idx].kind, Kind::Leaf(Vec::new()));
        match kind {
            Kind::Leaf(mut items) => {
                let was_empty = items.is_empty();
                items.push((slot, bbox));
                let mut node_bbox = if was_empty {
                    bbox
                } else {
                    union_aabb(arena[node_idx].bbox, bbox)
                };
                let new_kind = if items.len() > max_leaf {
                    let (l, r) = Self::split_sah(items, max_leaf);
                    let l_idx = arena.len();
                    arena.push(Node {
                        bbox: Self::bbox_items(&l),
                        kind: Kind::Leaf(l),
                    });
                    let r_idx = arena.len();
                    arena.push(Node {
                        bbox: Self::bbox_items(&r),
                        kind: Kind::Leaf(r),
                    });
                    node_bbox = union_aabb(arena[l_idx].bbox, arena[r_idx].bbox);
                    Kind::Internal {
                        left: NodeIdx(l_idx),
                        right: NodeIdx(r_idx),
                    }
                } else {
                    Kind::Leaf(items)
                };
                arena[node_idx].kind = new_kind;
                arena[node_idx].bbox = node_bbox;
            }
            Kind::Internal { left, right } => {
                let lb = arena[left.0].bbox;
                let rb = arena[right.0].bbox;
                let cost_l = area(&union_aabb(lb, bbox)) - area(&lb);
                let cost_r = area(&union_aabb(rb, bbox)) - area(&rb);
                let target = if cost_l <= cost_r { left } else { right };
                Self::insert_node(arena, target.0, slot, bbox, max_leaf);
                arena[node_idx].kind = Kind::Internal { left, right };
                arena[node_idx].bbox = union_aabb(arena[left.0].bbox, arena[right.0].bbox);
            }
        }
    }

    fn is_empty_leaf(node: &Node<T>) -> bool {
        matches!(node.kind, Kind::Leaf(ref v) if v.is_empty())
    }

    /// Remove `slot` from the subtree rooted at `node_idx`, collapsing internal
    /// nodes that end up with a single non-empty child.
    fn remove_node(arena: &mut [Node<T>], node_idx: usize, slot: usize, old: &Aabb2D<T>) -> bool {
        if !arena[node_idx].bbox.intersects(old) {
            return false;
        }
        let kind = core::mem::replace(&mut arena[node_idx].kind, Kind::Leaf(Vec::new()));
        let (new_kind, new_bbox, removed) = match kind {
            Kind::Leaf(mut items) => {
                let before = items.len();
                items.retain(|(s, _)| *s != slot);
                let removed = items.len() != before;
                let bbox = Self::bbox_items(&items);
                (Kind::Leaf(items), bbox, removed)
            }
            Kind::Internal { left, right } => {
                let removed = Self::remove_node(arena, left.0, slot, old)
                    || Self::remove_node(arena, right.0, slot, old);
                let left_empty = Self::is_empty_leaf(&arena[left.0]);
                let right_empty = Self::is_empty_leaf(&arena[right.0]);
                if removed && left_empty != right_empty {
                    let keep = if left_empty { right } else { left };
                    let kind =
                        core::mem::replace(&mut arena[keep.0].kind, Kind::Leaf(Vec::new()));
                    (kind, arena[keep.0].bbox, true)
                } else if left_empty && right_empty {
                    (Kind::Leaf(Vec::new()), arena[node_idx].bbox, removed)
                } else {
                    let bbox = union_aabb(arena[left.0].bbox, arena[right.0].bbox);
                    (Kind::Internal { left, right }, bbox, removed)
                }
            }
        };
        arena[node_idx].kind = new_kind;
        arena[node_idx].bbox = new_bbox;
        removed
    }

    /// Number of arena nodes, including orphaned ones awaiting a `clear`.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }
}

impl<T: Scalar> Backend<T> for Bvh<T> {
    fn insert(&mut self, slot: usize, aabb: Aabb2D<T>) {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(aabb);
        match self.root {
            None => {
                let idx = self.arena.len();
                self.arena.push(Node {
                    bbox: aabb,
                    kind: Kind::Leaf(vec![(slot, aabb)]),
                });
                self.root = Some(NodeIdx(idx));
            }
            Some(root) => {
                Self::insert_node(&mut self.arena, root.0, slot, aabb, self.max_leaf);
            }
        }
    }

    fn update(&mut self, slot: usize, aabb: Aabb2D<T>) {
        self.remove(slot);
        self.insert(slot, aabb);
    }

    fn remove(&mut self, slot: usize) {
        let Some(old) = self.slots.get_mut(slot).and_then(Option::take) else {
            return;
        };
        if let Some(root) = self.root {
            let _ = Self::remove_node(&mut self.arena, root.0, slot, &old);
        }
    }

    fn clear(&mut self) {
        self.root = None;
        self.arena.clear();
        self.slots.clear();
    }

    fn visit_rect(&self, rect: Aabb2D<T>, visit: &mut dyn FnMut(usize) -> bool) -> bool {
        let Some(root) = self.root else {
            return true;
        };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let n = &self.arena[i.0];
            if !n.bbox.intersects(&rect) {
                continue;
            }
            match &n.kind {
                Kind::Leaf(items) => {
                    for (s, b) in items {
                        if b.intersects(&rect) && !visit(*s) {
                            return false;
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        true
    }
}

impl<T: Scalar> Debug for Bvh<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let alive = self.slots.iter().filter(|e| e.is_some()).count();
        f.debug_struct("Bvh")
            .field("max_leaf", &self.max_leaf)
            .field("arena_nodes", &self.arena.len())
            .field("total_slots", &self.slots.len())
            .field("alive", &alive)
            .field("has_root", &self.root.is_some())
            .finish_non_exhaustive()
    }
}

/// BVH with f32 coordinates and f64 metrics.
pub type BvhF32 = Bvh<f32>;

/// BVH with f64 coordinates and f64 metrics.
pub type BvhF64 = Bvh<f64>;

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`ProxyTree`]: handle-based AABB tree with fattened bounds.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::backend::Backend;
use crate::backends::bvh::Bvh;
use crate::backends::flatvec::FlatVec;
use crate::types::{Aabb2D, Scalar};

/// Generational handle for a proxy stored in a [`ProxyTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Proxy(u32, u32);

impl Proxy {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Proxy slots are 32-bit; trees never hold more than u32::MAX proxies."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct Entry<T, P> {
    fat: Aabb2D<T>,
    tight: Aabb2D<T>,
    payload: P,
}

#[derive(Clone, Debug)]
struct Slot<T, P> {
    generation: u32,
    entry: Option<Entry<T, P>>,
}

/// A dynamic AABB tree keyed by [`Proxy`] handles.
///
/// Every proxy carries two boxes: the tight box it was last moved to, and a
/// fattened box (tight box grown by `margin`, stretched along the last
/// displacement) that the backend indexes. Small movements that stay inside
/// the fattened box do not touch the backend at all.
///
/// Queries run in one of two modes:
/// - approximate: tests against the fattened boxes only, so results may hold
///   false positives;
/// - exact: additionally filters by the tight box.
pub struct ProxyTree<T: Scalar, P, B: Backend<T>> {
    slots: Vec<Slot<T, P>>,
    free_list: Vec<usize>,
    len: usize,
    margin: T,
    backend: B,
}

impl<T, P, B> ProxyTree<T, P, B>
where
    T: Scalar,
    B: Backend<T> + Default,
{
    /// Create an empty tree with the given fattening margin.
    pub fn new(margin: T) -> Self {
        Self::with_backend(margin, B::default())
    }
}

impl<T, P, B> ProxyTree<T, P, B>
where
    T: Scalar,
    B: Backend<T>,
{
    /// Create an empty tree over an explicitly configured backend.
    pub fn with_backend(margin: T, backend: B) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            margin,
            backend,
        }
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no proxies.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fattening margin applied when a proxy is created or escapes its fat box.
    pub fn margin(&self) -> T {
        self.margin
    }

    /// Insert a proxy with a tight AABB and payload.
    pub fn create_proxy(&mut self, aabb: Aabb2D<T>, payload: P) -> Proxy {
        let entry = Entry {
            fat: aabb.inflate(self.margin),
            tight: aabb,
            payload,
        };
        let fat = entry.fat;
        let idx = if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx];
            slot.generation = slot.generation.wrapping_add(1);
            slot.entry = Some(entry);
            idx
        } else {
            self.slots.push(Slot {
                generation: 1,
                entry: Some(entry),
            });
            self.slots.len() - 1
        };
        self.backend.insert(idx, fat);
        self.len += 1;
        Proxy::new(idx, self.slots[idx].generation)
    }

    /// Remove a proxy, returning its payload. Stale handles return `None`.
    pub fn destroy_proxy(&mut self, proxy: Proxy) -> Option<P> {
        let slot = self.slots.get_mut(proxy.idx())?;
        if slot.generation != proxy.1 {
            return None;
        }
        let entry = slot.entry.take()?;
        self.backend.remove(proxy.idx());
        self.free_list.push(proxy.idx());
        self.len -= 1;
        Some(entry.payload)
    }

    /// Move a proxy to a new tight AABB.
    ///
    /// `displacement` is the predicted movement used to stretch the fattened
    /// box. Returns `true` if the backend had to be updated (the new box
    /// escaped the old fattened box), `false` if only the tight box changed.
    pub fn move_proxy(&mut self, proxy: Proxy, aabb: Aabb2D<T>, displacement: (T, T)) -> bool {
        let margin = self.margin;
        let Some(entry) = self.entry_mut(proxy) else {
            return false;
        };
        entry.tight = aabb;
        if entry.fat.contains(&aabb) {
            return false;
        }
        let fat = aabb.inflate(margin).extend_towards(displacement.0, displacement.1);
        entry.fat = fat;
        self.backend.update(proxy.idx(), fat);
        true
    }

    /// Payload stored for a proxy.
    pub fn get_user_data(&self, proxy: Proxy) -> Option<&P> {
        self.entry(proxy).map(|e| &e.payload)
    }

    /// Fattened AABB of a proxy.
    pub fn get_fat_aabb(&self, proxy: Proxy) -> Option<Aabb2D<T>> {
        self.entry(proxy).map(|e| e.fat)
    }

    /// Tight AABB of a proxy.
    pub fn get_tight_aabb(&self, proxy: Proxy) -> Option<Aabb2D<T>> {
        self.entry(proxy).map(|e| e.tight)
    }

    /// Visit proxies overlapping `aabb`.
    ///
    /// The visitor returns `true` to continue and `false` to stop. The return
    /// value is `false` if the visitor stopped the query early.
    pub fn query<F>(&self, aabb: Aabb2D<T>, approximate: bool, mut visit: F) -> bool
    where
        F: FnMut(Proxy, &P) -> bool,
    {
        let slots = &self.slots;
        self.backend.visit_rect(aabb, &mut |idx| {
            let Some(slot) = slots.get(idx) else {
                return true;
            };
            let Some(e) = slot.entry.as_ref() else {
                return true;
            };
            if !approximate && !e.tight.intersects(&aabb) {
                return true;
            }
            visit(Proxy::new(idx, slot.generation), &e.payload)
        })
    }

    /// Whether any proxy overlaps `aabb`.
    pub fn any(&self, aabb: Aabb2D<T>, approximate: bool) -> bool {
        !self.query(aabb, approximate, |_, _| false)
    }

    /// Iterate every live proxy.
    pub fn iter(&self) -> impl Iterator<Item = (Proxy, &P)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|e| (Proxy::new(i, slot.generation), &e.payload))
        })
    }

    /// Remove every proxy. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                self.free_list.push(i);
            }
        }
        self.backend.clear();
        self.len = 0;
    }

    fn entry(&self, proxy: Proxy) -> Option<&Entry<T, P>> {
        let slot = self.slots.get(proxy.idx())?;
        if slot.generation != proxy.1 {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, proxy: Proxy) -> Option<&mut Entry<T, P>> {
        let slot = self.slots.get_mut(proxy.idx())?;
        if slot.generation != proxy.1 {
            return None;
        }
        slot.entry.as_mut()
    }
}

impl<T: Scalar, P, B: Backend<T> + Debug> Debug for ProxyTree<T, P, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProxyTree")
            .field("len", &self.len)
            .field("free_list", &self.free_list.len())
            .field("margin", &self.margin)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// Proxy tree over a linear-scan backend.
pub type FlatProxyTree<T, P> = ProxyTree<T, P, FlatVec<T>>;

/// Proxy tree over a BVH backend.
pub type BvhProxyTree<T, P> = ProxyTree<T, P, Bvh<T>>;

// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-region broadphase: four proxy trees in the region's local space.

use core::fmt;

use tether_index::{Aabb2D, BvhProxyTree, Proxy, ProxyTree};
use tether_xform::EntityId;

use crate::flags::{LookupFlags, TreeKind};
use crate::shapes::FixtureId;

/// Payload of a fixture proxy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FixtureProxy {
    /// Entity owning the fixture.
    pub entity: EntityId,
    /// Fixture on that entity.
    pub fixture: FixtureId,
}

/// The trees of one map or grid.
///
/// Proxies are stored in the owner's local space, so moving or rotating the
/// owner never touches them.
pub struct Broadphase {
    owner: EntityId,
    dynamic: BvhProxyTree<f64, FixtureProxy>,
    static_tree: BvhProxyTree<f64, FixtureProxy>,
    static_sundries: BvhProxyTree<f64, EntityId>,
    sundries: BvhProxyTree<f64, EntityId>,
}

impl Broadphase {
    /// Create an empty broadphase for `owner` whose proxies are fattened by `margin`.
    pub fn new(owner: EntityId, margin: f64) -> Self {
        Self {
            owner,
            dynamic: ProxyTree::new(margin),
            static_tree: ProxyTree::new(margin),
            static_sundries: ProxyTree::new(margin),
            sundries: ProxyTree::new(margin),
        }
    }

    /// The map or grid this broadphase belongs to.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Number of proxies in one tree.
    pub fn len(&self, kind: TreeKind) -> usize {
        match kind {
            TreeKind::Dynamic => self.dynamic.len(),
            TreeKind::Static => self.static_tree.len(),
            TreeKind::StaticSundries => self.static_sundries.len(),
            TreeKind::Sundries => self.sundries.len(),
        }
    }

    /// Number of proxies across all trees.
    pub fn total_len(&self) -> usize {
        TreeKind::ALL.into_iter().map(|k| self.len(k)).sum()
    }

    /// Whether every tree is empty.
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    fn fixture_tree(&self, kind: TreeKind) -> &BvhProxyTree<f64, FixtureProxy> {
        if kind == TreeKind::Static {
            &self.static_tree
        } else {
            &self.dynamic
        }
    }

    fn fixture_tree_mut(&mut self, kind: TreeKind) -> &mut BvhProxyTree<f64, FixtureProxy> {
        if kind == TreeKind::Static {
            &mut self.static_tree
        } else {
            &mut self.dynamic
        }
    }

    fn sundry_tree(&self, kind: TreeKind) -> &BvhProxyTree<f64, EntityId> {
        if kind == TreeKind::StaticSundries {
            &self.static_sundries
        } else {
            &self.sundries
        }
    }

    fn sundry_tree_mut(&mut self, kind: TreeKind) -> &mut BvhProxyTree<f64, EntityId> {
        if kind == TreeKind::StaticSundries {
            &mut self.static_sundries
        } else {
            &mut self.sundries
        }
    }

    /// Insert a fixture proxy into the dynamic or static tree.
    pub(crate) fn insert_fixture(
        &mut self,
        kind: TreeKind,
        aabb: Aabb2D<f64>,
        payload: FixtureProxy,
    ) -> Proxy {
        debug_assert!(kind.holds_fixtures(), "fixture proxy in a sundry tree");
        self.fixture_tree_mut(kind).create_proxy(aabb, payload)
    }

    /// Insert a bare entity into one of the sundry trees.
    pub(crate) fn insert_sundry(
        &mut self,
        kind: TreeKind,
        aabb: Aabb2D<f64>,
        entity: EntityId,
    ) -> Proxy {
        debug_assert!(!kind.holds_fixtures(), "sundry proxy in a fixture tree");
        self.sundry_tree_mut(kind).create_proxy(aabb, entity)
    }

    /// Move a proxy. Returns whether the tree had to be updated.
    pub(crate) fn move_proxy(
        &mut self,
        kind: TreeKind,
        proxy: Proxy,
        aabb: Aabb2D<f64>,
        displacement: (f64, f64),
    ) -> bool {
        if kind.holds_fixtures() {
            self.fixture_tree_mut(kind).move_proxy(proxy, aabb, displacement)
        } else {
            self.sundry_tree_mut(kind).move_proxy(proxy, aabb, displacement)
        }
    }

    /// Remove a proxy. Returns `false` if it was already gone.
    pub(crate) fn remove(&mut self, kind: TreeKind, proxy: Proxy) -> bool {
        if kind.holds_fixtures() {
            self.fixture_tree_mut(kind).destroy_proxy(proxy).is_some()
        } else {
            self.sundry_tree_mut(kind).destroy_proxy(proxy).is_some()
        }
    }

    /// Tight local bounds of a proxy.
    pub fn tight_aabb(&self, kind: TreeKind, proxy: Proxy) -> Option<Aabb2D<f64>> {
        if kind.holds_fixtures() {
            self.fixture_tree(kind).get_tight_aabb(proxy)
        } else {
            self.sundry_tree(kind).get_tight_aabb(proxy)
        }
    }

    /// Fattened local bounds of a proxy.
    pub fn fat_aabb(&self, kind: TreeKind, proxy: Proxy) -> Option<Aabb2D<f64>> {
        if kind.holds_fixtures() {
            self.fixture_tree(kind).get_fat_aabb(proxy)
        } else {
            self.sundry_tree(kind).get_fat_aabb(proxy)
        }
    }

    /// Visit the owners of proxies overlapping the local box `aabb`, in the trees
    /// selected by `flags`.
    ///
    /// An entity with several fixtures may be visited more than once. Returns
    /// `false` if the visitor stopped early.
    pub fn query(
        &self,
        aabb: Aabb2D<f64>,
        flags: LookupFlags,
        visit: &mut dyn FnMut(EntityId) -> bool,
    ) -> bool {
        let approximate = flags.approximate();
        for kind in flags.trees() {
            let done = if kind.holds_fixtures() {
                self.fixture_tree(kind)
                    .query(aabb, approximate, |_, p| visit(p.entity))
            } else {
                self.sundry_tree(kind)
                    .query(aabb, approximate, |_, e| visit(*e))
            };
            if !done {
                return false;
            }
        }
        true
    }

    /// Visit every fixture proxy overlapping `aabb` in the selected fixture trees.
    pub fn query_fixtures(
        &self,
        aabb: Aabb2D<f64>,
        flags: LookupFlags,
        visit: &mut dyn FnMut(Proxy, &FixtureProxy) -> bool,
    ) -> bool {
        let approximate = flags.approximate();
        for kind in flags.trees().filter(|k| k.holds_fixtures()) {
            if !self.fixture_tree(kind).query(aabb, approximate, |p, f| visit(p, f)) {
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for Broadphase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadphase")
            .field("owner", &self.owner)
            .field("dynamic", &self.dynamic.len())
            .field("static", &self.static_tree.len())
            .field("static_sundries", &self.static_sundries.len())
            .field("sundries", &self.sundries.len())
            .finish()
    }
}

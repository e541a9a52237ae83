// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query flags and tree selectors.

use bitflags::bitflags;

bitflags! {
    /// Which trees a query searches, and how.
    ///
    /// Each tree has its own bit; no selector depends on a combination of others.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LookupFlags: u8 {
        /// Fixtures on movable bodies.
        const DYNAMIC         = 0b0000_0001;
        /// Fixtures on immovable or anchored bodies.
        const STATIC          = 0b0000_0010;
        /// Anchored entities without fixtures.
        const STATIC_SUNDRIES = 0b0000_0100;
        /// Entities without fixtures.
        const SUNDRIES        = 0b0000_1000;
        /// Test against fattened bounds only. Faster, may report false positives.
        const APPROXIMATE     = 0b0001_0000;
        /// Expand results through containers, recursively.
        const CONTAINED       = 0b0010_0000;

        /// All four trees.
        const ALL_TREES = Self::DYNAMIC.bits()
            | Self::STATIC.bits()
            | Self::STATIC_SUNDRIES.bits()
            | Self::SUNDRIES.bits();
    }
}

impl LookupFlags {
    /// Every tree, approximate.
    pub const DEFAULT: Self = Self::ALL_TREES.union(Self::APPROXIMATE);

    /// Whether the query should compare against fattened bounds.
    pub fn approximate(self) -> bool {
        self.contains(Self::APPROXIMATE)
    }

    /// The trees this selects.
    pub fn trees(self) -> impl Iterator<Item = TreeKind> {
        TreeKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.flag()))
    }
}

impl Default for LookupFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One of the four trees of a broadphase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeKind {
    /// Fixtures on movable bodies.
    Dynamic,
    /// Fixtures on immovable or anchored bodies.
    Static,
    /// Anchored entities without fixtures.
    StaticSundries,
    /// Entities without fixtures.
    Sundries,
}

impl TreeKind {
    /// Every tree, in query order.
    pub const ALL: [Self; 4] = [
        Self::Dynamic,
        Self::Static,
        Self::StaticSundries,
        Self::Sundries,
    ];

    /// Selector bit for this tree.
    pub const fn flag(self) -> LookupFlags {
        match self {
            Self::Dynamic => LookupFlags::DYNAMIC,
            Self::Static => LookupFlags::STATIC,
            Self::StaticSundries => LookupFlags::STATIC_SUNDRIES,
            Self::Sundries => LookupFlags::SUNDRIES,
        }
    }

    /// Whether this tree holds fixture proxies rather than bare entities.
    pub const fn holds_fixtures(self) -> bool {
        matches!(self, Self::Dynamic | Self::Static)
    }
}

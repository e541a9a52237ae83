// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for transform mutation.

use thiserror::Error;

use crate::types::{EntityId, MapId};

/// Transform graph errors.
///
/// Structural violations (`ParentToSelf`, `MissingParent`, `TerminatingParent`)
/// also queue the offending entity for deletion; see
/// [`TransformGraph::take_queued_deletions`](crate::TransformGraph::take_queued_deletions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// An entity was asked to become its own parent.
    #[error("attempted to parent {0} to itself")]
    ParentToSelf(EntityId),

    /// The requested parent has no transform.
    #[error("attempted to parent {entity} to non-existent entity {parent}")]
    MissingParent {
        /// Entity being moved.
        entity: EntityId,
        /// Requested parent.
        parent: EntityId,
    },

    /// The requested parent is being deleted.
    #[error("attempted to parent {entity} to terminating entity {parent}")]
    TerminatingParent {
        /// Entity being moved.
        entity: EntityId,
        /// Requested parent.
        parent: EntityId,
    },

    /// The requested parent is a descendant of the entity.
    #[error("attempted to parent {entity} to {parent}, which would create a cycle")]
    CircularHierarchy {
        /// Entity being moved.
        entity: EntityId,
        /// Requested parent.
        parent: EntityId,
    },

    /// The entity has no transform.
    #[error("entity {0} has no transform")]
    UnknownEntity(EntityId),

    /// The entity already has a transform.
    #[error("entity {0} already has a transform")]
    AlreadyExists(EntityId),

    /// The entity is not a grid.
    #[error("entity {0} is not a grid")]
    NotAGrid(EntityId),

    /// The map id is not registered.
    #[error("map {0:?} does not exist")]
    UnknownMap(MapId),
}

/// A structural inconsistency found by
/// [`TransformGraph::check_invariants`](crate::TransformGraph::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Parent and child links disagree.
    #[error("{entity} and {parent} disagree about their parent/child link")]
    ChildLinkMismatch {
        /// Child side of the link.
        entity: EntityId,
        /// Parent side of the link.
        parent: EntityId,
    },

    /// The parent chain never reaches a root.
    #[error("parent chain of {0} contains a cycle")]
    Cycle(EntityId),

    /// Cached map does not match the map root of the parent chain.
    #[error("{0} has a stale map")]
    MapMismatch(EntityId),

    /// Cached grid does not match the nearest grid ancestor.
    #[error("{0} has a stale grid")]
    GridMismatch(EntityId),

    /// Entity is anchored but not registered in its grid tile.
    #[error("{0} is anchored but not registered in a tile")]
    AnchorNotRegistered(EntityId),

    /// Cached world matrix differs from the recomputed one.
    #[error("{0} has a stale world matrix")]
    StaleWorldMatrix(EntityId),

    /// Entity has `no_local_rotation` set but a non-zero local rotation.
    #[error("{0} has a local rotation despite no_local_rotation")]
    RotationNotPinned(EntityId),
}

/// Result type for transform operations.
pub type Result<T> = core::result::Result<T, TransformError>;

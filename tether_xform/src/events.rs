// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured notifications emitted by transform mutations.

use core::fmt;

use crate::types::{Angle, EntityCoordinates, EntityId, MapId, TileIndex};

/// A change to an entity's transform.
///
/// Events are queued by the [`TransformGraph`](crate::TransformGraph) in the
/// order the mutations happened and drained with
/// [`drain_events`](crate::TransformGraph::drain_events).
#[derive(Clone, Debug, PartialEq)]
pub enum TransformEvent {
    /// Local position, rotation, or parent changed.
    Moved {
        /// Entity that moved.
        entity: EntityId,
        /// Coordinates before the move.
        old_position: EntityCoordinates,
        /// Coordinates after the move.
        new_position: EntityCoordinates,
        /// Local rotation before the move.
        old_rotation: Angle,
        /// Local rotation after the move.
        new_rotation: Angle,
    },
    /// The parent changed. Always followed by a `Moved` for the same entity,
    /// except during startup.
    ParentChanged {
        /// Entity that was reparented.
        entity: EntityId,
        /// Previous parent.
        old_parent: Option<EntityId>,
        /// Previous map.
        old_map: MapId,
    },
    /// The entity was anchored to or released from a grid tile.
    ///
    /// Physics listens for this to switch the body between static and dynamic.
    AnchorStateChanged {
        /// Entity whose anchoring changed.
        entity: EntityId,
        /// New anchored state.
        anchored: bool,
        /// Set when the entity is being detached to null-space.
        detaching: bool,
    },
    /// An anchored entity was moved to another grid without unanchoring.
    ReAnchored {
        /// Entity that moved.
        entity: EntityId,
        /// Grid it left.
        old_grid: EntityId,
        /// Grid it now belongs to.
        grid: EntityId,
        /// Tile on the new grid.
        tile: TileIndex,
    },
    /// The entity finished starting up and is now running.
    Startup {
        /// Entity that started.
        entity: EntityId,
    },
    /// The entity's transform was removed.
    Removed {
        /// Entity that was removed.
        entity: EntityId,
    },
}

impl TransformEvent {
    /// Entity the event is about.
    pub fn entity(&self) -> EntityId {
        match *self {
            Self::Moved { entity, .. }
            | Self::ParentChanged { entity, .. }
            | Self::AnchorStateChanged { entity, .. }
            | Self::ReAnchored { entity, .. }
            | Self::Startup { entity }
            | Self::Removed { entity } => entity,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&TransformEvent)>;

/// Synchronous fan-out of [`TransformEvent`]s to external subscribers.
///
/// Handlers only see shared references and cannot mutate the graph while an
/// event is being dispatched.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in subscription order.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&TransformEvent) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Deliver one event to every handler.
    pub fn publish(&mut self, event: &TransformEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
